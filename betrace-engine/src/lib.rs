//! # betrace-engine
//!
//! Components D, F, and H: the evaluator, the trace buffer, and the
//! ingestion orchestrator that wires spans flowing in to violations
//! flowing out. Rule and violation persistence live in `betrace-store`;
//! this crate only holds the in-flight pipeline.

pub mod evaluator;
pub mod ingestion;
pub mod trace_buffer;

pub use evaluator::{evaluate, MatchResult};
pub use ingestion::{ActiveRule, IngestBatchReport, IngestionOrchestrator, SpanRejection};
pub use trace_buffer::TraceBuffer;
