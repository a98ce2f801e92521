//! Component K: deterministic simulation harness. Drives the real Rule
//! Store, Violation Store, Trace Buffer, and Ingestion Orchestrator
//! through seeded, fault-injected workloads to check the testable
//! properties in §8 hold under conditions a unit test can't easily
//! reach — concurrent writers, mid-write crashes, and interleaved
//! multi-trace span streams.

pub mod fault_fs;
pub mod harness;
pub mod workload;

pub use fault_fs::FaultInjectingFilesystem;
pub use harness::{
    run_completion_scenario, run_concurrent_create_scenario, run_crash_safety_scenario, CompletionReport,
    ConcurrencyReport, CrashSafetyReport,
};
pub use workload::{interleaved_span_stream, random_rule_input, random_span};
