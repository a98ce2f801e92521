//! # betrace-store
//!
//! Components E and G: crash-safe persistence for rules and violations.
//! Both stores are built on the same pattern — an in-memory cache
//! guarded by a `parking_lot::RwLock`, backed by one file per record
//! written through the injected [`betrace_core::Filesystem`] capability
//! so every mutation is atomic even across a crash mid-write.

pub mod rule_store;
pub mod violation_store;

pub use rule_store::{CompiledState, RuleStore};
pub use violation_store::ViolationStore;
