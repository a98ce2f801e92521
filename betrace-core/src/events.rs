//! The diagnostic-event plumbing referenced in SPEC_FULL.md §3: a small
//! dispatcher/handler pair, generalized from the teacher's
//! `EventDispatcher`/`DriftEventHandler` split, that the Evaluator uses to
//! report `RuleEvaluationTimeout` (§5) and the Trace Buffer uses to report
//! late-arriving spans (§4.F) without either one depending on a logging
//! backend directly.

use std::sync::Arc;

/// Non-fatal diagnostics the engine surfaces during normal operation.
/// None of these are `Violation`s — they describe engine behavior, not
/// rule outcomes.
#[derive(Debug, Clone)]
pub enum BeTraceEvent {
    RuleEvaluationTimeout {
        rule_id: String,
        trace_id: String,
        budget_ms: u64,
    },
    LateSpan {
        trace_id: String,
        span_id: String,
    },
    DiskErrorThresholdExceeded {
        operation: String,
        consecutive_failures: u32,
    },
}

pub trait BeTraceEventHandler: Send + Sync {
    fn handle(&self, event: &BeTraceEvent);
}

/// Default handler: forwards every event to `tracing::warn!` with
/// structured fields, matching the field-naming convention used elsewhere
/// in the engine (`rule_id`, `trace_id`, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

impl BeTraceEventHandler for TracingEventHandler {
    fn handle(&self, event: &BeTraceEvent) {
        match event {
            BeTraceEvent::RuleEvaluationTimeout {
                rule_id,
                trace_id,
                budget_ms,
            } => {
                tracing::warn!(rule_id, trace_id, budget_ms, "rule evaluation timed out");
            }
            BeTraceEvent::LateSpan { trace_id, span_id } => {
                tracing::warn!(trace_id, span_id, "late span arrived after trace completion");
            }
            BeTraceEvent::DiskErrorThresholdExceeded {
                operation,
                consecutive_failures,
            } => {
                tracing::error!(
                    operation,
                    consecutive_failures,
                    "disk error threshold exceeded, flipping health to DEGRADED"
                );
            }
        }
    }
}

/// Fans a single event out to every registered handler. Cheap to clone —
/// internally just an `Arc<[Arc<dyn BeTraceEventHandler>]>`.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Arc<Vec<Arc<dyn BeTraceEventHandler>>>,
}

impl EventDispatcher {
    pub fn new(handlers: Vec<Arc<dyn BeTraceEventHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn tracing_only() -> Self {
        Self::new(vec![Arc::new(TracingEventHandler)])
    }

    pub fn dispatch(&self, event: BeTraceEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::tracing_only()
    }
}
