//! Component H: receives span batches, validates and fans them out to the
//! Trace Buffer, and drives evaluation of completed traces (§4.H, §5).
//!
//! The ingestion hot path (`ingest_batch`) never touches the Trace
//! Buffer or disk directly — it validates each span and pushes accepted
//! ones onto a bounded channel, which is the only suspension point on
//! this path (§5: "any channel send when full"). A single completion
//! worker (driven by [`IngestionOrchestrator::pump`]) owns the
//! `TraceBuffer` exclusively, drains the channel, ticks the timeout
//! clock, and evaluates completed traces against a snapshot of enabled
//! rules.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use betrace_core::model::{Severity, Trace, Value};
use betrace_core::{BeTraceEvent, EventDispatcher};
use betrace_dsl::RuleAst;
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::evaluator::{evaluate, MatchResult};
use crate::trace_buffer::TraceBuffer;

/// An immutable snapshot of one enabled rule, as the evaluator needs it.
/// §5: "the evaluator receives an atomic snapshot of the rule set at
/// trace-completion time; in-flight CRUD does not observe or affect it."
#[derive(Clone)]
pub struct ActiveRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub ast: Arc<RuleAst>,
}

/// Where evaluated violations go. Implemented by `betrace-store`'s
/// violation store in production, by an in-memory recorder in tests.
pub trait ViolationSink: Send + Sync {
    fn record(
        &self,
        rule: &ActiveRule,
        trace_id: &str,
        first_span_id: &str,
        message: String,
        context: BTreeMap<String, Value>,
    );
}

#[derive(Debug, Clone)]
pub struct SpanRejection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestBatchReport {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: Vec<SpanRejection>,
}

pub struct IngestionOrchestrator {
    span_tx: Sender<betrace_core::model::Span>,
    span_rx: Receiver<betrace_core::model::Span>,
}

impl IngestionOrchestrator {
    pub fn new(queue_capacity: usize) -> Self {
        let (span_tx, span_rx) = crossbeam_channel::bounded(queue_capacity);
        Self { span_tx, span_rx }
    }

    /// Validates each span in the batch and enqueues the well-formed
    /// ones. Never blocks: a full queue rejects the remainder of the
    /// batch with `Overloaded` rather than waiting.
    pub fn ingest_batch(&self, spans: Vec<betrace_core::model::Span>) -> IngestBatchReport {
        let mut report = IngestBatchReport::default();
        for (index, span) in spans.into_iter().enumerate() {
            if let Err(reason) = span.validate() {
                report.rejected += 1;
                report.errors.push(SpanRejection { index, reason });
                continue;
            }
            match self.span_tx.try_send(span) {
                Ok(()) => report.accepted += 1,
                Err(TrySendError::Full(_)) => {
                    report.rejected += 1;
                    report.errors.push(SpanRejection {
                        index,
                        reason: "ingestion overloaded: queue is full".to_string(),
                    });
                }
                Err(TrySendError::Disconnected(_)) => {
                    report.rejected += 1;
                    report.errors.push(SpanRejection {
                        index,
                        reason: "ingestion channel closed".to_string(),
                    });
                }
            }
        }
        report
    }

    /// Completion-worker step: drains every span currently queued into
    /// `buffer`, ticks the timeout clock, evaluates every trace that
    /// completed as a result (from either path) against `rules`, and
    /// hands violations to `sink`. Returns the number of traces
    /// evaluated. Call in a loop at `tick_interval` (default 100ms, §4.H).
    pub fn pump(
        &self,
        buffer: &mut TraceBuffer,
        now_ns: u64,
        rules: &[ActiveRule],
        eval_timeout_ms: u64,
        events: &EventDispatcher,
        sink: &dyn ViolationSink,
    ) -> usize {
        let mut completed = Vec::new();
        while let Ok(span) = self.span_rx.try_recv() {
            if let Some(trace) = buffer.ingest(span, now_ns) {
                completed.push(trace);
            }
        }
        completed.extend(buffer.tick(now_ns));

        for trace in &completed {
            evaluate_trace(trace, rules, eval_timeout_ms, events, sink);
        }
        completed.len()
    }

    /// Drains the ingest queue into `buffer` and completes every
    /// buffered trace unconditionally, evaluating each — the shutdown
    /// sequence from §5.
    pub fn drain_and_flush(
        &self,
        buffer: &mut TraceBuffer,
        now_ns: u64,
        rules: &[ActiveRule],
        eval_timeout_ms: u64,
        events: &EventDispatcher,
        sink: &dyn ViolationSink,
    ) {
        while let Ok(span) = self.span_rx.try_recv() {
            buffer.ingest(span, now_ns);
        }
        for trace in buffer.flush() {
            evaluate_trace(&trace, rules, eval_timeout_ms, events, sink);
        }
    }
}

fn evaluate_trace(
    trace: &Trace,
    rules: &[ActiveRule],
    eval_timeout_ms: u64,
    events: &EventDispatcher,
    sink: &dyn ViolationSink,
) {
    let first_span_id = trace
        .spans
        .first()
        .map(|s| s.span_id.clone())
        .unwrap_or_default();

    for rule in rules {
        let started = Instant::now();
        let result = evaluate(&rule.ast, trace);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if elapsed_ms > eval_timeout_ms {
            events.dispatch(BeTraceEvent::RuleEvaluationTimeout {
                rule_id: rule.id.clone(),
                trace_id: trace.trace_id.clone(),
                budget_ms: eval_timeout_ms,
            });
        }

        if let MatchResult::Violation { message, context } = result {
            sink.record(rule, &trace.trace_id, &first_span_id, message, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use betrace_core::model::SpanStatus;
    use parking_lot::Mutex;

    fn span(trace_id: &str, name: &str, terminator: bool) -> betrace_core::model::Span {
        let mut attrs = BTreeMap::new();
        if terminator {
            attrs.insert("trace.terminator".to_string(), Value::Bool(true));
        }
        betrace_core::model::Span {
            trace_id: trace_id.to_string(),
            span_id: "s1".to_string(),
            parent_id: None,
            name: name.to_string(),
            start_ns: 0,
            end_ns: 1,
            attrs,
            status: SpanStatus::Unset,
        }
    }

    struct RecordingSink {
        records: Mutex<Vec<String>>,
    }

    impl ViolationSink for RecordingSink {
        fn record(
            &self,
            rule: &ActiveRule,
            _trace_id: &str,
            _first_span_id: &str,
            message: String,
            _context: BTreeMap<String, Value>,
        ) {
            self.records.lock().push(format!("{}: {}", rule.id, message));
        }
    }

    fn active_rule(id: &str, expression: &str) -> ActiveRule {
        let ast = betrace_dsl::compile(expression).unwrap();
        ActiveRule {
            id: id.to_string(),
            name: id.to_string(),
            severity: Severity::High,
            ast: Arc::new(ast),
        }
    }

    #[test]
    fn rejects_malformed_span() {
        let orch = IngestionOrchestrator::new(10);
        let mut bad = span("t1", "a", false);
        bad.trace_id.clear();
        let report = orch.ingest_batch(vec![bad]);
        assert_eq!(report.accepted, 0);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn overloaded_queue_rejects_remainder_of_batch() {
        let orch = IngestionOrchestrator::new(1);
        let report = orch.ingest_batch(vec![span("t1", "a", false), span("t2", "a", false)]);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn pump_evaluates_completed_traces_against_rule_snapshot() {
        let orch = IngestionOrchestrator::new(10);
        orch.ingest_batch(vec![span("t1", "payment.charge_card", true)]);

        let mut buffer = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        let rules = vec![active_rule(
            "r1",
            "when { payment.charge_card } always { payment.fraud_check }",
        )];
        let sink = RecordingSink {
            records: Mutex::new(Vec::new()),
        };

        let evaluated = orch.pump(&mut buffer, 0, &rules, 50, &EventDispatcher::default(), &sink);
        assert_eq!(evaluated, 1);
        assert_eq!(sink.records.lock().len(), 1);
        assert!(sink.records.lock()[0].contains("always clause failed"));
    }
}
