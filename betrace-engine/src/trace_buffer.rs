//! Component F: per-trace span accumulation with completion detection
//! (§4.F). Owned exclusively by the completion worker (§5); no other
//! task mutates a `TraceBuffer`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use betrace_core::model::{CompletionReason, Span, Trace};
use betrace_core::{BeTraceEvent, EventDispatcher, FxHashMap};

/// Bound on how many recently-completed trace ids are remembered purely
/// to distinguish a genuinely late span (arriving after its trace was
/// already emitted) from a brand new trace reusing an old id. Not a
/// correctness requirement — a miss here just means a late span is
/// logged as "new" instead of "late", which only affects diagnostics.
const LATE_SPAN_MEMORY: usize = 10_000;

struct TraceEntry {
    spans: Vec<Span>,
    first_seen_ns: u64,
    last_activity_ns: u64,
}

pub struct TraceBuffer {
    completion_timeout_ns: u64,
    max_spans_per_trace: usize,
    max_buffered_spans: usize,
    entries: FxHashMap<String, TraceEntry>,
    expiry_heap: BinaryHeap<Reverse<(u64, String)>>,
    total_buffered_spans: usize,
    recently_completed: VecDeque<String>,
    recently_completed_set: std::collections::HashSet<String>,
    events: EventDispatcher,
}

impl TraceBuffer {
    pub fn new(
        completion_timeout_ns: u64,
        max_spans_per_trace: usize,
        max_buffered_spans: usize,
        events: EventDispatcher,
    ) -> Self {
        Self {
            completion_timeout_ns,
            max_spans_per_trace,
            max_buffered_spans,
            entries: FxHashMap::default(),
            expiry_heap: BinaryHeap::new(),
            total_buffered_spans: 0,
            recently_completed: VecDeque::new(),
            recently_completed_set: std::collections::HashSet::new(),
            events,
        }
    }

    /// Appends `span` to its trace, creating the entry if absent.
    /// Returns a trace that completed immediately as a side effect of
    /// this ingestion (terminator span, max-size cap, or forced overflow
    /// eviction of the oldest trace) — never more than one.
    pub fn ingest(&mut self, span: Span, now_ns: u64) -> Option<Trace> {
        if self.recently_completed_set.contains(&span.trace_id) {
            self.events.dispatch(BeTraceEvent::LateSpan {
                trace_id: span.trace_id.clone(),
                span_id: span.span_id.clone(),
            });
        }

        let is_terminator = span.is_terminator();
        let trace_id = span.trace_id.clone();

        let entry = self.entries.entry(trace_id.clone()).or_insert_with(|| TraceEntry {
            spans: Vec::new(),
            first_seen_ns: now_ns,
            last_activity_ns: now_ns,
        });
        entry.spans.push(span);
        entry.last_activity_ns = now_ns;
        self.total_buffered_spans += 1;

        let expiry = entry.last_activity_ns + self.completion_timeout_ns;
        self.expiry_heap.push(Reverse((expiry, trace_id.clone())));

        let over_size_cap = entry.spans.len() >= self.max_spans_per_trace;

        if is_terminator {
            return self.complete(&trace_id, CompletionReason::Terminator);
        }
        if over_size_cap {
            return self.complete(&trace_id, CompletionReason::MaxSpans);
        }
        if self.total_buffered_spans > self.max_buffered_spans {
            return self.force_evict_oldest();
        }
        None
    }

    /// Drains every entry whose `last_activity + completion_timeout` has
    /// elapsed as of `now_ns`.
    pub fn tick(&mut self, now_ns: u64) -> Vec<Trace> {
        let mut completed = Vec::new();
        while let Some(&Reverse((expiry, ref trace_id))) = self.expiry_heap.peek() {
            if expiry > now_ns {
                break;
            }
            let trace_id = trace_id.clone();
            self.expiry_heap.pop();

            let Some(entry) = self.entries.get(&trace_id) else {
                continue; // already completed via another path; stale heap entry
            };
            let current_expiry = entry.last_activity_ns + self.completion_timeout_ns;
            if current_expiry != expiry {
                continue; // stale entry superseded by a later ingest; the fresh one is still queued
            }
            if let Some(trace) = self.complete(&trace_id, CompletionReason::Timeout) {
                completed.push(trace);
            }
        }
        completed
    }

    /// Completes every buffered trace unconditionally (graceful
    /// shutdown).
    pub fn flush(&mut self) -> Vec<Trace> {
        let trace_ids: Vec<String> = self.entries.keys().cloned().collect();
        trace_ids
            .into_iter()
            .filter_map(|id| self.complete(&id, CompletionReason::Flush))
            .collect()
    }

    pub fn buffered_span_count(&self) -> usize {
        self.total_buffered_spans
    }

    pub fn buffered_trace_count(&self) -> usize {
        self.entries.len()
    }

    fn complete(&mut self, trace_id: &str, reason: CompletionReason) -> Option<Trace> {
        let entry = self.entries.remove(trace_id)?;
        self.total_buffered_spans -= entry.spans.len();
        self.remember_completed(trace_id.to_string());
        Some(Trace {
            trace_id: trace_id.to_string(),
            spans: entry.spans,
            first_seen_ns: entry.first_seen_ns,
            last_activity_ns: entry.last_activity_ns,
            reason,
        })
    }

    fn force_evict_oldest(&mut self) -> Option<Trace> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.first_seen_ns)
            .map(|(id, _)| id.clone())?;
        self.complete(&oldest, CompletionReason::BufferOverflow)
    }

    fn remember_completed(&mut self, trace_id: String) {
        if self.recently_completed_set.insert(trace_id.clone()) {
            self.recently_completed.push_back(trace_id);
            if self.recently_completed.len() > LATE_SPAN_MEMORY {
                if let Some(evicted) = self.recently_completed.pop_front() {
                    self.recently_completed_set.remove(&evicted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use betrace_core::model::{SpanStatus, Value};

    fn span(trace_id: &str, name: &str, terminator: bool) -> Span {
        let mut attrs = std::collections::BTreeMap::new();
        if terminator {
            attrs.insert("trace.terminator".to_string(), Value::Bool(true));
        }
        Span {
            trace_id: trace_id.to_string(),
            span_id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            name: name.to_string(),
            start_ns: 0,
            end_ns: 1,
            attrs,
            status: SpanStatus::Unset,
        }
    }

    #[test]
    fn terminator_span_completes_immediately() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        assert!(buf.ingest(span("t1", "a", false), 0).is_none());
        let completed = buf.ingest(span("t1", "b", true), 1);
        let trace = completed.unwrap();
        assert_eq!(trace.spans.len(), 2);
        assert_eq!(trace.reason, CompletionReason::Terminator);
        assert_eq!(buf.buffered_trace_count(), 0);
    }

    #[test]
    fn tick_completes_after_timeout() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        buf.ingest(span("t1", "a", false), 0);
        assert!(buf.tick(4_999_999_999).is_empty());
        let completed = buf.tick(5_000_000_000);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].reason, CompletionReason::Timeout);
    }

    #[test]
    fn tick_does_not_complete_a_trace_twice() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        buf.ingest(span("t1", "a", false), 0);
        let first = buf.tick(10_000_000_000);
        let second = buf.tick(20_000_000_000);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn activity_after_ingest_postpones_expiry() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        buf.ingest(span("t1", "a", false), 0);
        buf.ingest(span("t1", "b", false), 3_000_000_000);
        // Original expiry (5s from t=0) has passed, but the trace's
        // activity was refreshed, so it must not complete yet.
        assert!(buf.tick(5_000_000_001).is_empty());
        let completed = buf.tick(8_000_000_000);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].spans.len(), 2);
    }

    #[test]
    fn max_spans_forces_completion() {
        let mut buf = TraceBuffer::new(5_000_000_000, 3, 1_000_000, EventDispatcher::default());
        assert!(buf.ingest(span("t1", "a", false), 0).is_none());
        assert!(buf.ingest(span("t1", "b", false), 1).is_none());
        let completed = buf.ingest(span("t1", "c", false), 2);
        assert_eq!(completed.unwrap().reason, CompletionReason::MaxSpans);
    }

    #[test]
    fn overflow_evicts_oldest_trace_by_first_seen() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 2, EventDispatcher::default());
        buf.ingest(span("old", "a", false), 0);
        assert!(buf.ingest(span("new", "a", false), 1).is_none());
        // Third span pushes total over max_buffered_spans (2); the
        // oldest trace ("old", first_seen=0) must be evicted, not "new".
        let completed = buf.ingest(span("new", "b", false), 2).unwrap();
        assert_eq!(completed.trace_id, "old");
        assert_eq!(completed.reason, CompletionReason::BufferOverflow);
    }

    #[test]
    fn flush_completes_every_buffered_trace() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        buf.ingest(span("t1", "a", false), 0);
        buf.ingest(span("t2", "a", false), 0);
        let completed = buf.flush();
        assert_eq!(completed.len(), 2);
        assert_eq!(buf.buffered_trace_count(), 0);
    }

    #[test]
    fn late_span_after_completion_starts_a_new_trace() {
        let mut buf = TraceBuffer::new(5_000_000_000, 10_000, 1_000_000, EventDispatcher::default());
        buf.ingest(span("t1", "a", true), 0); // completes immediately (terminator)
        assert!(buf.ingest(span("t1", "late", false), 1).is_none());
        assert_eq!(buf.buffered_trace_count(), 1);
        let completed = buf.flush();
        assert_eq!(completed[0].spans.len(), 1);
        assert_eq!(completed[0].spans[0].name, "late");
    }
}
