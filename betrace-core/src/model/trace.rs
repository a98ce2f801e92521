//! The buffered `Trace` (§3): an arrival-ordered bag of spans sharing a
//! `trace_id`, plus the timestamps the Trace Buffer needs for completion
//! detection.

use super::span::Span;

/// Why a trace was completed. Carried alongside the trace for diagnostics
/// and for the late-span accounting described in SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    Timeout,
    Terminator,
    MaxSpans,
    BufferOverflow,
    Flush,
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub first_seen_ns: u64,
    pub last_activity_ns: u64,
    pub reason: CompletionReason,
}

impl Trace {
    /// Invariant from §3: every span in `spans` shares `trace_id`.
    pub fn is_consistent(&self) -> bool {
        self.spans.iter().all(|s| s.trace_id == self.trace_id)
    }

    /// Every span in the trace whose `name` equals `name`.
    pub fn spans_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| s.name == name)
    }
}
