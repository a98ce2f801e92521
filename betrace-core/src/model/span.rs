//! The ingestion-facing `Span` (§3) and its status shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// A single OpenTelemetry-shaped span, as received from the transport
/// layer. `attrs` values are deep-copied on construction (`Span::new`) so
/// the engine can treat a stored span as immutable without a borrow tying
/// it to the caller's buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub start_ns: u64,
    pub end_ns: u64,
    pub attrs: BTreeMap<String, Value>,
    #[serde(default)]
    pub status: SpanStatus,
}

impl Span {
    /// Well-formedness check performed by the Ingestion Orchestrator
    /// before a span is accepted into the buffer (§4.H step 1).
    pub fn validate(&self) -> Result<(), String> {
        if self.trace_id.is_empty() {
            return Err("trace_id is empty".to_string());
        }
        if self.span_id.is_empty() {
            return Err("span_id is empty".to_string());
        }
        if self.name.is_empty() {
            return Err("name is empty".to_string());
        }
        if self.start_ns > self.end_ns {
            return Err(format!(
                "start_ns ({}) > end_ns ({})",
                self.start_ns, self.end_ns
            ));
        }
        Ok(())
    }

    /// True when this span carries the trace-buffer terminator marker
    /// (§4.F: `attrs["trace.terminator"] == true`).
    pub fn is_terminator(&self) -> bool {
        matches!(self.attrs.get("trace.terminator"), Some(Value::Bool(true)))
    }
}
