//! Workload generation for the simulation harness: deterministic span
//! and rule streams driven entirely off a seeded [`Rand`], so a failing
//! run replays bit-for-bit from its seed (§9).

use std::collections::BTreeMap;

use betrace_core::model::{Severity, SpanStatus, Value};
use betrace_core::Rand;

const SPAN_NAMES: &[&str] = &[
    "payment.charge_card",
    "payment.fraud_check",
    "pii.access",
    "audit.log",
    "http.request",
    "http.retry",
];

/// Draws a pseudo-random span for `trace_id`, occasionally marking it a
/// terminator so traces complete by more than one path during a run.
pub fn random_span(rand: &dyn Rand, trace_id: &str, now_ns: u64, terminator_chance_pct: u64) -> betrace_core::model::Span {
    let name = SPAN_NAMES[(rand.next_u64() as usize) % SPAN_NAMES.len()];
    let mut attrs = BTreeMap::new();
    attrs.insert("amount".to_string(), Value::Number((rand.next_u64() % 5000) as f64));
    if rand.next_u64() % 100 < terminator_chance_pct {
        attrs.insert("trace.terminator".to_string(), Value::Bool(true));
    }

    betrace_core::model::Span {
        trace_id: trace_id.to_string(),
        span_id: format!("span-{:x}", rand.next_u64()),
        parent_id: None,
        name: name.to_string(),
        start_ns: now_ns,
        end_ns: now_ns + 1,
        attrs,
        status: SpanStatus::Unset,
    }
}

/// A stream of spans across `trace_count` concurrently in-flight
/// traces, interleaved in arrival order the way real ingestion would see
/// them — the point of property 7/8 is that interleaving must not cause
/// a trace to be dropped or double-emitted.
pub fn interleaved_span_stream(
    rand: &dyn Rand,
    trace_count: usize,
    spans_per_trace: usize,
    start_ns: u64,
) -> Vec<betrace_core::model::Span> {
    let trace_ids: Vec<String> = (0..trace_count).map(|i| format!("trace-{i}")).collect();
    let mut spans = Vec::with_capacity(trace_count * spans_per_trace);
    let mut now = start_ns;

    for _ in 0..spans_per_trace {
        for trace_id in &trace_ids {
            spans.push(random_span(rand, trace_id, now, 2));
            now += 1_000_000; // 1ms apart
        }
    }
    spans
}

pub fn random_rule_input(rand: &dyn Rand) -> betrace_core::model::RuleInput {
    const EXPRESSIONS: &[&str] = &[
        "when { payment.charge_card } always { payment.fraud_check }",
        "when { pii.access } never { audit.log }",
        "when { http.request } always { count(http.retry) <= 3 }",
        "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
    ];
    const SEVERITIES: &[Severity] = &[Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    let expr = EXPRESSIONS[(rand.next_u64() as usize) % EXPRESSIONS.len()];
    let severity = SEVERITIES[(rand.next_u64() as usize) % SEVERITIES.len()];

    betrace_core::model::RuleInput {
        name: format!("generated-rule-{:x}", rand.next_u64()),
        description: String::new(),
        severity,
        expression: expr.to_string(),
        enabled: true,
        tags: vec![],
    }
}
