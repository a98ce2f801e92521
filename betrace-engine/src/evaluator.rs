//! Component D: executes a compiled rule against a buffered trace (§4.D).
//!
//! Evaluation is pure and deterministic: given the same `Trace` and
//! `RuleAst`, [`evaluate`] always returns bit-identical output, including
//! the ordering of a violation's context map (`BTreeMap` is already
//! lexicographic). No system clock or RNG call happens here — timestamps
//! and ids are stamped by the caller from the injected `Clock`/`Rand`.

use std::collections::BTreeMap;

use betrace_core::model::{Span, Trace, Value};
use betrace_dsl::{CmpOp, Literal, Predicate, RuleAst, SpanPattern};

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch,
    Violation { message: String, context: BTreeMap<String, Value> },
}

/// Evaluates `ast` against `trace`, implementing the when/always/never
/// contract from §4.D: `when` gates applicability, `always` must hold,
/// `never` must not.
pub fn evaluate(ast: &RuleAst, trace: &Trace) -> MatchResult {
    if !eval_predicate(&ast.when, trace) {
        return MatchResult::NoMatch;
    }

    if let Some(always) = &ast.always {
        if !eval_predicate(always, trace) {
            return MatchResult::Violation {
                message: "always clause failed".to_string(),
                context: violation_context(trace),
            };
        }
    }

    if let Some(never) = &ast.never {
        if eval_predicate(never, trace) {
            return MatchResult::Violation {
                message: "never clause matched".to_string(),
                context: violation_context(trace),
            };
        }
    }

    MatchResult::NoMatch
}

fn violation_context(trace: &Trace) -> BTreeMap<String, Value> {
    let mut ctx = BTreeMap::new();
    ctx.insert("trace_id".to_string(), Value::Str(trace.trace_id.clone()));
    ctx.insert(
        "span_count".to_string(),
        Value::Number(trace.spans.len() as f64),
    );
    ctx
}

fn eval_predicate(p: &Predicate, trace: &Trace) -> bool {
    match p {
        Predicate::And(l, r) => eval_predicate(l, trace) && eval_predicate(r, trace),
        Predicate::Or(l, r) => eval_predicate(l, trace) || eval_predicate(r, trace),
        Predicate::Not(inner) => !eval_predicate(inner, trace),
        Predicate::Has(pattern) => matching_spans(pattern, trace).next().is_some(),
        Predicate::Count(pattern, op, n) => {
            let count = matching_spans(pattern, trace).count() as f64;
            compare_numbers(count, op_as_numeric_cmp(*op), *n)
        }
    }
}

fn matching_spans<'a>(pattern: &'a SpanPattern, trace: &'a Trace) -> impl Iterator<Item = &'a Span> {
    #[cfg(test)]
    record_probe(&pattern.name);
    trace
        .spans_named(&pattern.name)
        .filter(move |span| pattern.where_clauses.iter().all(|c| where_clause_matches(c, span)))
}

/// Test-only hook recording which span patterns were actually probed, so
/// the short-circuit property (§8 property 4) can assert a predicate's
/// un-taken branch was never touched rather than just asserting the
/// final boolean outcome.
#[cfg(test)]
thread_local! {
    static EVAL_PROBES: std::cell::RefCell<Vec<String>> = std::cell::RefCell::new(Vec::new());
}

#[cfg(test)]
fn record_probe(name: &str) {
    EVAL_PROBES.with(|p| p.borrow_mut().push(name.to_string()));
}

#[cfg(test)]
fn take_probes() -> Vec<String> {
    EVAL_PROBES.with(|p| std::mem::take(&mut *p.borrow_mut()))
}

fn where_clause_matches(clause: &betrace_dsl::WhereClause, span: &Span) -> bool {
    let Some(actual) = span.attrs.get(&clause.attribute) else {
        return false;
    };
    match clause.op {
        CmpOp::Eq => value_eq(actual, &clause.value),
        CmpOp::Ne => !value_eq(actual, &clause.value),
        CmpOp::Gt => value_cmp(actual, &clause.value) == Some(std::cmp::Ordering::Greater),
        CmpOp::Ge => matches!(
            value_cmp(actual, &clause.value),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        ),
        CmpOp::Lt => value_cmp(actual, &clause.value) == Some(std::cmp::Ordering::Less),
        CmpOp::Le => matches!(
            value_cmp(actual, &clause.value),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        ),
        CmpOp::In => match &clause.value {
            Literal::List(items) => items.iter().any(|item| value_eq(actual, item)),
            _ => false,
        },
        CmpOp::Matches => match (&clause.value, actual) {
            (Literal::Regex(re), Value::Str(s)) => re.regex.is_match(s),
            _ => false,
        },
    }
}

/// `==`/`!=`/ordering semantics per §4.D: no coercion across primitive
/// kinds, NaN never equal (including to itself), byte-exact strings.
fn value_eq(a: &Value, b: &Literal) -> bool {
    a.eq_primitive(&b.to_value())
}

fn value_cmp(a: &Value, b: &Literal) -> Option<std::cmp::Ordering> {
    a.partial_cmp_primitive(&b.to_value())
}

fn op_as_numeric_cmp(op: CmpOp) -> CmpOp {
    op
}

fn compare_numbers(actual: f64, op: CmpOp, expected: f64) -> bool {
    match op {
        CmpOp::Eq => actual == expected,
        CmpOp::Ne => actual != expected,
        CmpOp::Gt => actual > expected,
        CmpOp::Ge => actual >= expected,
        CmpOp::Lt => actual < expected,
        CmpOp::Le => actual <= expected,
        // `count()`'s grammar production only ever yields a numeric
        // comparison operator; `in`/`matches` can't reach here because
        // the parser doesn't accept them after `count(...)`.
        CmpOp::In | CmpOp::Matches => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use betrace_core::model::{CompletionReason, SpanStatus};
    use betrace_dsl::compile;

    fn span(name: &str, attrs: &[(&str, Value)]) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: format!("s-{name}"),
            parent_id: None,
            name: name.to_string(),
            start_ns: 0,
            end_ns: 1,
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            status: SpanStatus::Unset,
        }
    }

    fn trace(spans: Vec<Span>) -> Trace {
        Trace {
            trace_id: "t1".to_string(),
            spans,
            first_seen_ns: 0,
            last_activity_ns: 1,
            reason: CompletionReason::Flush,
        }
    }

    #[test]
    fn s1_payment_fraud_check_required() {
        let ast = compile("when { payment.charge_card } always { payment.fraud_check }").unwrap();
        let t = trace(vec![span(
            "payment.charge_card",
            &[("amount", Value::Number(1500.0))],
        )]);
        assert!(matches!(evaluate(&ast, &t), MatchResult::Violation { .. }));
    }

    #[test]
    fn s2_pii_access_without_audit() {
        let ast = compile("when { pii.access } never { audit.log }").unwrap();
        let without_audit = trace(vec![span("pii.access", &[])]);
        assert!(matches!(
            evaluate(&ast, &without_audit),
            MatchResult::Violation { .. }
        ));

        let with_audit = trace(vec![span("pii.access", &[]), span("audit.log", &[])]);
        assert_eq!(evaluate(&ast, &with_audit), MatchResult::NoMatch);
    }

    #[test]
    fn s3_retry_bound() {
        let ast = compile("when { http.request } always { count(http.retry) <= 3 }").unwrap();

        let four_retries = trace(
            std::iter::once(span("http.request", &[]))
                .chain((0..4).map(|_| span("http.retry", &[])))
                .collect(),
        );
        assert!(matches!(
            evaluate(&ast, &four_retries),
            MatchResult::Violation { .. }
        ));

        let three_retries = trace(
            std::iter::once(span("http.request", &[]))
                .chain((0..3).map(|_| span("http.retry", &[])))
                .collect(),
        );
        assert_eq!(evaluate(&ast, &three_retries), MatchResult::NoMatch);
    }

    #[test]
    fn s4_where_filter() {
        let ast = compile(
            "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
        )
        .unwrap();

        let below_threshold = trace(vec![span(
            "payment.charge_card",
            &[("amount", Value::Number(500.0))],
        )]);
        assert_eq!(evaluate(&ast, &below_threshold), MatchResult::NoMatch);

        let above_threshold = trace(vec![span(
            "payment.charge_card",
            &[("amount", Value::Number(1500.0))],
        )]);
        assert!(matches!(
            evaluate(&ast, &above_threshold),
            MatchResult::Violation { .. }
        ));
    }

    #[test]
    fn nan_never_equal() {
        let ast = compile("when { x } always { x.where(v == 1) }").unwrap();
        let t = trace(vec![span("x", &[("v", Value::Number(f64::NAN))])]);
        // v == 1 is false (NaN), so `always` fails => Violation.
        assert!(matches!(evaluate(&ast, &t), MatchResult::Violation { .. }));
    }

    #[test]
    fn cross_type_comparison_is_always_false() {
        let ast = compile("when { x } never { x.where(v == \"1\") }").unwrap();
        let t = trace(vec![span("x", &[("v", Value::Number(1.0))])]);
        // number 1 vs string "1": never false => no violation
        assert_eq!(evaluate(&ast, &t), MatchResult::NoMatch);
    }

    #[test]
    fn short_circuit_and_skips_second_operand() {
        let ast = compile("when { z } always { x and y }").unwrap();
        let t = trace(vec![span("z", &[]), span("y", &[])]);
        take_probes(); // drain whatever prior tests left behind
        let result = evaluate(&ast, &t);
        assert!(matches!(result, MatchResult::Violation { .. }));
        let probes = take_probes();
        assert!(probes.contains(&"x".to_string()));
        assert!(
            !probes.contains(&"y".to_string()),
            "`y` must not be probed once `x` is known false: {probes:?}"
        );
    }

    #[test]
    fn short_circuit_or_skips_second_operand() {
        let ast = compile("when { z } always { x or y }").unwrap();
        let t = trace(vec![span("z", &[]), span("x", &[]), span("y", &[])]);
        take_probes();
        let result = evaluate(&ast, &t);
        assert_eq!(result, MatchResult::NoMatch); // x is true, always holds
        let probes = take_probes();
        assert!(probes.contains(&"x".to_string()));
        assert!(
            !probes.contains(&"y".to_string()),
            "`y` must not be probed once `x` is known true: {probes:?}"
        );
    }
}
