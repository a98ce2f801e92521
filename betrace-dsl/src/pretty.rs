//! Renders a parsed [`RuleAst`] back into DSL source text.
//!
//! Used by the round-trip stability property (§8 property 1): parse,
//! render, reparse, and the two ASTs must be structurally equal. Precedence
//! is reconstructed with the minimum parentheses needed to reproduce the
//! exact tree shape the original parse produced — not just a logically
//! equivalent one, since `Predicate`'s derived `PartialEq` compares tree
//! shape, and `and`/`or` chains are left-associative.

use crate::ast::{CmpOp, Literal, Predicate, RuleAst, SpanPattern, WhereClause};

pub fn render_rule(ast: &RuleAst) -> String {
    let mut out = format!("when {{ {} }}", render_predicate(&ast.when));
    if let Some(p) = &ast.always {
        out.push_str(&format!(" always {{ {} }}", render_predicate(p)));
    }
    if let Some(p) = &ast.never {
        out.push_str(&format!(" never {{ {} }}", render_predicate(p)));
    }
    out
}

fn level(p: &Predicate) -> u8 {
    match p {
        Predicate::Or(..) => 1,
        Predicate::And(..) => 2,
        Predicate::Not(_) => 3,
        Predicate::Has(_) | Predicate::Count(..) => 4,
    }
}

fn render_predicate(p: &Predicate) -> String {
    match p {
        Predicate::Or(l, r) => format!(
            "{} or {}",
            render_operand(l, 1),
            render_operand(r, 2)
        ),
        Predicate::And(l, r) => format!(
            "{} and {}",
            render_operand(l, 2),
            render_operand(r, 3)
        ),
        Predicate::Not(inner) => format!("not {}", render_operand(inner, 3)),
        Predicate::Has(pattern) => render_span_pattern(pattern),
        Predicate::Count(pattern, op, n) => {
            format!("count({}) {} {}", pattern.name, op.as_str(), render_number(*n))
        }
    }
}

fn render_operand(p: &Predicate, min_level: u8) -> String {
    let s = render_predicate(p);
    if level(p) < min_level {
        format!("({s})")
    } else {
        s
    }
}

fn render_span_pattern(pattern: &SpanPattern) -> String {
    let mut out = pattern.name.clone();
    for clause in &pattern.where_clauses {
        out.push_str(&format!(".where({})", render_where_clause(clause)));
    }
    out
}

fn render_where_clause(clause: &WhereClause) -> String {
    format!(
        "{} {} {}",
        render_attribute(&clause.attribute),
        clause.op.as_str(),
        render_literal(&clause.value)
    )
}

fn render_attribute(attribute: &str) -> String {
    if is_bare_ident_path(attribute) {
        attribute.to_string()
    } else {
        render_string(attribute)
    }
}

fn is_bare_ident_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
                _ => return false,
            }
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Number(n) => render_number(*n),
        Literal::Str(s) => render_string(s),
        Literal::Bool(b) => b.to_string(),
        Literal::List(items) => {
            let rendered: Vec<String> = items.iter().map(render_literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        Literal::Regex(r) => render_string(&r.pattern),
    }
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn render_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn round_trips(src: &str) {
        let ast = Parser::parse(src).unwrap();
        let rendered = render_rule(&ast);
        let reparsed = Parser::parse(&rendered).unwrap();
        assert_eq!(ast, reparsed, "source: {src:?}, rendered: {rendered:?}");
    }

    #[test]
    fn round_trips_simple_rule() {
        round_trips("when { payment.charge_card } always { payment.fraud_check }");
    }

    #[test]
    fn round_trips_where_clause() {
        round_trips(
            r#"when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }"#,
        );
    }

    #[test]
    fn round_trips_precedence() {
        round_trips("when { x } always { not a.b and c.d or e.f }");
        round_trips("when { x } always { (a.b or c.d) and e.f }");
        round_trips("when { x } always { not (a.b and c.d) }");
    }

    #[test]
    fn round_trips_count_and_lists() {
        round_trips("when { x } always { count(http.retry) <= 3 }");
        round_trips(r#"when { x } never { a.where(code in [500, 502, 503]) }"#);
    }
}
