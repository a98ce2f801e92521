//! Component C: bounded-cost and semantic-sanity checks (§4.C) run after
//! parsing succeeds. `validate_and_compile` both checks the AST and
//! finishes compiling it: `matches` literals are still plain strings when
//! they leave the parser (the grammar's `literal` production has no
//! separate regex kind), so this pass is also where they become
//! `Literal::Regex` — the one place §4.C's "regex literals ... must
//! compile" requirement and the actual `regex::Regex::new` call meet.
//!
//! AST nodes carry no source-position spans (they're erased once parsing
//! succeeds, which is what keeps `PartialEq` on `RuleAst` usable for the
//! round-trip stability property in §8 regardless of how the source was
//! formatted). Validator errors therefore report `Position::default()`
//! rather than a precise `{line,col}` — the message always names the
//! offending identifier, pattern, or count, which is what downstream
//! tooling actually keys on.

use std::sync::Arc;

use betrace_core::errors::{DslError, Position};

use crate::ast::{CmpOp, Literal, Predicate, RuleAst, SpanPattern, WhereClause};

const MAX_DEPTH: u32 = 10;
const MAX_WHERE_CLAUSES: u32 = 20;
const MAX_LIST_ITEMS: u32 = 1024;

pub fn validate_and_compile(ast: RuleAst) -> Result<RuleAst, DslError> {
    check_depth(&ast.when)?;
    if let Some(p) = &ast.always {
        check_depth(p)?;
    }
    if let Some(p) = &ast.never {
        check_depth(p)?;
    }

    let when = validate_predicate(ast.when)?;
    let always = ast.always.map(validate_predicate).transpose()?;
    let never = ast.never.map(validate_predicate).transpose()?;

    Ok(RuleAst {
        when,
        always,
        never,
    })
}

fn check_depth(p: &Predicate) -> Result<(), DslError> {
    let depth = p.depth();
    if depth > MAX_DEPTH {
        return Err(DslError::DepthExceeded {
            at: Position::default(),
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

fn validate_predicate(p: Predicate) -> Result<Predicate, DslError> {
    match p {
        Predicate::And(l, r) => Ok(Predicate::And(
            Box::new(validate_predicate(*l)?),
            Box::new(validate_predicate(*r)?),
        )),
        Predicate::Or(l, r) => Ok(Predicate::Or(
            Box::new(validate_predicate(*l)?),
            Box::new(validate_predicate(*r)?),
        )),
        Predicate::Not(inner) => Ok(Predicate::Not(Box::new(validate_predicate(*inner)?))),
        Predicate::Has(pattern) => Ok(Predicate::Has(validate_span_pattern(pattern)?)),
        Predicate::Count(pattern, op, n) => {
            if n < 0.0 || n.fract() != 0.0 {
                return Err(DslError::InvalidCountLiteral {
                    at: Position::default(),
                });
            }
            // `count(...)` carries no `.where()` in the grammar, but the
            // identifier path itself still needs validating.
            let pattern = validate_span_pattern(pattern)?;
            Ok(Predicate::Count(pattern, op, n))
        }
    }
}

fn validate_span_pattern(pattern: SpanPattern) -> Result<SpanPattern, DslError> {
    validate_ident_path(&pattern.name)?;
    reject_unsupported_operator(&pattern.name)?;

    if pattern.where_clauses.len() as u32 > MAX_WHERE_CLAUSES {
        return Err(DslError::TooManyWhereClauses {
            at: Position::default(),
            count: pattern.where_clauses.len() as u32,
            max: MAX_WHERE_CLAUSES,
        });
    }

    let mut where_clauses = smallvec::SmallVec::new();
    for clause in pattern.where_clauses {
        where_clauses.push(validate_where_clause(clause)?);
    }

    Ok(SpanPattern {
        name: pattern.name,
        where_clauses,
    })
}

fn validate_where_clause(clause: WhereClause) -> Result<WhereClause, DslError> {
    validate_ident_path(&clause.attribute)?;

    let value = match (clause.op, clause.value) {
        (CmpOp::Matches, Literal::Str(pattern)) => Literal::Regex(compile_safe_regex(&pattern)?),
        (CmpOp::In, Literal::List(items)) => {
            validate_in_list(&items)?;
            Literal::List(items)
        }
        (_, other) => other,
    };

    Ok(WhereClause {
        attribute: clause.attribute,
        op: clause.op,
        value,
    })
}

fn validate_in_list(items: &[Literal]) -> Result<(), DslError> {
    if items.len() as u32 > MAX_LIST_ITEMS {
        return Err(DslError::ListTooLarge {
            at: Position::default(),
            count: items.len() as u32,
            max: MAX_LIST_ITEMS,
        });
    }
    if let Some(first) = items.first() {
        let kind = first.kind();
        if items.iter().any(|i| i.kind() != kind) {
            return Err(DslError::MixedListKinds {
                at: Position::default(),
            });
        }
    }
    Ok(())
}

fn validate_ident_path(path: &str) -> Result<(), DslError> {
    if path.is_empty() {
        return Err(DslError::InvalidIdentifier {
            at: Position::default(),
            segment: path.to_string(),
        });
    }
    for segment in path.split('.') {
        if segment.is_empty() || !is_valid_segment(segment) {
            return Err(DslError::InvalidIdentifier {
                at: Position::default(),
                segment: segment.to_string(),
            });
        }
    }
    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if (first as u32) > 127 {
        return true;
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    segment.chars().all(|c| {
        (c as u32) > 127
            || c.is_ascii_alphanumeric()
            || matches!(
                c,
                '_' | '-' | '/' | ':' | '@' | '#' | '$' | '%' | '*' | '?' | '&' | '='
            )
    })
}

/// The "Phase 2" temporal operators named in spec.md's Open Questions are
/// intentionally absent from this DSL; a legacy rule that references them
/// is rejected explicitly rather than silently matched as a plain span
/// name.
fn reject_unsupported_operator(path: &str) -> Result<(), DslError> {
    for name in ["within", "followedBy"] {
        if path == name || path.starts_with(&format!("{name}.")) {
            return Err(DslError::UnsupportedOperator {
                at: Position::default(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Compiles `pattern` and rejects constructs vulnerable to catastrophic
/// backtracking. `regex`'s engine is already linear-time and has no
/// backreferences, so a successful `Regex::new` rules out the
/// backreference half of §4.C's requirement automatically; the heuristic
/// below additionally rejects the classic nested-quantifier shape
/// (`(x+)+`, `(x*)*`, `(x+)*`, `(x*)+`) that is *syntactically* linear but
/// still quadratic-or-worse to match against adversarial input in engines
/// that don't special-case it, and which operators reliably write by
/// accident when composing regexes.
fn compile_safe_regex(pattern: &str) -> Result<crate::ast::CompiledRegex, DslError> {
    if has_nested_quantifier(pattern) {
        return Err(DslError::UnsafeRegex {
            at: Position::default(),
            pattern: pattern.to_string(),
            reason: "nested quantifier risks catastrophic backtracking".to_string(),
        });
    }
    let regex = regex::Regex::new(pattern).map_err(|e| DslError::UnsafeRegex {
        at: Position::default(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(crate::ast::CompiledRegex {
        pattern: pattern.to_string(),
        regex: Arc::new(regex),
    })
}

/// Heuristic scan for `(...[+*])[+*]` shapes: a parenthesized group ending
/// in `+` or `*`, itself immediately followed by `+` or `*`.
fn has_nested_quantifier(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut depth = 0i32;
    let mut group_start: Vec<usize> = Vec::new();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' => {
                depth += 1;
                group_start.push(i);
            }
            ')' => {
                depth -= 1;
                let Some(start) = group_start.pop() else {
                    continue;
                };
                let inner_has_quantifier = chars[start + 1..i]
                    .iter()
                    .any(|c| matches!(c, '+' | '*'));
                let next = chars.get(i + 1).copied();
                if inner_has_quantifier && matches!(next, Some('+') | Some('*')) {
                    return true;
                }
            }
            _ => {}
        }
    }
    depth != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn validate_source(src: &str) -> Result<RuleAst, DslError> {
        validate_and_compile(Parser::parse(src).unwrap())
    }

    #[test]
    fn rejects_catastrophic_regex() {
        let err = validate_source(
            r#"when { x } always { a.where(b matches "^(a+)+$") } "#,
        )
        .unwrap_err();
        assert!(matches!(err, DslError::UnsafeRegex { .. }));
    }

    #[test]
    fn accepts_safe_regex() {
        let ast = validate_source(r#"when { x } always { a.where(b matches "^[a-z]+$") }"#)
            .unwrap();
        assert!(matches!(ast.always, Some(_)));
    }

    #[test]
    fn accepts_integer_count() {
        let result = Parser::parse("when { x } always { count(y) <= 3 }")
            .and_then(validate_and_compile);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_fractional_count() {
        let err = Parser::parse("when { x } always { count(y) <= 3.5 }")
            .and_then(validate_and_compile)
            .unwrap_err();
        assert!(matches!(err, DslError::InvalidCountLiteral { .. }));
    }

    #[test]
    fn rejects_mixed_list_kinds() {
        let err = validate_source(r#"when { x } always { a.where(b in [1, "two"]) }"#)
            .unwrap_err();
        assert!(matches!(err, DslError::MixedListKinds { .. }));
    }

    #[test]
    fn rejects_unsupported_temporal_operator() {
        let err = validate_source("when { within.payment } always { a.b }").unwrap_err();
        assert!(matches!(err, DslError::UnsupportedOperator { .. }));
    }

    #[test]
    fn rejects_too_deep_ast() {
        let mut expr = "a.b".to_string();
        for _ in 0..11 {
            expr = format!("not ({expr})");
        }
        let src = format!("when {{ x }} always {{ {expr} }}");
        let err = validate_source(&src).unwrap_err();
        assert!(matches!(err, DslError::DepthExceeded { .. }));
    }
}
