//! Lexer, parser, and validator for the `when`/`always`/`never` rule
//! language (components A-C). [`compile`] is the single public entry
//! point the rule store uses: it turns rule source text into a validated,
//! regex-compiled [`RuleAst`] ready for the evaluator, or a [`DslError`]
//! whose `Display` impl is a positional `L:C: message` string.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod token;
pub mod validator;

pub use ast::{CmpOp, CompiledRegex, Literal, Predicate, RuleAst, SpanPattern, WhereClause};
pub use betrace_core::errors::DslError;
pub use parser::Parser;
pub use pretty::render_rule;
pub use validator::validate_and_compile;

/// Lexes, parses, and validates `expression`, returning an AST whose
/// `matches` literals have already been compiled to [`CompiledRegex`].
pub fn compile(expression: &str) -> Result<RuleAst, DslError> {
    let ast = Parser::parse(expression)?;
    validate_and_compile(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_the_readme_example() {
        let ast = compile(
            "when { payment.charge_card } always { payment.fraud_check.where(status == \"completed\") }",
        )
        .unwrap();
        assert!(matches!(ast.when, Predicate::Has(_)));
    }

    #[test]
    fn surfaces_validator_errors_through_compile() {
        let err = compile("when { within.legacy } always { a.b }").unwrap_err();
        assert!(matches!(err, DslError::UnsupportedOperator { .. }));
    }
}
