//! Component B: recursive-descent parser for the grammar in §4.B.
//!
//! Precedence, low to high: `or` < `and` < `not` < primary. `not` is
//! right-associative; `and`/`or` are left-associative chains built by the
//! usual `term ("op" term)*` loop. Parentheses in `primary` override both.

use betrace_core::errors::{DslError, Position};

use crate::ast::{CmpOp, Literal, Predicate, RuleAst, SpanPattern, WhereClause};
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(source: &str) -> Result<RuleAst, DslError> {
        let tokens = crate::lexer::Lexer::tokenize(source)?;
        let mut parser = Self::new(tokens);
        let rule = parser.parse_rule()?;
        parser.expect(TokenKind::Eof, "end of input")?;
        Ok(rule)
    }

    fn parse_rule(&mut self) -> Result<RuleAst, DslError> {
        self.expect(TokenKind::When, "'when'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let when = self.parse_predicate()?;
        self.expect(TokenKind::RBrace, "'}'")?;

        let mut always = None;
        let mut never = None;
        for _ in 0..2 {
            match self.peek_kind() {
                TokenKind::Always if always.is_none() => {
                    self.advance();
                    self.expect(TokenKind::LBrace, "'{'")?;
                    always = Some(self.parse_predicate()?);
                    self.expect(TokenKind::RBrace, "'}'")?;
                }
                TokenKind::Never if never.is_none() => {
                    self.advance();
                    self.expect(TokenKind::LBrace, "'{'")?;
                    never = Some(self.parse_predicate()?);
                    self.expect(TokenKind::RBrace, "'}'")?;
                }
                _ => break,
            }
        }

        if always.is_none() && never.is_none() {
            let pos = self.position();
            return Err(DslError::UnexpectedToken {
                at: pos,
                found: self.peek_kind().describe(),
                expected: "'always' or 'never'".to_string(),
            });
        }

        Ok(RuleAst {
            when,
            always,
            never,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, DslError> {
        self.parse_or_term()
    }

    fn parse_or_term(&mut self) -> Result<Predicate, DslError> {
        let mut left = self.parse_and_term()?;
        while matches!(self.peek_kind(), TokenKind::Or) {
            self.advance();
            let right = self.parse_and_term()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_term(&mut self) -> Result<Predicate, DslError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek_kind(), TokenKind::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate, DslError> {
        if matches!(self.peek_kind(), TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, DslError> {
        match self.peek_kind() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_predicate()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Count => self.parse_count(),
            TokenKind::Ident(_) => self.parse_has(),
            _ => {
                let pos = self.position();
                Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: "'(', 'count', or an identifier".to_string(),
                })
            }
        }
    }

    fn parse_has(&mut self) -> Result<Predicate, DslError> {
        let name = self.parse_ident_path()?;
        let mut where_clauses = smallvec::SmallVec::new();
        while matches!(self.peek_kind(), TokenKind::Dot)
            && matches!(self.peek_kind_at(1), TokenKind::Where)
        {
            self.advance(); // .
            self.advance(); // where
            self.expect(TokenKind::LParen, "'('")?;
            where_clauses.push(self.parse_where_expr()?);
            self.expect(TokenKind::RParen, "')'")?;
        }
        Ok(Predicate::Has(SpanPattern { name, where_clauses }))
    }

    fn parse_count(&mut self) -> Result<Predicate, DslError> {
        self.expect(TokenKind::Count, "'count'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let name = self.parse_ident_path()?;
        self.expect(TokenKind::RParen, "')'")?;
        let op = self.parse_cmp_op()?;
        let n = self.expect_number()?;
        Ok(Predicate::Count(
            SpanPattern {
                name,
                where_clauses: Default::default(),
            },
            op,
            n,
        ))
    }

    fn parse_where_expr(&mut self) -> Result<WhereClause, DslError> {
        let attribute = match self.peek_kind().clone() {
            TokenKind::Str(s) => {
                self.advance();
                s
            }
            _ => self.parse_ident_path()?,
        };
        let op = self.parse_cmp_op()?;
        let value = self.parse_literal()?;
        Ok(WhereClause {
            attribute,
            op,
            value,
        })
    }

    fn parse_ident_path(&mut self) -> Result<String, DslError> {
        let first = self.expect_ident()?;
        let mut path = first;
        loop {
            if matches!(self.peek_kind(), TokenKind::Dot)
                && !matches!(self.peek_kind_at(1), TokenKind::Where)
            {
                self.advance();
                let seg = self.expect_ident()?;
                path.push('.');
                path.push_str(&seg);
            } else {
                break;
            }
        }
        Ok(path)
    }

    fn parse_cmp_op(&mut self) -> Result<CmpOp, DslError> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::In => CmpOp::In,
            TokenKind::Matches => CmpOp::Matches,
            _ => {
                let pos = self.position();
                return Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: "a comparison operator".to_string(),
                });
            }
        };
        self.advance();
        Ok(op)
    }

    fn parse_literal(&mut self) -> Result<Literal, DslError> {
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Literal::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Literal::Str(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Literal::Bool(false))
            }
            TokenKind::LBracket => self.parse_list(),
            _ => {
                let pos = self.position();
                Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: "a literal".to_string(),
                })
            }
        }
    }

    fn parse_list(&mut self) -> Result<Literal, DslError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::RBracket) {
            items.push(self.parse_literal()?);
            while matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
                items.push(self.parse_literal()?);
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Literal::List(items))
    }

    fn expect_ident(&mut self) -> Result<String, DslError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => {
                let pos = self.position();
                Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: "an identifier".to_string(),
                })
            }
        }
    }

    fn expect_number(&mut self) -> Result<f64, DslError> {
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n)
            }
            _ => {
                let pos = self.position();
                Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: "a number".to_string(),
                })
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), DslError> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(&kind) {
            self.advance();
            Ok(())
        } else {
            let pos = self.position();
            if matches!(self.peek_kind(), TokenKind::Eof) {
                Err(DslError::UnexpectedEof {
                    at: pos,
                    expected: expected.to_string(),
                })
            } else {
                Err(DslError::UnexpectedToken {
                    at: pos,
                    found: self.peek_kind().describe(),
                    expected: expected.to_string(),
                })
            }
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn position(&self) -> Position {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        Position {
            line: tok.line,
            col: tok.col,
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s1_payment_fraud_rule() {
        let ast = Parser::parse(
            "when { payment.charge_card } always { payment.fraud_check }",
        )
        .unwrap();
        assert!(matches!(ast.when, Predicate::Has(_)));
        assert!(ast.always.is_some());
        assert!(ast.never.is_none());
    }

    #[test]
    fn requires_always_or_never() {
        let err = Parser::parse("when { payment.charge_card }").unwrap_err();
        assert!(matches!(err, DslError::UnexpectedToken { .. }));
    }

    #[test]
    fn not_and_or_precedence() {
        // not a and b or c  ==  ((not a) and b) or c
        let ast = Parser::parse(
            "when { x } always { not a.b and c.d or e.f }",
        )
        .unwrap();
        let always = ast.always.unwrap();
        match always {
            Predicate::Or(lhs, rhs) => {
                assert!(matches!(*rhs, Predicate::Has(_)));
                match *lhs {
                    Predicate::And(l, _r) => assert!(matches!(*l, Predicate::Not(_))),
                    other => panic!("expected And, got {other:?}"),
                }
            }
            other => panic!("expected Or at top, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a and b or c and d  ==  (a and b) or (c and d)
        let ast = Parser::parse("when { x } always { a.b and c.d or e.f and g.h }").unwrap();
        match ast.always.unwrap() {
            Predicate::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Predicate::And(_, _)));
                assert!(matches!(*rhs, Predicate::And(_, _)));
            }
            other => panic!("expected Or at top, got {other:?}"),
        }
    }

    #[test]
    fn count_predicate_parses() {
        let ast =
            Parser::parse("when { http.request } always { count(http.retry) <= 3 }").unwrap();
        assert!(matches!(ast.always.unwrap(), Predicate::Count(_, CmpOp::Le, n) if n == 3.0));
    }

    #[test]
    fn where_clause_parses() {
        let ast = Parser::parse(
            "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
        )
        .unwrap();
        match ast.when {
            Predicate::Has(pattern) => {
                assert_eq!(pattern.name, "payment.charge_card");
                assert_eq!(pattern.where_clauses.len(), 1);
                assert_eq!(pattern.where_clauses[0].attribute, "amount");
                assert_eq!(pattern.where_clauses[0].op, CmpOp::Gt);
            }
            other => panic!("expected Has, got {other:?}"),
        }
    }

    #[test]
    fn error_message_shape_is_positional() {
        let err = Parser::parse("wehn { x } always { y }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("1:1:"), "got {msg:?}");
    }
}
