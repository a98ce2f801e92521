//! Component A: UTF-8 → token stream (§4.A).
//!
//! The alphabet is deliberately permissive: identifiers accept letters,
//! digits, `_`, any codepoint above ASCII, and the "safe identifier
//! chars" `- / : @ # $ % * ? & = .` so that span names, attribute paths,
//! and even bare URLs lex as a single identifier (§8 property 11). Two
//! pieces of lookahead keep that permissiveness from swallowing real
//! operators:
//!
//! - while scanning an identifier, a `=` is only consumed if the
//!   following character is *not* also `=` — otherwise `==` would never
//!   tokenize as an operator inside an unspaced comparison like
//!   `amount==100`.
//! - a `.` is only consumed if the text immediately following it is not
//!   the literal `where(` — otherwise `payment.charge_card.where(...)`
//!   could never split into an ident_path and a `.where(` clause.
//!
//! Both rules are narrow, local lookaheads rather than a general
//! backtracking scheme, which is what makes the lexer a single forward
//! pass over the input.

use betrace_core::errors::{DslError, Position};

use crate::token::{keyword_for, Token, TokenKind};

const SAFE_IDENT_CHARS: &[char] = &['-', '/', ':', '@', '#', '$', '%', '*', '?', '&', '='];

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(source: &str) -> Result<Vec<Token>, DslError> {
        let mut lexer = Self::new(source);
        lexer.run()
    }

    fn run(&mut self) -> Result<Vec<Token>, DslError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let pos = self.position();
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line: pos.line,
                    col: pos.col,
                });
                break;
            };

            if let Some(tok) = self.try_lex_operator_or_punct(pos)? {
                tokens.push(tok);
                continue;
            }

            if ch == '"' {
                tokens.push(self.lex_string(pos)?);
                continue;
            }

            if ch == '-' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                tokens.push(self.lex_number(pos));
                continue;
            }

            if ch.is_ascii_digit() {
                tokens.push(self.lex_number(pos));
                continue;
            }

            if is_ident_start(ch) {
                tokens.push(self.lex_ident(pos));
                continue;
            }

            return Err(DslError::UnexpectedChar { at: pos, ch });
        }
        Ok(tokens)
    }

    fn try_lex_operator_or_punct(&mut self, pos: Position) -> Result<Option<Token>, DslError> {
        let ch = self.peek().unwrap();
        let two = self.peek_str(2);

        macro_rules! emit {
            ($len:expr, $kind:expr) => {{
                let lexeme = self.take(pos, $len);
                return Ok(Some(Token {
                    kind: $kind,
                    lexeme,
                    line: pos.line,
                    col: pos.col,
                }));
            }};
        }

        match two.as_deref() {
            Some("==") => emit!(2, TokenKind::EqEq),
            Some("!=") => emit!(2, TokenKind::NotEq),
            Some(">=") => emit!(2, TokenKind::Ge),
            Some("<=") => emit!(2, TokenKind::Le),
            _ => {}
        }

        match ch {
            '!' => return Err(DslError::UnexpectedChar { at: pos, ch: '!' }),
            '>' => emit!(1, TokenKind::Gt),
            '<' => emit!(1, TokenKind::Lt),
            '{' => emit!(1, TokenKind::LBrace),
            '}' => emit!(1, TokenKind::RBrace),
            '(' => emit!(1, TokenKind::LParen),
            ')' => emit!(1, TokenKind::RParen),
            '[' => emit!(1, TokenKind::LBracket),
            ']' => emit!(1, TokenKind::RBracket),
            ',' => emit!(1, TokenKind::Comma),
            '|' => emit!(1, TokenKind::Pipe),
            '.' => emit!(1, TokenKind::Dot),
            _ => {}
        }

        Ok(None)
    }

    fn lex_ident(&mut self, pos: Position) -> Token {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                if ch == '=' && self.peek_at(1) == Some('=') {
                    break;
                }
                if ch == '.' && self.upcoming_is("where(") {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword_for(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        Token {
            kind,
            lexeme,
            line: pos.line,
            col: pos.col,
        }
    }

    fn lex_number(&mut self, pos: Position) -> Token {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = lexeme.parse().unwrap_or(f64::NAN);
        Token {
            kind: TokenKind::Number(value),
            lexeme,
            line: pos.line,
            col: pos.col,
        }
    }

    fn lex_string(&mut self, pos: Position) -> Result<Token, DslError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(DslError::UnterminatedString { at: pos }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            value.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            value.push('\t');
                            self.advance();
                        }
                        Some('"') => {
                            value.push('"');
                            self.advance();
                        }
                        Some('\\') => {
                            value.push('\\');
                            self.advance();
                        }
                        Some(other) => {
                            value.push(other);
                            self.advance();
                        }
                        None => return Err(DslError::UnterminatedString { at: pos }),
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
        let lexeme = format!("{value:?}");
        Ok(Token {
            kind: TokenKind::Str(value),
            lexeme,
            line: pos.line,
            col: pos.col,
        })
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn peek_str(&self, len: usize) -> Option<String> {
        if self.pos + len > self.chars.len() {
            return None;
        }
        Some(self.chars[self.pos..self.pos + len].iter().collect())
    }

    fn upcoming_is(&self, literal: &str) -> bool {
        let lit_chars: Vec<char> = literal.chars().collect();
        if self.pos + 1 + lit_chars.len() > self.chars.len() {
            return false;
        }
        self.chars[self.pos + 1..self.pos + 1 + lit_chars.len()] == lit_chars[..]
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn take(&mut self, _pos: Position, len: usize) -> String {
        let s: String = self.chars[self.pos..self.pos + len].iter().collect();
        for _ in 0..len {
            self.advance();
        }
        s
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || (ch as u32) > 127 || SAFE_IDENT_CHARS.contains(&ch)
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric()
        || ch == '_'
        || (ch as u32) > 127
        || SAFE_IDENT_CHARS.contains(&ch)
        || ch == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn operator_before_identifier() {
        let k = kinds("amount == 100");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("amount".to_string()),
                TokenKind::EqEq,
                TokenKind::Number(100.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unspaced_equality_still_splits() {
        let k = kinds("amount==100");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("amount".to_string()),
                TokenKind::EqEq,
                TokenKind::Number(100.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn traceql_compatible_identifiers_are_single_tokens() {
        for src in [
            "payment-service",
            "api/v1/users",
            "http://api.example.com:8080/v1?id=1",
            "💰checkout",
        ] {
            let k = kinds(src);
            assert_eq!(k.len(), 2, "expected one ident + EOF for {src:?}, got {k:?}");
            assert_eq!(k[0], TokenKind::Ident(src.to_string()));
        }
    }

    #[test]
    fn dot_path_folds_into_ident_then_splits_before_where() {
        let k = kinds("payment.charge_card.where(amount > 1000)");
        assert_eq!(
            k[..3],
            [
                TokenKind::Ident("payment.charge_card".to_string()),
                TokenKind::Dot,
                TokenKind::Where,
            ]
        );
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Lexer::tokenize(r#""unterminated"#).unwrap_err();
        assert!(matches!(err, DslError::UnterminatedString { .. }));
    }

    #[test]
    fn keywords_are_recognized() {
        let k = kinds("when always never and or not in matches count where true false");
        assert_eq!(
            k,
            vec![
                TokenKind::When,
                TokenKind::Always,
                TokenKind::Never,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::In,
                TokenKind::Matches,
                TokenKind::Count,
                TokenKind::Where,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Eof,
            ]
        );
    }
}
