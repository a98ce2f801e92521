//! Stable string error codes for the API boundary (§6), following the
//! teacher's `DriftErrorCode` trait: every error enum in the workspace
//! implements this so a transport adapter can map a `Result` to an HTTP
//! status/body without matching on the error's `Display` text.

pub trait BeTraceErrorCode {
    fn error_code(&self) -> &'static str;
}

impl BeTraceErrorCode for super::RuleStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "RULE_NOT_FOUND",
            Self::Duplicate(_) => "RULE_DUPLICATE",
            Self::InvalidExpression(_) => "RULE_INVALID_EXPRESSION",
            Self::Disk(_) => "DISK_ERROR",
            Self::InvariantViolation(_) => "INTERNAL_INVARIANT_VIOLATION",
        }
    }
}

impl BeTraceErrorCode for super::ViolationStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "VIOLATION_NOT_FOUND",
            Self::Tampered(_) => "VIOLATION_TAMPERED",
            Self::Disk(_) => "DISK_ERROR",
            Self::InvariantViolation(_) => "INTERNAL_INVARIANT_VIOLATION",
        }
    }
}

impl BeTraceErrorCode for super::DslError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnterminatedString { .. } => "LEX_UNTERMINATED_STRING",
            Self::UnexpectedChar { .. } => "LEX_UNEXPECTED_CHAR",
            Self::UnexpectedToken { .. } | Self::UnexpectedEof { .. } => "PARSE_ERROR",
            Self::DepthExceeded { .. } => "VALIDATE_DEPTH_EXCEEDED",
            Self::TooManyWhereClauses { .. } => "VALIDATE_TOO_MANY_WHERE_CLAUSES",
            Self::InvalidCountLiteral { .. } => "VALIDATE_INVALID_COUNT_LITERAL",
            Self::UnsafeRegex { .. } => "VALIDATE_UNSAFE_REGEX",
            Self::InvalidIdentifier { .. } => "VALIDATE_INVALID_IDENTIFIER",
            Self::ListTooLarge { .. } => "VALIDATE_LIST_TOO_LARGE",
            Self::MixedListKinds { .. } => "VALIDATE_MIXED_LIST_KINDS",
            Self::UnsupportedOperator { .. } => "VALIDATE_UNSUPPORTED_OPERATOR",
        }
    }
}

impl BeTraceErrorCode for super::DiskError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "DISK_IO_ERROR",
            Self::DiskFull { .. } => "DISK_FULL",
            Self::RetryExhausted { .. } => "DISK_RETRY_EXHAUSTED",
            Self::Corrupt { .. } => "DISK_CORRUPT",
        }
    }
}

impl BeTraceErrorCode for super::Overloaded {
    fn error_code(&self) -> &'static str {
        "OVERLOADED"
    }
}
