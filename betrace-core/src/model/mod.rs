pub mod rule;
pub mod span;
pub mod trace;
pub mod value;
pub mod violation;

pub use rule::{Rule, RuleFilter, RuleInput, Severity};
pub use span::{Span, SpanStatus};
pub use trace::{CompletionReason, Trace};
pub use value::Value;
pub use violation::{Violation, ViolationFilter};
