//! AST node shapes (§3). Immutable once constructed by the parser; the
//! validator inspects but never mutates them, and the evaluator only ever
//! holds a shared reference to a validated tree.

use std::sync::Arc;

use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleAst {
    pub when: Predicate,
    pub always: Option<Predicate>,
    pub never: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Has(SpanPattern),
    Count(SpanPattern, CmpOp, f64),
}

impl Predicate {
    /// Tree depth, used by the validator's depth ≤ 10 check (§4.C).
    pub fn depth(&self) -> u32 {
        match self {
            Predicate::And(l, r) | Predicate::Or(l, r) => 1 + l.depth().max(r.depth()),
            Predicate::Not(p) => 1 + p.depth(),
            Predicate::Has(_) | Predicate::Count(_, _, _) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanPattern {
    pub name: String,
    pub where_clauses: SmallVec<[WhereClause; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub attribute: String,
    pub op: CmpOp,
    pub value: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Matches,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::In => "in",
            CmpOp::Matches => "matches",
        }
    }
}

/// A compiled regex, wrapped so `Literal` can implement `PartialEq` by
/// comparing source patterns — two regexes with the same pattern text are
/// equal for the round-trip stability property (§8 property 1) even
/// though `regex::Regex` itself has no `PartialEq`.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pub pattern: String,
    pub regex: Arc<regex::Regex>,
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<Literal>),
    Regex(CompiledRegex),
}

impl Literal {
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Number(_) => "number",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "bool",
            Literal::List(_) => "list",
            Literal::Regex(_) => "regex",
        }
    }

    pub fn to_value(&self) -> betrace_core::model::Value {
        match self {
            Literal::Number(n) => betrace_core::model::Value::Number(*n),
            Literal::Str(s) => betrace_core::model::Value::Str(s.clone()),
            Literal::Bool(b) => betrace_core::model::Value::Bool(*b),
            Literal::List(items) => {
                betrace_core::model::Value::List(items.iter().map(Literal::to_value).collect())
            }
            Literal::Regex(r) => betrace_core::model::Value::Str(r.pattern.clone()),
        }
    }
}
