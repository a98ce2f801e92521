//! The persisted `Rule` record (§3, §6). The compiled AST is intentionally
//! *not* a field here — §3 states `compiled` is never persisted and is
//! re-derived on load, so it lives alongside this record in the Rule
//! Store's in-memory cache (`betrace-store::RuleStore`) rather than on the
//! struct itself. That keeps `betrace-core` free of a dependency on
//! `betrace-dsl`'s AST types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// The JSON schema persisted under `rules/<id>.json` (§6). Field order and
/// names are part of the stable on-disk contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub expression: String,
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `create`/`update`/`validate` — everything a caller supplies,
/// minus the fields the store derives (`id`, timestamps).
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Filters accepted by `RuleStore::list` (§4.E).
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub enabled_only: bool,
    pub severity: Option<Severity>,
    pub tags: Vec<String>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &Rule) -> bool {
        if self.enabled_only && !rule.enabled {
            return false;
        }
        if let Some(sev) = self.severity {
            if rule.severity != sev {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| rule.tags.contains(t)) {
            return false;
        }
        true
    }
}
