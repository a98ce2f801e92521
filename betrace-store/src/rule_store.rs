//! Component E: rule CRUD, compilation caching, and crash-safe
//! persistence (§4.E).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use betrace_core::errors::{DslError, RuleStoreError};
use betrace_core::model::{Rule, RuleFilter, RuleInput};
use betrace_core::{Clock, Filesystem, Rand};
use betrace_dsl::RuleAst;
use parking_lot::RwLock;

/// The in-memory compilation result for a rule, re-derived from
/// `expression` on every create/update/load rather than persisted (§3:
/// "the `compiled` field is never persisted").
#[derive(Clone)]
pub enum CompiledState {
    Valid(Arc<RuleAst>),
    Invalid(DslError),
}

struct StoredRule {
    rule: Rule,
    compiled: CompiledState,
}

pub struct RuleStore {
    dir: PathBuf,
    fs: Arc<dyn Filesystem>,
    inner: RwLock<Vec<StoredRule>>,
}

impl RuleStore {
    /// Scans `dir` for `*.json` rule files (skipping `.tmp.*` aborted
    /// writes), recompiling each expression. Rules that fail to
    /// recompile are kept with `CompiledState::Invalid` rather than
    /// dropped — a bad rule on disk does not block startup. Returns the
    /// store plus the ids of rules that failed to recompile, for the
    /// caller to log.
    pub fn load(dir: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Result<(Self, Vec<(String, DslError)>), RuleStoreError> {
        let dir = dir.into();
        fs.create_dir_all(&dir)?;

        let mut rules = Vec::new();
        let mut failures = Vec::new();

        for path in fs.list(&dir)? {
            if !is_rule_file(&path) {
                continue;
            }
            let bytes = fs.read(&path)?;
            let rule: Rule = serde_json::from_slice(&bytes)
                .map_err(|e| RuleStoreError::InvariantViolation(format!("corrupt rule file {path:?}: {e}")))?;
            let compiled = match betrace_dsl::compile(&rule.expression) {
                Ok(ast) => CompiledState::Valid(Arc::new(ast)),
                Err(e) => {
                    failures.push((rule.id.clone(), e.clone()));
                    CompiledState::Invalid(e)
                }
            };
            rules.push(StoredRule { rule, compiled });
        }

        Ok((
            Self {
                dir,
                fs,
                inner: RwLock::new(rules),
            },
            failures,
        ))
    }

    /// Pure syntax/semantics check; performs no persistence (§4.E).
    pub fn validate(expression: &str) -> Result<(), DslError> {
        betrace_dsl::compile(expression).map(|_| ())
    }

    pub fn create(&self, input: RuleInput, clock: &dyn Clock, rand: &dyn Rand) -> Result<Rule, RuleStoreError> {
        let compiled = betrace_dsl::compile(&input.expression)?;
        let mut guard = self.inner.write();

        let id = loop {
            let candidate = rand.next_uuid_v4().to_string();
            if !guard.iter().any(|r| r.rule.id == candidate) {
                break candidate;
            }
        };

        let now = nanos_to_datetime(clock.now_ns());
        let rule = Rule {
            id: id.clone(),
            name: input.name,
            description: input.description,
            severity: input.severity,
            expression: input.expression,
            enabled: input.enabled,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        };

        self.persist(&rule)?;
        guard.push(StoredRule {
            rule: rule.clone(),
            compiled: CompiledState::Valid(Arc::new(compiled)),
        });
        Ok(rule)
    }

    pub fn update(&self, id: &str, input: RuleInput, clock: &dyn Clock) -> Result<Rule, RuleStoreError> {
        let compiled = betrace_dsl::compile(&input.expression)?;
        let mut guard = self.inner.write();
        let entry = guard
            .iter_mut()
            .find(|r| r.rule.id == id)
            .ok_or_else(|| RuleStoreError::NotFound(id.to_string()))?;

        entry.rule.name = input.name;
        entry.rule.description = input.description;
        entry.rule.severity = input.severity;
        entry.rule.expression = input.expression;
        entry.rule.enabled = input.enabled;
        entry.rule.tags = input.tags;
        entry.rule.updated_at = nanos_to_datetime(clock.now_ns());
        entry.compiled = CompiledState::Valid(Arc::new(compiled));

        let updated = entry.rule.clone();
        self.persist(&updated)?;
        Ok(updated)
    }

    pub fn get(&self, id: &str) -> Result<Rule, RuleStoreError> {
        self.inner
            .read()
            .iter()
            .find(|r| r.rule.id == id)
            .map(|r| r.rule.clone())
            .ok_or_else(|| RuleStoreError::NotFound(id.to_string()))
    }

    pub fn list(&self, filter: &RuleFilter) -> Vec<Rule> {
        self.inner
            .read()
            .iter()
            .map(|r| &r.rule)
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn delete(&self, id: &str) -> Result<(), RuleStoreError> {
        let mut guard = self.inner.write();
        let index = guard
            .iter()
            .position(|r| r.rule.id == id)
            .ok_or_else(|| RuleStoreError::NotFound(id.to_string()))?;
        self.fs.remove(&self.rule_path(id))?;
        guard.remove(index);
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool, clock: &dyn Clock) -> Result<Rule, RuleStoreError> {
        let mut guard = self.inner.write();
        let entry = guard
            .iter_mut()
            .find(|r| r.rule.id == id)
            .ok_or_else(|| RuleStoreError::NotFound(id.to_string()))?;
        entry.rule.enabled = enabled;
        entry.rule.updated_at = nanos_to_datetime(clock.now_ns());
        let updated = entry.rule.clone();
        self.persist(&updated)?;
        Ok(updated)
    }

    /// Active, compiled rules, ready to hand to the evaluator as a
    /// [`betrace_engine::ActiveRule`]-shaped snapshot (the conversion
    /// happens one layer up, in the CLI/runtime wiring, to keep this
    /// crate free of a dependency on `betrace-engine`).
    pub fn enabled_compiled(&self) -> Vec<(Rule, Arc<RuleAst>)> {
        self.inner
            .read()
            .iter()
            .filter(|r| r.rule.enabled)
            .filter_map(|r| match &r.compiled {
                CompiledState::Valid(ast) => Some((r.rule.clone(), ast.clone())),
                CompiledState::Invalid(_) => None,
            })
            .collect()
    }

    fn rule_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, rule: &Rule) -> Result<(), RuleStoreError> {
        let bytes = serde_json::to_vec_pretty(rule)
            .map_err(|e| RuleStoreError::InvariantViolation(format!("rule {} failed to serialize: {e}", rule.id)))?;
        self.fs.atomic_write(&self.rule_path(&rule.id), &bytes)?;
        Ok(())
    }
}

fn is_rule_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".json") && !name.contains(".tmp.")
}

fn nanos_to_datetime(ns: u64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(
        (ns / 1_000_000_000) as i64,
        (ns % 1_000_000_000) as u32,
    )
    .unwrap_or_else(chrono::Utc::now)
}
