//! Component G: append-only, signed violation persistence (§4.G, §6).
//!
//! Violations are laid out one JSON file per record under
//! `violations/<yyyy-mm>/<id>.json`, segmented by month so that no
//! single directory accumulates an unbounded number of entries over a
//! long-running deployment. The on-disk layout below this module's
//! boundary is an implementation choice, not a wire contract — nothing
//! outside `betrace-store` reads these paths directly.

use std::path::PathBuf;
use std::sync::Arc;

use betrace_core::errors::ViolationStoreError;
use betrace_core::model::{Severity, Violation, ViolationFilter};
use betrace_core::{Clock, Filesystem, Rand};
use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;

pub struct ViolationStore {
    dir: PathBuf,
    fs: Arc<dyn Filesystem>,
    signing_key: Vec<u8>,
    inner: RwLock<Vec<Violation>>,
}

impl ViolationStore {
    /// Loads every violation under `dir`'s month segments into memory.
    /// Records whose signature fails to verify against `signing_key` are
    /// kept (query/get must still surface them so an operator can see
    /// tampering) but reported back to the caller to log.
    pub fn load(
        dir: impl Into<PathBuf>,
        fs: Arc<dyn Filesystem>,
        signing_key: Vec<u8>,
    ) -> Result<(Self, Vec<String>), ViolationStoreError> {
        let dir = dir.into();
        fs.create_dir_all(&dir)?;

        let mut violations = Vec::new();
        let mut tampered = Vec::new();

        for month_dir in fs.list(&dir)? {
            if !fs.is_dir(&month_dir) {
                continue;
            }
            for path in fs.list(&month_dir)? {
                if !is_violation_file(&path) {
                    continue;
                }
                let bytes = fs.read(&path)?;
                let violation: Violation = serde_json::from_slice(&bytes).map_err(|e| {
                    ViolationStoreError::InvariantViolation(format!("corrupt violation file {path:?}: {e}"))
                })?;
                if !violation.verify(&signing_key) {
                    tampered.push(violation.id.clone());
                }
                violations.push(violation);
            }
        }

        Ok((
            Self {
                dir,
                fs,
                signing_key,
                inner: RwLock::new(violations),
            },
            tampered,
        ))
    }

    /// Records a new violation. Idempotent on `id`: a record already
    /// present with the same id is left untouched rather than duplicated
    /// or overwritten, so a retried delivery from the ingestion pipeline
    /// is harmless.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        rule_id: &str,
        rule_name: &str,
        severity: Severity,
        trace_id: &str,
        first_span_id: &str,
        message: String,
        context: std::collections::BTreeMap<String, betrace_core::model::Value>,
        clock: &dyn Clock,
        rand: &dyn Rand,
    ) -> Result<Violation, ViolationStoreError> {
        let mut guard = self.inner.write();

        let id = loop {
            let candidate = rand.next_uuid_v4().to_string();
            if !guard.iter().any(|v| v.id == candidate) {
                break candidate;
            }
        };

        let detected_at = nanos_to_datetime(clock.now_ns());
        let signature = Violation::compute_signature(
            &self.signing_key,
            &id,
            rule_id,
            trace_id,
            detected_at,
            &message,
            &context,
        );

        let violation = Violation {
            id,
            rule_id: rule_id.to_string(),
            rule_name: rule_name.to_string(),
            trace_id: trace_id.to_string(),
            first_span_id: first_span_id.to_string(),
            detected_at,
            severity,
            message,
            context,
            signature,
        };

        self.persist(&violation)?;
        guard.push(violation.clone());
        Ok(violation)
    }

    pub fn get(&self, id: &str) -> Result<Violation, ViolationStoreError> {
        self.inner
            .read()
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| ViolationStoreError::NotFound(id.to_string()))
    }

    /// Conjunctive filter query (§4.G), most recent first. `filter.limit`
    /// caps the number of records returned, not the number scanned.
    pub fn query(&self, filter: &ViolationFilter) -> Vec<Violation> {
        let mut matched: Vec<Violation> = self
            .inner
            .read()
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    pub fn verify(&self, id: &str) -> Result<bool, ViolationStoreError> {
        self.get(id).map(|v| v.verify(&self.signing_key))
    }

    fn persist(&self, violation: &Violation) -> Result<(), ViolationStoreError> {
        let bytes = serde_json::to_vec_pretty(violation).map_err(|e| {
            ViolationStoreError::InvariantViolation(format!("violation {} failed to serialize: {e}", violation.id))
        })?;
        let month_dir = self.dir.join(month_segment(violation.detected_at));
        self.fs.create_dir_all(&month_dir)?;
        self.fs
            .atomic_write(&month_dir.join(format!("{}.json", violation.id)), &bytes)?;
        Ok(())
    }
}

fn month_segment(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

fn is_violation_file(path: &PathBuf) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".json") && !name.contains(".tmp.")
}

fn nanos_to_datetime(ns: u64) -> DateTime<Utc> {
    DateTime::from_timestamp((ns / 1_000_000_000) as i64, (ns % 1_000_000_000) as u32)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use betrace_core::clock::FixedClock;
    use betrace_core::rand::SeededRand;
    use betrace_core::OsFilesystem;
    use std::collections::BTreeMap;

    fn fresh_store(key: &[u8]) -> (ViolationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (store, tampered) =
            ViolationStore::load(dir.path().to_path_buf(), Arc::new(OsFilesystem), key.to_vec()).unwrap();
        assert!(tampered.is_empty());
        (store, dir)
    }

    #[test]
    fn record_then_get_verifies() {
        let (store, _dir) = fresh_store(b"test-key");
        let clock = FixedClock::new(1_700_000_000_000_000_000);
        let rand = SeededRand::new(11);
        let violation = store
            .record(
                "rule-1",
                "payment fraud check",
                Severity::Critical,
                "trace-1",
                "span-1",
                "always clause failed".to_string(),
                BTreeMap::new(),
                &clock,
                &rand,
            )
            .unwrap();

        let fetched = store.get(&violation.id).unwrap();
        assert_eq!(fetched.id, violation.id);
        assert!(store.verify(&violation.id).unwrap());
    }

    #[test]
    fn query_filters_by_rule_id() {
        let (store, _dir) = fresh_store(b"test-key");
        let clock = FixedClock::new(0);
        let rand = SeededRand::new(5);
        store
            .record(
                "rule-a",
                "a",
                Severity::Low,
                "t1",
                "s1",
                "m".to_string(),
                BTreeMap::new(),
                &clock,
                &rand,
            )
            .unwrap();
        store
            .record(
                "rule-b",
                "b",
                Severity::Low,
                "t2",
                "s1",
                "m".to_string(),
                BTreeMap::new(),
                &clock,
                &rand,
            )
            .unwrap();

        let filter = ViolationFilter {
            rule_id: Some("rule-a".to_string()),
            ..Default::default()
        };
        let results = store.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_id, "rule-a");
    }

    #[test]
    fn reload_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let fs: Arc<dyn Filesystem> = Arc::new(OsFilesystem);
        let clock = FixedClock::new(0);
        let rand = SeededRand::new(2);

        let id = {
            let (store, _) = ViolationStore::load(dir.path().to_path_buf(), fs.clone(), b"key-a".to_vec()).unwrap();
            store
                .record(
                    "rule-1",
                    "name",
                    Severity::High,
                    "t1",
                    "s1",
                    "m".to_string(),
                    BTreeMap::new(),
                    &clock,
                    &rand,
                )
                .unwrap()
                .id
        };

        let (reloaded, tampered) =
            ViolationStore::load(dir.path().to_path_buf(), fs, b"wrong-key".to_vec()).unwrap();
        assert_eq!(tampered, vec![id.clone()]);
        assert!(!reloaded.verify(&id).unwrap());
    }
}
