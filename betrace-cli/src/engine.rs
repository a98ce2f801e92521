//! Composition root (§9: "All state is owned by a component whose
//! lifecycle is controlled by `Engine::new(config, clock, rand,
//! fs)`/`shutdown`"). Wires the Rule Store, Violation Store, Trace
//! Buffer, and Ingestion Orchestrator together and drives the
//! completion-worker loop described in §5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use betrace_core::model::Value;
use betrace_core::{
    BeTraceErrorCode, Clock, EngineConfig, EngineLock, EventDispatcher, Filesystem, HealthReport, Rand,
};
use betrace_engine::{ActiveRule, IngestionOrchestrator, TraceBuffer};
use betrace_store::{RuleStore, ViolationStore};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("rule store: {0}")]
    RuleStore(#[from] betrace_core::errors::RuleStoreError),

    #[error("violation store: {0}")]
    ViolationStore(#[from] betrace_core::errors::ViolationStoreError),

    #[error("engine lock: {0}")]
    Lock(#[from] betrace_core::lock::LockError),

    #[error("signing key file {path}: {source}")]
    SigningKey { path: String, source: std::io::Error },
}

struct ViolationSinkBridge {
    store: Arc<ViolationStore>,
    clock: Arc<dyn Clock>,
    rand: Arc<dyn Rand>,
}

impl betrace_engine::ingestion::ViolationSink for ViolationSinkBridge {
    fn record(
        &self,
        rule: &ActiveRule,
        trace_id: &str,
        first_span_id: &str,
        message: String,
        context: BTreeMap<String, Value>,
    ) {
        if let Err(e) = self.store.record(
            &rule.id,
            &rule.name,
            rule.severity,
            trace_id,
            first_span_id,
            message,
            context,
            self.clock.as_ref(),
            self.rand.as_ref(),
        ) {
            tracing::error!(error = %e, code = e.error_code(), rule_id = %rule.id, "failed to persist violation");
        }
    }
}

/// The running engine: every long-lived resource named in §5 except the
/// out-of-scope transport layer. Owns the background completion-worker
/// thread for its lifetime.
pub struct Engine {
    pub rule_store: Arc<RuleStore>,
    pub violation_store: Arc<ViolationStore>,
    pub health: Arc<betrace_core::health::HealthScoreboard>,
    orchestrator: Arc<IngestionOrchestrator>,
    shutdown: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        rand: Arc<dyn Rand>,
        fs: Arc<dyn Filesystem>,
    ) -> Result<Self, InitError> {
        let data_dir = Path::new(&config.effective_data_dir()).to_path_buf();
        let rules_dir = data_dir.join("rules");
        let violations_dir = data_dir.join("violations");

        fs.create_dir_all(&data_dir).map_err(betrace_core::errors::RuleStoreError::from)?;

        // Fails fast if another BeTrace process already holds the lock on
        // this data_dir. The guard is intentionally not held past this
        // check: `EngineLock::write` borrows `&mut self`, and keeping a
        // guard alive for the process lifetime would make this struct
        // self-referential. In-process structural mutations are already
        // serialized by each store's own `RwLock` (§5); this check only
        // guards against a second *process* pointed at the same directory.
        let mut startup_lock = EngineLock::new(&data_dir)?;
        drop(startup_lock.write()?);

        let signing_key = load_signing_key(&config)?;

        let (rule_store, compile_failures) = RuleStore::load(rules_dir, fs.clone())?;
        for (id, err) in &compile_failures {
            tracing::warn!(rule_id = %id, error = %err, "rule failed to recompile on load");
        }

        let (violation_store, tampered) = ViolationStore::load(violations_dir, fs, signing_key)?;
        for id in &tampered {
            tracing::error!(violation_id = %id, "signature verification failed on load: possible tampering");
        }

        let rule_store = Arc::new(rule_store);
        let violation_store = Arc::new(violation_store);

        let health = Arc::new(betrace_core::health::HealthScoreboard::new());
        health.mark_rule_store_ready();

        let orchestrator = Arc::new(IngestionOrchestrator::new(config.effective_ingest_queue_capacity()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = spawn_completion_worker(
            orchestrator.clone(),
            rule_store.clone(),
            violation_store.clone(),
            clock,
            rand,
            config.clone(),
            shutdown.clone(),
        );

        Ok(Self {
            rule_store,
            violation_store,
            health,
            orchestrator,
            shutdown,
            worker: Some(worker),
            config,
        })
    }

    pub fn orchestrator(&self) -> &IngestionOrchestrator {
        &self.orchestrator
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.report()
    }

    /// Blocks until `request_shutdown` is called from another thread,
    /// ticking the completion worker in the background the whole time.
    pub fn run_until_shutdown(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(self.config.effective_tick_interval_ms()));
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Joins the completion-worker thread, which performs the §5 drain
    /// sequence (drain queue, flush buffer, evaluate, fsync) before
    /// returning.
    pub fn shutdown(mut self) {
        self.request_shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn load_signing_key(config: &EngineConfig) -> Result<Vec<u8>, InitError> {
    let path = config
        .effective_signing_key_file()
        .ok_or_else(|| InitError::SigningKey {
            path: "<none>".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "--signing-key-file was not provided"),
        })?;
    std::fs::read(&path).map_err(|source| InitError::SigningKey { path, source })
}

fn spawn_completion_worker(
    orchestrator: Arc<IngestionOrchestrator>,
    rule_store: Arc<RuleStore>,
    violation_store: Arc<ViolationStore>,
    clock: Arc<dyn Clock>,
    rand: Arc<dyn Rand>,
    config: EngineConfig,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buffer = TraceBuffer::new(
            config.effective_completion_timeout_ms() * 1_000_000,
            config.effective_max_spans_per_trace() as usize,
            config.effective_max_buffered_spans() as usize,
            EventDispatcher::default(),
        );
        let sink = ViolationSinkBridge {
            store: violation_store,
            clock: clock.clone(),
            rand,
        };
        let events = EventDispatcher::default();
        let tick_interval = Duration::from_millis(config.effective_tick_interval_ms());

        while !shutdown.load(Ordering::Acquire) {
            let rules = active_rules(&rule_store);
            orchestrator.pump(
                &mut buffer,
                clock.now_ns(),
                &rules,
                config.effective_eval_timeout_ms(),
                &events,
                &sink,
            );
            std::thread::sleep(tick_interval);
        }

        let rules = active_rules(&rule_store);
        orchestrator.drain_and_flush(
            &mut buffer,
            clock.now_ns(),
            &rules,
            config.effective_eval_timeout_ms(),
            &events,
            &sink,
        );
    })
}

fn active_rules(rule_store: &RuleStore) -> Vec<ActiveRule> {
    rule_store
        .enabled_compiled()
        .into_iter()
        .map(|(rule, ast)| ActiveRule {
            id: rule.id,
            name: rule.name,
            severity: rule.severity,
            ast,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use betrace_core::clock::FixedClock;
    use betrace_core::model::{Severity, SpanStatus};
    use betrace_core::rand::SeededRand;
    use betrace_core::OsFilesystem;

    fn config(data_dir: &Path, key_file: &Path) -> EngineConfig {
        EngineConfig {
            data_dir: Some(data_dir.to_string_lossy().to_string()),
            signing_key_file: Some(key_file.to_string_lossy().to_string()),
            tick_interval_ms: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn init_fails_without_signing_key() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            data_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        let err = Engine::new(
            cfg,
            Arc::new(FixedClock::new(0)),
            Arc::new(SeededRand::new(1)),
            Arc::new(OsFilesystem),
        )
        .unwrap_err();
        assert!(matches!(err, InitError::SigningKey { .. }));
    }

    #[test]
    fn ingest_and_shutdown_drains_and_evaluates() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("key");
        std::fs::write(&key_file, b"test-signing-key").unwrap();

        let clock = Arc::new(FixedClock::new(0));
        let engine = Engine::new(
            config(dir.path(), &key_file),
            clock.clone() as Arc<dyn Clock>,
            Arc::new(SeededRand::new(3)),
            Arc::new(OsFilesystem),
        )
        .unwrap();

        engine
            .rule_store
            .create(
                betrace_core::model::RuleInput {
                    name: "fraud check".to_string(),
                    description: String::new(),
                    severity: Severity::High,
                    expression: "when { payment.charge_card } always { payment.fraud_check }".to_string(),
                    enabled: true,
                    tags: vec![],
                },
                &FixedClock::new(0),
                &SeededRand::new(9),
            )
            .unwrap();

        let mut attrs = BTreeMap::new();
        attrs.insert("trace.terminator".to_string(), Value::Bool(true));
        let span = betrace_core::model::Span {
            trace_id: "trace-1".to_string(),
            span_id: "span-1".to_string(),
            parent_id: None,
            name: "payment.charge_card".to_string(),
            start_ns: 0,
            end_ns: 1,
            attrs,
            status: SpanStatus::Unset,
        };
        let report = engine.orchestrator().ingest_batch(vec![span]);
        assert_eq!(report.accepted, 1);

        std::thread::sleep(Duration::from_millis(50));
        engine.shutdown();
    }
}
