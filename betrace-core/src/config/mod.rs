//! Engine configuration, following `ScanConfig`'s all-`Option<T>` +
//! `#[serde(default)]` shape: a config file or CLI-parsed struct provides
//! overrides, and `effective_*()` accessors apply the documented defaults
//! (§6 CLI flags, §4.F tuning parameters, §5 soft timeout). `BETRACE_`
//! environment variables are merged over the file via `merge_env`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP port for the (out-of-scope-but-named) transport adapter.
    pub http_port: Option<u16>,
    /// Root directory for `rules/` and `violations/` (§6 on-disk layout).
    pub data_dir: Option<String>,
    /// Path to the HMAC signing key file (§4.G, §6).
    pub signing_key_file: Option<String>,
    /// Trace Buffer completion timeout, in milliseconds (§4.F).
    pub completion_timeout_ms: Option<u64>,
    /// Trace Buffer per-trace span cap (§4.F).
    pub max_spans_per_trace: Option<u64>,
    /// Trace Buffer total buffered-span cap across all traces (§4.F).
    pub max_buffered_spans: Option<u64>,
    /// Completion worker tick interval, in milliseconds (§4.H).
    pub tick_interval_ms: Option<u64>,
    /// Per-(trace, rule) evaluation soft wall-clock budget, in
    /// milliseconds (§5).
    pub eval_timeout_ms: Option<u64>,
    /// Bounded ingest queue capacity (§4.H backpressure).
    pub ingest_queue_capacity: Option<usize>,
    /// Consecutive disk-error threshold before health flips to DEGRADED
    /// (§7).
    pub disk_error_threshold: Option<u32>,
}

impl EngineConfig {
    pub fn effective_http_port(&self) -> u16 {
        self.http_port.unwrap_or(4317)
    }

    pub fn effective_data_dir(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./betrace-data".to_string())
    }

    pub fn effective_signing_key_file(&self) -> Option<String> {
        self.signing_key_file.clone()
    }

    pub fn effective_completion_timeout_ms(&self) -> u64 {
        self.completion_timeout_ms.unwrap_or(5_000)
    }

    pub fn effective_max_spans_per_trace(&self) -> u64 {
        self.max_spans_per_trace.unwrap_or(10_000)
    }

    pub fn effective_max_buffered_spans(&self) -> u64 {
        self.max_buffered_spans.unwrap_or(1_000_000)
    }

    pub fn effective_tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.unwrap_or(100)
    }

    pub fn effective_eval_timeout_ms(&self) -> u64 {
        self.eval_timeout_ms.unwrap_or(50)
    }

    pub fn effective_ingest_queue_capacity(&self) -> usize {
        self.ingest_queue_capacity.unwrap_or(10_000)
    }

    pub fn effective_disk_error_threshold(&self) -> u32 {
        self.disk_error_threshold.unwrap_or(5)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Overlays `BETRACE_*` environment variables on top of `self`,
    /// mirroring the §6 CLI flags one-for-one.
    pub fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("BETRACE_HTTP_PORT") {
            if let Ok(p) = v.parse() {
                self.http_port = Some(p);
            }
        }
        if let Ok(v) = std::env::var("BETRACE_DATA_DIR") {
            self.data_dir = Some(v);
        }
        if let Ok(v) = std::env::var("BETRACE_SIGNING_KEY_FILE") {
            self.signing_key_file = Some(v);
        }
        if let Ok(v) = std::env::var("BETRACE_COMPLETION_TIMEOUT") {
            if let Ok(ms) = v.parse() {
                self.completion_timeout_ms = Some(ms);
            }
        }
        if let Ok(v) = std::env::var("BETRACE_MAX_SPANS_PER_TRACE") {
            if let Ok(n) = v.parse() {
                self.max_spans_per_trace = Some(n);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.effective_completion_timeout_ms(), 5_000);
        assert_eq!(cfg.effective_max_spans_per_trace(), 10_000);
        assert_eq!(cfg.effective_tick_interval_ms(), 100);
        assert_eq!(cfg.effective_eval_timeout_ms(), 50);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = EngineConfig::from_toml_str(r#"data_dir = "/var/lib/betrace""#).unwrap();
        assert_eq!(cfg.effective_data_dir(), "/var/lib/betrace");
        assert_eq!(cfg.effective_http_port(), 4317);
    }
}
