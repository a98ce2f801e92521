//! Single-binary BeTrace runtime (§6 CLI surface). Wires the capability
//! seams to their production implementations and runs the engine until
//! a shutdown is requested.

mod engine;

use std::sync::Arc;

use betrace_core::{Clock, EngineConfig, OsFilesystem, Rand, SystemClock, SystemRand};
use clap::Parser;
use engine::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// BeTrace trace-behavior rule engine.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP port for the transport adapter (out of scope for this crate;
    /// recorded for operators wiring one up).
    #[arg(long)]
    http_port: Option<u16>,

    /// Root directory for `rules/` and `violations/`.
    #[arg(long)]
    data_dir: Option<String>,

    /// Path to the HMAC signing key file for the Violation Store.
    #[arg(long)]
    signing_key_file: Option<String>,

    /// Trace Buffer completion timeout, in milliseconds.
    #[arg(long)]
    completion_timeout: Option<u64>,

    /// Trace Buffer per-trace span cap.
    #[arg(long)]
    max_spans_per_trace: Option<u64>,
}

impl Cli {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            http_port: self.http_port,
            data_dir: self.data_dir,
            signing_key_file: self.signing_key_file,
            completion_timeout_ms: self.completion_timeout,
            max_spans_per_trace: self.max_spans_per_trace,
            ..Default::default()
        }
        .merge_env()
    }
}

fn main() {
    init_tracing();

    let config = Cli::parse().into_config();

    if config.effective_completion_timeout_ms() == 0 || config.effective_max_spans_per_trace() == 0 {
        tracing::error!("invalid configuration: completion-timeout and max-spans-per-trace must be nonzero");
        std::process::exit(2);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rand: Arc<dyn Rand> = Arc::new(SystemRand);
    let fs = Arc::new(OsFilesystem);

    let engine = match Engine::new(config, clock, rand, fs) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize engine");
            std::process::exit(1);
        }
    };

    tracing::info!(
        started_at = %chrono::Utc::now().to_rfc3339(),
        health = ?engine.health_report(),
        "betrace engine started; send a blank line on stdin to shut down gracefully"
    );

    wait_for_shutdown_signal(&engine);

    engine.shutdown();
    tracing::info!("betrace engine shut down gracefully");
    std::process::exit(0);
}

/// Blocks until an operator requests shutdown. There is no OS
/// signal-handling crate in this workspace's dependency stack, so the
/// trigger here is a blank line (or EOF) on stdin, watched from a
/// background thread; a real deployment wires `Engine::request_shutdown`
/// to SIGTERM/SIGINT through whatever supervisor (systemd, Kubernetes)
/// manages the process instead.
fn wait_for_shutdown_signal(engine: &Engine) {
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut line = String::new();
            loop {
                line.clear();
                match std::io::stdin().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) if line.trim().is_empty() => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
            engine.request_shutdown();
        });
        engine.run_until_shutdown();
    });
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
