//! Mirroring daemon entry point.
//!
//! ```text
//! mirroring-kafka run --src=<source> --dest=<destination> [--verbose]
//! ```
//!
//! `<source>`/`<destination>` are logical labels; each side's connection
//! settings come from `<NAME>_KAFKA_*` environment variables (see
//! [`mirroring_kafka::config`]). Logs are JSON lines; `SENTRY_DSN` enables
//! error reporting. SIGINT/SIGTERM finish the cycle in flight and exit.

use clap::{Parser, Subcommand};
use mirroring_kafka::{EngineConfig, KafkaSettings, MirrorEngine};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mirroring-kafka")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Daemon mirroring a Kafka topic with lookback deduplication")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mirroring loop until SIGINT/SIGTERM.
    Run {
        /// Logical label of the source side (namespaces its env variables).
        #[arg(long)]
        src: String,

        /// Logical label of the destination side.
        #[arg(long)]
        dest: String,

        /// Debug log
        #[arg(long)]
        verbose: bool,
    },
}

fn init_logs(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirroring_kafka={default_level},warn")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(sentry_tracing::layer())
        .init();
}

/// Initialize Sentry when `SENTRY_DSN` is set. The returned guard must stay
/// alive for the process lifetime so buffered events are flushed on exit.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;
    let environment = std::env::var("SENTRY_ENVIRONMENT").unwrap_or_else(|_| "local".to_string());
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            environment: Some(environment.into()),
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

/// Translate SIGINT/SIGTERM into the engine's stop signal. The engine
/// observes it between cycles only, so the cycle in flight completes.
fn spawn_signal_listener(stop_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, falling back to SIGINT only");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Stop signal received, finishing current cycle");
        let _ = stop_tx.send(true);
    });
}

async fn run(src: String, dest: String) -> ExitCode {
    let src_settings = match KafkaSettings::from_env(&src) {
        Ok(s) => s,
        Err(e) => {
            error!(side = %src, error = %e, "Invalid source settings");
            return ExitCode::FAILURE;
        }
    };
    let dest_settings = match KafkaSettings::from_env(&dest) {
        Ok(s) => s,
        Err(e) => {
            error!(side = %dest, error = %e, "Invalid destination settings");
            return ExitCode::FAILURE;
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_signal_listener(stop_tx);

    let engine = MirrorEngine::new(src_settings, dest_settings, EngineConfig::default());
    match engine.run(stop_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Mirroring failed");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { src, dest, verbose } => {
            init_logs(verbose);
            let _sentry = init_sentry();
            run(src, dest).await
        }
    }
}
