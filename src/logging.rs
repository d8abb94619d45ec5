//! Logging setup.
//!
//! Human-readable output goes to stderr. With a log directory, a daily rolling
//! file gets a copy without ANSI colors.
//!
//! The level comes from the `INAT_PUSHER_LOG` environment variable when set
//! (`INAT_PUSHER_LOG=debug`, `INAT_PUSHER_LOG=inat_pusher::upload=trace`),
//! otherwise `info`, or `debug` with `--verbose`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "INAT_PUSHER_LOG";

const LOG_FILE: &str = "inat-pusher.log";

// Dropping the guard stops the background writer.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    })
}

pub fn init(verbose: bool, log_dir: Option<PathBuf>) -> Result<()> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter(verbose))
            .with(stderr_layer)
            .try_init()?;
        return Ok(());
    };

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(stderr_layer)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::debug!("Logging to {:?}", log_dir);
    Ok(())
}
