//! Tracing setup
//!
//! The terminal belongs to the UI, so log output goes to a daily rolling file
//! in the config directory. The filter comes from `GRIDSTATE_LOG` and
//! defaults to `info` for this crate.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "GRIDSTATE_LOG";

const DEFAULT_DIRECTIVES: &str = "gridstate=info";

/// Install the global subscriber; keep the guard alive until exit
pub fn init(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, "gridstate.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .try_init()?;

    tracing::info!(dir = %log_dir.display(), "logging initialised");
    Ok(guard)
}
