//! Logger construction.
//!
//! Builds a `tracing` [`Dispatch`] from [`LoggingConfig`]. The binary
//! installs it as the process default and also hands the same handle to the
//! [`Dispatcher`](crate::dispatch::Dispatcher), which runs every batch under
//! it explicitly. Library code never installs a global subscriber.

use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Builds the log dispatch: `RUST_LOG` when set, else the configured level.
pub fn build_dispatch(config: &LoggingConfig) -> Result<Dispatch> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid logging.level: '{}'", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let dispatch = match config.format {
        LogFormat::Json => Dispatch::new(
            builder
                .json()
                .with_file(true)
                .with_line_number(true)
                .finish(),
        ),
        LogFormat::Pretty => Dispatch::new(builder.finish()),
    };
    Ok(dispatch)
}

/// Installs `dispatch` as the process-wide default.
pub fn install(dispatch: &Dispatch) -> Result<()> {
    tracing::dispatcher::set_global_default(dispatch.clone())
        .context("a global log subscriber is already installed")
}
