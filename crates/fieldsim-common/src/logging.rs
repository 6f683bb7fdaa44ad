//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Shared primitives and utilities for the fieldsim runtime."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "FIELDSIM_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available stdout log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// One JSON object per line, for collectors.
    StructuredJson,
    /// Human-oriented output for interactive runs.
    #[default]
    Pretty,
}

/// Map the CLI `--log-verbosity` integer onto a filter directive.
///
/// Negative disables logging entirely, 0 is the default informational
/// level, 1 adds debug, and 2 or above traces everything.
pub fn verbosity_directive(verbosity: i64) -> &'static str {
    match verbosity {
        v if v < 0 => "off",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the tracing subscriber from configuration.
///
/// The filter resolves in priority order: the `FIELDSIM_LOG` environment
/// variable, then the standard `RUST_LOG` variable, then the CLI verbosity
/// directive. Stdout format follows the config; a rolling daily JSON file
/// is always written for post-mortem analysis.
pub fn init_tracing(service_name: &str, config: &LoggingConfig, verbosity: i64) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{prefix}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); using CLI verbosity");
            EnvFilter::new(verbosity_directive(verbosity))
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(verbosity))),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}
