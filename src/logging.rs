// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `REDO_LOG` environment variable (e.g. "info", "debug")
//! 2. the `--silent` / `--verbose` / `--debug` flags
//! 3. default to `info`
//!
//! Logs go to STDERR so that stdout stays free for `redo-hash` output.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::BuildOptions;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(opts: &BuildOptions) {
    let filter = EnvFilter::try_from_env("REDO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level_from_flags(opts).to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn level_from_flags(opts: &BuildOptions) -> tracing::Level {
    if opts.debug {
        tracing::Level::TRACE
    } else if opts.verbose {
        tracing::Level::DEBUG
    } else if opts.silent {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    }
}
