//! Structured logging for debugging delve.
//!
//! Log levels:
//! - ERROR: Sessions that hard-fail
//! - WARN: Recoverable surprises (budgets exhausted, rejected plans, dropped results)
//! - INFO: Session milestones (plan adopted, phase summaries, convergence)
//! - DEBUG: Per-operation and per-task traces
//!
//! Logs go to `~/.delve/delve.log`, truncated on init. Debug mode can be
//! enabled by the embedding application or with `DELVE_DEBUG=1`. `RUST_LOG`
//! directives are applied on top.

use std::fs;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::Result;

/// Initialize logging to ~/.delve/delve.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Only the first call installs a subscriber; later calls keep it.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug(std::env::var("DELVE_DEBUG").ok().as_deref());

    let Ok(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    // Truncate file on startup
    let Ok(file) = fs::File::create(&path) else {
        return;
    };

    let installed = tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(filter(debug_enabled))
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(debug = debug_enabled, path = %path.display(), "Logging initialized");
    }
}

/// Path of the log file.
pub fn log_path() -> Result<PathBuf> {
    Ok(Config::delve_dir()?.join("delve.log"))
}

fn level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

fn filter(debug: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level(debug).into())
        .from_env_lossy()
}

fn env_debug(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
