//! Tracing configuration and log routing.
//!
//! Stdout carries MCP frames, so the console layer writes to stderr. When
//! `OPENMEMORY_BRIDGE_LOG_FILE` is set, logs are also appended to that path through a
//! non‑blocking writer.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Environment variable naming an optional log file.
pub const LOG_FILE_ENV: &str = "OPENMEMORY_BRIDGE_LOG_FILE";

/// Configure tracing subscribers for stderr and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stderr layer and, when configured, a file layer.
/// - Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    let result = if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).try_init()
    } else {
        registry.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when no file is configured or the target file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let path = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())?;

    if let Some(parent) = std::path::Path::new(&path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {path}: {err}");
            None
        }
    }
}
