//! Tracing setup for the gateway.
//!
//! Events go to stdout in compact form and to a log file. The file is `DB_SERVICE_LOG_FILE`
//! when set and `logs/db-service.log` otherwise.
//!
//! At `info` the log shows every provisioning step with its `model_group_id`, `model_id`,
//! `task_id` or `pipeline_id`. It also shows each OpenSearch call as `method` plus `endpoint`,
//! and each gateway request with its `index`. At `debug` (for example
//! `RUST_LOG=dbservice=debug`) it adds OpenSearch request and response bodies and the
//! resolved configuration.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_VAR: &str = "DB_SERVICE_LOG_FILE";
const DEFAULT_LOG_PATH: &str = "logs/db-service.log";

/// Install the stdout and file subscribers.
///
/// `RUST_LOG` selects the filter (`info` when unset). If the log file cannot be opened the
/// gateway keeps logging to stdout only. Later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = open_log_writer(&log_file_path(std::env::var(LOG_FILE_VAR).ok())).map(
        |writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        },
    );

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn log_file_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_PATH), PathBuf::from)
}

/// Open `path` for appending behind a non-blocking writer whose guard lives for the process.
fn open_log_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(dir)
    {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
