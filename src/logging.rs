//! Tracing subscriber setup shared by the binaries.
//!
//! Logs go to stdout unless `RECOVERY_LOG_FILE` names a file, which is
//! created with its parent directories and appended to. `RUST_LOG` filters
//! as usual and defaults to `info`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_ENV: &str = "RECOVERY_LOG_FILE";

/// Non-blocking writer appending to `log_file`, or stdout when `None`.
///
/// # Errors
/// Returns the I/O error if the log file cannot be opened.
pub fn log_writer(log_file: Option<&Path>) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(tracing_appender::non_blocking(file))
        }
        None => Ok(tracing_appender::non_blocking(std::io::stdout())),
    }
}

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
///
/// # Errors
/// Returns the I/O error if `RECOVERY_LOG_FILE` cannot be opened.
pub fn init_tracing() -> std::io::Result<WorkerGuard> {
    let log_file = std::env::var_os(LOG_FILE_ENV).map(PathBuf::from);
    let (writer, guard) = log_writer(log_file.as_deref())?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();
    Ok(guard)
}
