//! Tracing subscriber setup for the command-line binary

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive
pub const LOG_ENV: &str = "CHART_UPDATES_LOG";

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to stderr, filtered by [`LOG_ENV`]
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Log as JSON lines to `path`, filtered by [`LOG_ENV`]
///
/// The returned guard flushes buffered records when dropped; keep it alive
/// for the lifetime of the program.
pub fn init_file(path: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("log path {path:?} has no parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log path {path:?} has no file name"))?;
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .init();

    Ok(guard)
}
