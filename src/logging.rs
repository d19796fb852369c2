//! Tracing subscriber setup for the CLI and server.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber: stderr always, plus a daily rolling
/// `groundwork.log` when `logging.dir` is set. `RUST_LOG` overrides
/// `logging.level`. Later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let file_layer = config.dir.as_ref().and_then(|dir| {
        if !prepare_log_dir(dir) {
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, "groundwork.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
    });

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    // stdout carries command output; logs go to stderr.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

/// Create the log directory, warning on stderr when it cannot be used.
/// The subscriber is not installed yet, so the warning bypasses tracing.
fn prepare_log_dir(dir: &Path) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "Warning: cannot create log directory {}: {}; logging to stderr only",
                dir.display(),
                e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_log_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs").join("gw");
        assert!(prepare_log_dir(&dir));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_prepare_log_dir_under_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        assert!(!prepare_log_dir(&file.join("logs")));
    }
}
