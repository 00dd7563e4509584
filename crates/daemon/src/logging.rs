//! Tracing setup for the daemon.
//!
//! Logs always go to stderr. When a log directory is configured they are
//! also written to a daily rolling file there.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "hybridstore.log";

/// Builds the filter: `RUST_LOG` wins, otherwise `level` for our crates and
/// `warn` for everything else.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,daemon={level},hybridstore_daemon={level},protocol={level},tower_http={level}"
        ))
    })
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(level);
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_filter_uses_level() {
        std::env::remove_var("RUST_LOG");
        let filter = build_filter("debug").to_string();
        assert!(filter.contains("daemon=debug"));
        assert!(filter.contains("protocol=debug"));
    }

    #[test]
    #[serial]
    fn test_build_filter_prefers_rust_log() {
        std::env::set_var("RUST_LOG", "trace");
        let filter = build_filter("info").to_string();
        assert_eq!(filter, "trace");
        std::env::remove_var("RUST_LOG");
    }
}
