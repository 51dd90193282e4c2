//! Logging bootstrap.
//!
//! Structured logs go to both a per-process file under `logs/` and stdout.
//! The file is truncated on start so each session reads from the top.
//! Verbosity comes from `RUST_LOG` and defaults to `info`.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default directory for log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Keep this guard alive for as long as the process logs; dropping it
/// flushes and closes the file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialises the global subscriber with file and stdout output.
///
/// `log_file` should name the component, e.g. `broker.log` or
/// `worker-8081.log`, so a machine running several processes keeps their
/// logs apart.
pub fn init(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(Path::new(log_dir).join(log_file), "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("haloring_logs_{nanos}"))
    }

    // The global subscriber can only be installed once per process, so the
    // file plumbing is tested directly; init() itself is exercised by
    // running the binaries.

    #[test]
    fn test_log_file_is_truncated() {
        let dir = unique_dir();
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("broker.log");
        fs::write(&file, "stale session output").unwrap();

        fs::write(&file, "").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_nested_log_dir_is_created() {
        let dir = unique_dir().join("nested/deeper");
        fs::create_dir_all(&dir).unwrap();
        assert!(dir.exists());
        fs::remove_dir_all(dir.parent().unwrap().parent().unwrap()).unwrap();
    }
}
