use std::env;
use tracing::info;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logger() -> impl Drop {
    // `TRACING_LEVEL` takes EnvFilter directives, e.g. "info,preprint_sync=debug".
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());

    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| "./logs/preprint-sync.log".to_string());

    let file_appender = tracing_appender::rolling::never("./", log_file_path);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    subscriber(&filter, non_blocking).init();

    info!("Tracing is configured for stdout and file logging.");

    guard
}

/// Pretty stdout layer plus a plain layer for the log file.
fn subscriber(filter: &str, file_writer: NonBlocking) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(EnvFilter::new(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_subscriber_writes_events_to_file_layer() {
        let dir = env::temp_dir().join(format!("preprint-sync-log-{}", std::process::id()));
        let appender = tracing_appender::rolling::never(&dir, "test.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing::subscriber::with_default(subscriber("info", writer), || {
            info!(files = 3, "Registered discovered files");
            tracing::debug!("filtered out");
        });
        drop(guard);

        let written = fs::read_to_string(dir.join("test.log")).unwrap();
        assert!(written.contains("Registered discovered files"));
        assert!(written.contains("files=3"));
        assert!(!written.contains("filtered out"));
        let _ = fs::remove_dir_all(&dir);
    }
}
