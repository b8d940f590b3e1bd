use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";

/// Keeps the non-blocking file writer alive for the process lifetime.
pub struct LoggingHandle {
    pub guard: Option<WorkerGuard>,
}

/// Initialize tracing. Filter comes from `DRAGONROCK_LOG` (falling back to
/// `RUST_LOG`, then a sane default). When `DRAGONROCK_LOG_DIR` is set, logs
/// go to `server.log` in that directory as JSON lines; otherwise they go to
/// stderr in the human-readable format.
pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("DRAGONROCK_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    if let Ok(log_dir) = std::env::var("DRAGONROCK_LOG_DIR") {
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = tracing_appender::rolling::never(&log_dir, "server.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true),
            )
            .init();
        return Ok(LoggingHandle { guard: Some(guard) });
    }

    registry
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    Ok(LoggingHandle { guard: None })
}
