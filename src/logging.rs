use crate::error::DenoiseError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Also write JSON lines to this file
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = DenoiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(DenoiseError::Parse(format!(
                "unknown log format '{}' (expected compact, pretty or json)",
                other
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: Level::INFO,
            format: LogFormat::Compact,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Maps a `-v` count onto a level: 0 info, 1 debug, 2+ trace
    pub fn from_verbosity(occurrences: u64) -> Self {
        let level = match occurrences {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        LogConfig {
            level,
            ..LogConfig::default()
        }
    }
}

/// Initialize the logging system.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for as long as the program runs.
pub fn init_logging(config: LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(config.level.into()));

    let fmt_layer = match config.format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            std::fs::create_dir_all(&dir)?;

            let file_appender = rolling::never(&dir, name);
            let (writer, guard) = non_blocking(file_appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| crate::constants::file::LOG_FILE.to_string());
    (dir, name)
}

/// Logs start and completion of a long-running operation
pub struct OperationLogger {
    operation: String,
    start_time: Instant,
}

impl OperationLogger {
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::info!(operation = %operation, "Operation started");

        OperationLogger {
            operation,
            start_time: Instant::now(),
        }
    }

    pub fn log_error(&self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.operation,
            elapsed_ms = self.start_time.elapsed().as_millis() as u64,
            error = %error,
            "Operation failed"
        );
    }

    pub fn complete(self) {
        tracing::info!(
            operation = %self.operation,
            elapsed_ms = self.start_time.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}
