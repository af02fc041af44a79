//! Tracing subscriber setup for the binary.

use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Terminal,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log level {0:?}")]
    Level(String),

    #[error("Log file {path} has no file name")]
    FileName { path: PathBuf },

    #[error("Failed to initialize tracing subscriber: {0}")]
    Init(String),
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level; `RUST_LOG` overrides it.
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Terminal,
            file: None,
        }
    }
}

impl LogConfig {
    pub fn new(level: &str, format: LogFormat) -> Result<Self, LoggingError> {
        let level = level
            .parse::<LevelFilter>()
            .map_err(|_| LoggingError::Level(level.to_string()))?;
        Ok(Self {
            level,
            format,
            file: None,
        })
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes the log file on drop and must be held for
    /// the life of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();

        let stderr_layer = format_layer(self.format, io::stderr, true);
        let (file_layer, guard) = match &self.file {
            Some(path) => {
                let (layer, guard) = file_layer(path, self.format)?;
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;
        Ok(guard)
    }
}

fn file_layer<S>(
    path: &Path,
    format: LogFormat,
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    let file_name = path.file_name().ok_or_else(|| LoggingError::FileName {
        path: path.to_path_buf(),
    })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((format_layer(format, writer, false), guard))
}

fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);

    match format {
        LogFormat::Terminal => Box::new(base.compact()),
        LogFormat::Json => Box::new(base.json()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_parses_level() {
        let config = LogConfig::new("debug", LogFormat::Json).unwrap();
        assert_eq!(config.level, LevelFilter::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.file.is_none());

        assert!(matches!(
            LogConfig::new("loud", LogFormat::Terminal),
            Err(LoggingError::Level(_))
        ));
    }
}
