//! Logging configuration

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::errors::ApiError;

/// Log level configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl serde::Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_filter_string())
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub log_level: LogLevel,

    /// Write logs to stdout
    pub stdout: bool,

    /// Directory for daily-rolling log files; no file output when unset
    pub log_dir: Option<PathBuf>,

    /// File name prefix of the rolling log files
    pub file_prefix: String,

    /// Enable JSON format
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stdout: true,
            log_dir: None,
            file_prefix: "blacktree-api.log".to_string(),
            json_format: false,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
///
/// When file output is enabled the returned guard flushes the background
/// writer on drop and must be kept alive for the life of the process.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, ApiError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if options.stdout {
        if options.json_format {
            layers.push(fmt::layer().json().boxed());
        } else {
            layers.push(fmt::layer().boxed());
        }
    }

    let mut guard = None;
    if let Some(dir) = &options.log_dir {
        let appender = tracing_appender::rolling::daily(dir, &options.file_prefix);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        guard = Some(worker_guard);

        let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
        if options.json_format {
            layers.push(file_layer.json().boxed());
        } else {
            layers.push(file_layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ApiError::ConfigError(e.to_string()))?;

    Ok(guard)
}
