//! Settings file and environment overrides

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::options::{AppOptions, LifecycleOptions, ServerOptions};
use crate::errors::ApiError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};
use crate::messaging::broker::{redact_url, BrokerOptions};
use crate::messaging::consumer::ConsumerOptions;
use crate::services::deployments::CommandOptions;
use crate::workers::results;

/// Broker URL
pub const ENV_MQ_URL: &str = "MQ_URL";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_ADMIN_HOST: &str = "ADMIN_HOST";
pub const ENV_ADMIN_PORT: &str = "ADMIN_PORT";

/// API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub broker: BrokerSettings,

    #[serde(default)]
    pub consumer: ConsumerSettings,

    #[serde(default)]
    pub commands: CommandSettings,

    #[serde(default)]
    pub admin_server: AdminServerSettings,

    /// Upper bound on graceful shutdown, in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            broker: BrokerSettings::default(),
            consumer: ConsumerSettings::default(),
            commands: CommandSettings::default(),
            admin_server: AdminServerSettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub json: bool,

    /// Directory for daily-rolling log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Broker settings
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// AMQP URL; usually supplied through `MQ_URL`
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_connection_name() -> String {
    "blacktree-api".to_string()
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            connection_name: default_connection_name(),
        }
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("url", &redact_url(&self.url))
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

/// Result consumer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,

    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_prefetch() -> u16 {
    1
}

fn default_max_deliveries() -> u32 {
    5
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            prefetch: default_prefetch(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// Command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Mark deployments BUILDING as soon as a build or trigger is published
    #[serde(default = "default_true")]
    pub optimistic_building: bool,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            optimistic_building: true,
        }
    }
}

/// Admin HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_admin_host")]
    pub host: String,

    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    8080
}

impl Default for AdminServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

impl Settings {
    /// Read the settings file (when given), apply environment overrides and
    /// validate the result
    pub async fn load(path: Option<&str>) -> Result<Self, ApiError> {
        let mut settings = match path {
            Some(path) => {
                let file = File::new(path);
                file.read_json::<Settings>().await.map_err(|e| {
                    ApiError::ConfigError(format!(
                        "Unable to read settings file {}: {e}",
                        file.path().display()
                    ))
                })?
            }
            None => Settings::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Override fields from `lookup`, which maps an environment variable name
    /// to its value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_MQ_URL) {
            self.broker.url = url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level
                .parse()
                .map_err(|e| ApiError::ConfigError(format!("{ENV_LOG_LEVEL}: {e}")))?;
        }
        if let Some(host) = lookup(ENV_ADMIN_HOST) {
            self.admin_server.host = host;
        }
        if let Some(port) = lookup(ENV_ADMIN_PORT) {
            self.admin_server.port = port.trim().parse().map_err(|_| {
                ApiError::ConfigError(format!("{ENV_ADMIN_PORT} is not a valid port: {port}"))
            })?;
        }
        Ok(())
    }

    /// The broker URL must be present and use the `amqp` or `amqps` scheme
    pub fn validate(&self) -> Result<(), ApiError> {
        let raw = self.broker.url.trim();
        if raw.is_empty() {
            return Err(ApiError::ConfigError(format!(
                "broker URL is not configured; set {ENV_MQ_URL}"
            )));
        }

        let parsed = url::Url::parse(raw)
            .map_err(|e| ApiError::ConfigError(format!("invalid broker URL: {e}")))?;
        match parsed.scheme() {
            "amqp" | "amqps" => {}
            other => {
                return Err(ApiError::ConfigError(format!(
                    "unsupported broker URL scheme: {other}"
                )))
            }
        }

        if self.consumer.prefetch == 0 {
            return Err(ApiError::ConfigError("consumer prefetch must be at least 1".to_string()));
        }
        if self.consumer.max_deliveries == 0 {
            return Err(ApiError::ConfigError(
                "consumer max_deliveries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log.level,
            log_dir: self.log.dir.clone(),
            json_format: self.log.json,
            ..Default::default()
        }
    }

    pub fn app_options(&self) -> AppOptions {
        AppOptions {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(self.max_shutdown_delay_secs),
            },
            broker: BrokerOptions {
                url: self.broker.url.trim().to_string(),
                connection_name: self.broker.connection_name.clone(),
            },
            consumer: ConsumerOptions {
                max_deliveries: self.consumer.max_deliveries,
                ..Default::default()
            },
            result_worker: results::Options {
                prefetch: self.consumer.prefetch,
                ..Default::default()
            },
            commands: CommandOptions {
                optimistic_building: self.commands.optimistic_building,
            },
            enable_admin_server: self.admin_server.enabled,
            server: ServerOptions {
                host: self.admin_server.host.clone(),
                port: self.admin_server.port,
            },
        }
    }
}
