//! Application configuration options

use std::time::Duration;

use crate::messaging::broker::BrokerOptions;
use crate::messaging::consumer::ConsumerOptions;
use crate::services::deployments::CommandOptions;
use crate::workers::results;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    /// Broker connection
    pub broker: BrokerOptions,

    /// Result handling policy
    pub consumer: ConsumerOptions,

    /// Result worker options
    pub result_worker: results::Options,

    /// Worker command options
    pub commands: CommandOptions,

    /// Enable the admin HTTP server
    pub enable_admin_server: bool,

    /// Admin server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            broker: BrokerOptions::default(),
            consumer: ConsumerOptions::default(),
            result_worker: results::Options::default(),
            commands: CommandOptions::default(),
            enable_admin_server: true,
            server: ServerOptions::default(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Admin HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
