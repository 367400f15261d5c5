//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{PipelineSettings, Settings};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Build and restart commands
    pub pipeline: PipelineSettings,

    /// Webhook shared secret
    pub webhook_secret: Option<SecretString>,

    /// Only pushes to this ref deploy
    pub git_ref: Option<String>,

    /// Age after which a running deployment is shown as stale
    pub stale_after: Duration,

    /// Deployments included in the initial dashboard state
    pub history_limit: usize,
}

impl AppOptions {
    pub fn from_settings(storage: StorageLayout, settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            pipeline: settings.pipeline.clone(),
            webhook_secret: settings.webhook.secret.clone(),
            git_ref: settings.webhook.git_ref.clone(),
            stale_after: settings.stale_after(),
            history_limit: settings.history_limit,
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

/// Lifecycle options for the agent
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

/// Local HTTP server options
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
