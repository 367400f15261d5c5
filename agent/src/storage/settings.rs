//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;
use crate::models::deployment::DEFAULT_STALE_AFTER;

/// Environment variable that overrides the webhook secret from the settings file
pub const WEBHOOK_SECRET_ENV: &str = "SHIPD_WEBHOOK_SECRET";

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Webhook authentication
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Build and restart commands
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Age after which a running deployment is reported as stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Number of deployments sent in the initial dashboard state
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER.as_secs()
}

fn default_history_limit() -> usize {
    50
}

impl Settings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Apply overrides taken from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var(WEBHOOK_SECRET_ENV) {
            if !secret.is_empty() {
                self.webhook.secret = Some(SecretString::from(secret));
            }
        }
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            server: ServerSettings::default(),
            webhook: WebhookSettings::default(),
            pipeline: PipelineSettings::default(),
            stale_after_secs: default_stale_after_secs(),
            history_limit: default_history_limit(),
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Webhook settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Shared secret for `X-Hub-Signature-256`; every push is rejected when unset
    #[serde(default, skip_serializing)]
    pub secret: Option<SecretString>,

    /// Only pushes to this ref trigger a deployment; any ref when unset
    #[serde(default)]
    pub git_ref: Option<String>,
}

/// Pipeline command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Checkout the pipeline runs in
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory the built binary is moved into
    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: PathBuf,

    /// Branch pulled by the default pull step
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Replaces the default `git pull origin <branch>`
    #[serde(default)]
    pub pull_cmd: Option<String>,

    #[serde(default = "default_build_cmd")]
    pub build_cmd: String,

    /// Build output, relative to `work_dir`
    #[serde(default = "default_artifact")]
    pub artifact: String,

    #[serde(default = "default_restart_cmd")]
    pub restart_cmd: String,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/srv/app/src")
}

fn default_deploy_dir() -> PathBuf {
    PathBuf::from("/srv/app/bin")
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_build_cmd() -> String {
    "cargo build --release".to_string()
}

fn default_artifact() -> String {
    "target/release/app".to_string()
}

fn default_restart_cmd() -> String {
    "supervisorctl restart app".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            deploy_dir: default_deploy_dir(),
            branch: default_branch(),
            pull_cmd: None,
            build_cmd: default_build_cmd(),
            artifact: default_artifact(),
            restart_cmd: default_restart_cmd(),
        }
    }
}
