//! Deployment models

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::generate_uuid;

/// Default age after which a running deployment is reported as stale
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Stored deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Success,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    /// Whether the status ends a deployment attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

/// Status reported to observers.
///
/// `Stale` only exists at read time and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Running,
    Success,
    Failed,
    Canceled,
    Stale,
}

impl From<DeploymentStatus> for DisplayStatus {
    fn from(status: DeploymentStatus) -> Self {
        match status {
            DeploymentStatus::Running => DisplayStatus::Running,
            DeploymentStatus::Success => DisplayStatus::Success,
            DeploymentStatus::Failed => DisplayStatus::Failed,
            DeploymentStatus::Canceled => DisplayStatus::Canceled,
        }
    }
}

/// A single attempt to build and deploy the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique deployment ID, immutable
    pub id: String,

    /// Current status
    pub status: DeploymentStatus,

    /// Commit message of the push that triggered the deployment
    #[serde(default)]
    pub message: String,

    /// Creation time, reset when a canceled deployment is replayed
    pub started_at: DateTime<Utc>,

    /// Set on success or failure only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Whether this deployment's artifact is serving traffic
    #[serde(default)]
    pub is_current: bool,

    /// Captured output of the failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl DeploymentRecord {
    /// Create a new record for a push, either running or canceled
    pub fn new(message: impl Into<String>, status: DeploymentStatus) -> Self {
        Self {
            id: generate_uuid(),
            status,
            message: message.into(),
            started_at: Utc::now(),
            finished_at: None,
            is_current: false,
            output: None,
        }
    }

    /// Status as seen by observers at `now`
    pub fn display_status(&self, now: DateTime<Utc>, stale_after: Duration) -> DisplayStatus {
        if self.status == DeploymentStatus::Running && self.finished_at.is_none() {
            let age = now.signed_duration_since(self.started_at);
            if age.to_std().map(|age| age > stale_after).unwrap_or(false) {
                return DisplayStatus::Stale;
            }
        }
        self.status.into()
    }

    /// Project the record into its observer-facing view
    pub fn view(&self, now: DateTime<Utc>, stale_after: Duration) -> DeploymentView {
        DeploymentView {
            id: self.id.clone(),
            status: self.display_status(now, stale_after),
            message: self.message.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            is_current: self.is_current,
            output: self.output.clone(),
        }
    }
}

/// Observer-facing projection of a deployment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentView {
    pub id: String,
    pub status: DisplayStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub is_current: bool,

    /// Tail of the failing step's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}
