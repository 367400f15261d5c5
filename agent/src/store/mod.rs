//! Deployment record persistence

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AgentError;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};

/// Whether a save inserted a new record or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

/// Sort order on `started_at`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter, order and limit for [`DeploymentStore::query`]
#[derive(Debug, Clone, Default)]
pub struct DeploymentQuery {
    pub status: Option<DeploymentStatus>,

    /// Strictly greater than
    pub started_after: Option<DateTime<Utc>>,

    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl DeploymentQuery {
    /// Most recent deployments first
    pub fn history(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// The newest canceled deployment that started after `started_at`
    pub fn latest_canceled_after(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(DeploymentStatus::Canceled),
            started_after: Some(started_at),
            order: SortOrder::NewestFirst,
            limit: Some(1),
        }
    }

    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
            && self
                .started_after
                .is_none_or(|after| record.started_at > after)
    }

    /// Filter, sort and truncate an unordered set of records
    pub fn apply<'a>(
        &self,
        records: impl IntoIterator<Item = &'a DeploymentRecord>,
    ) -> Vec<DeploymentRecord> {
        let mut matched: Vec<DeploymentRecord> = records
            .into_iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect();

        match self.order {
            SortOrder::NewestFirst => matched.sort_by(|a, b| b.started_at.cmp(&a.started_at)),
            SortOrder::OldestFirst => matched.sort_by(|a, b| a.started_at.cmp(&b.started_at)),
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Store of deployment records.
///
/// The store is the source of truth for record state. It does not enforce the
/// single-running-deployment rule; the coordinator does.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert or replace a record by id
    async fn save(&self, record: &DeploymentRecord) -> Result<SaveOutcome, AgentError>;

    async fn find(&self, id: &str) -> Result<Option<DeploymentRecord>, AgentError>;

    async fn query(&self, query: &DeploymentQuery) -> Result<Vec<DeploymentRecord>, AgentError>;

    /// Mark `id` as the serving deployment and clear the flag everywhere else in
    /// one step. Returns every record whose flag changed.
    async fn set_current(&self, id: &str) -> Result<Vec<DeploymentRecord>, AgentError>;
}
