//! In-memory deployment store

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::AgentError;
use crate::models::deployment::DeploymentRecord;
use crate::store::{DeploymentQuery, DeploymentStore, SaveOutcome};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<DeploymentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<DeploymentRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Copy of every record, in insertion order
    pub async fn snapshot(&self) -> Vec<DeploymentRecord> {
        self.records.read().await.clone()
    }
}

pub(crate) fn upsert(records: &mut Vec<DeploymentRecord>, record: &DeploymentRecord) -> SaveOutcome {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => {
            *existing = record.clone();
            SaveOutcome::Updated
        }
        None => {
            records.push(record.clone());
            SaveOutcome::Created
        }
    }
}

pub(crate) fn mark_current(
    records: &mut [DeploymentRecord],
    id: &str,
) -> Result<Vec<DeploymentRecord>, AgentError> {
    if !records.iter().any(|r| r.id == id) {
        return Err(AgentError::NotFound(format!("deployment {}", id)));
    }

    let mut changed = Vec::new();
    for record in records.iter_mut() {
        let should_be_current = record.id == id;
        if record.is_current != should_be_current {
            record.is_current = should_be_current;
            changed.push(record.clone());
        }
    }
    Ok(changed)
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn save(&self, record: &DeploymentRecord) -> Result<SaveOutcome, AgentError> {
        let mut records = self.records.write().await;
        Ok(upsert(&mut records, record))
    }

    async fn find(&self, id: &str) -> Result<Option<DeploymentRecord>, AgentError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn query(&self, query: &DeploymentQuery) -> Result<Vec<DeploymentRecord>, AgentError> {
        let records = self.records.read().await;
        Ok(query.apply(records.iter()))
    }

    async fn set_current(&self, id: &str) -> Result<Vec<DeploymentRecord>, AgentError> {
        let mut records = self.records.write().await;
        mark_current(&mut records, id)
    }
}
