//! JSON file backed deployment store

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRecord;
use crate::store::memory::{mark_current, upsert};
use crate::store::{DeploymentQuery, DeploymentStore, SaveOutcome};

/// Keeps every record in memory and rewrites the whole history file after each
/// mutation.
///
/// A failed write is reported to the caller, but the in-memory state keeps the
/// mutation and the next successful write persists it.
pub struct FileStore {
    file: File,
    records: Mutex<Vec<DeploymentRecord>>,
}

impl FileStore {
    /// Open the store, loading existing history if the file is present
    pub async fn open(file: File) -> Result<Self, AgentError> {
        let records: Vec<DeploymentRecord> = file.read_json_opt().await?.unwrap_or_default();
        info!(
            path = %file.path().display(),
            count = records.len(),
            "Loaded deployment history"
        );

        Ok(Self {
            file,
            records: Mutex::new(records),
        })
    }

    async fn flush(&self, records: &[DeploymentRecord]) -> Result<(), AgentError> {
        self.file.write_json_atomic(&records).await.map_err(|e| {
            AgentError::StorageError(format!(
                "Failed to write {}: {}",
                self.file.path().display(),
                e
            ))
        })?;
        debug!(count = records.len(), "Deployment history written");
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    async fn save(&self, record: &DeploymentRecord) -> Result<SaveOutcome, AgentError> {
        let mut records = self.records.lock().await;
        let outcome = upsert(&mut records, record);
        self.flush(&records).await?;
        Ok(outcome)
    }

    async fn find(&self, id: &str) -> Result<Option<DeploymentRecord>, AgentError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn query(&self, query: &DeploymentQuery) -> Result<Vec<DeploymentRecord>, AgentError> {
        let records = self.records.lock().await;
        Ok(query.apply(records.iter()))
    }

    async fn set_current(&self, id: &str) -> Result<Vec<DeploymentRecord>, AgentError> {
        let mut records = self.records.lock().await;
        let changed = mark_current(&mut records, id)?;
        if !changed.is_empty() {
            self.flush(&records).await?;
        }
        Ok(changed)
    }
}
