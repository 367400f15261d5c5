//! Change notifier
//!
//! A [`DeploymentStore`] decorator: every successful create or update is turned
//! into a `creation` or `update` message on the deployments topic. Writes and
//! their fan-out run under one lock, so each connection sees updates in the same
//! order the store applied them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::broadcast::hub::{ConnectionId, Event, Hub};
use crate::broadcast::protocol::{ServerMessage, DEPLOYMENTS_TOPIC};
use crate::errors::AgentError;
use crate::models::deployment::DeploymentRecord;
use crate::store::{DeploymentQuery, DeploymentStore, SaveOutcome};

pub struct ChangeNotifier {
    inner: Arc<dyn DeploymentStore>,
    hub: Arc<Hub>,
    stale_after: Duration,
    write_lock: Mutex<()>,
}

impl ChangeNotifier {
    pub fn new(inner: Arc<dyn DeploymentStore>, hub: Arc<Hub>, stale_after: Duration) -> Self {
        Self {
            inner,
            hub,
            stale_after,
            write_lock: Mutex::new(()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Send the current history to one connection.
    ///
    /// Runs under the write lock, so no update can be queued ahead of the
    /// snapshot it follows.
    pub async fn send_state(
        &self,
        connection: ConnectionId,
        limit: usize,
    ) -> Result<(), AgentError> {
        let _guard = self.write_lock.lock().await;
        let records = self.inner.query(&DeploymentQuery::history(limit)).await?;
        let now = Utc::now();
        let deployments = records
            .iter()
            .map(|record| record.view(now, self.stale_after))
            .collect();

        self.hub
            .broadcast(Event::direct(connection, ServerMessage::State { deployments }));
        Ok(())
    }

    fn publish(&self, message: ServerMessage) {
        let delivered = self.hub.broadcast(Event::topic(DEPLOYMENTS_TOPIC, message));
        debug!(delivered, "Deployment change published");
    }
}

#[async_trait]
impl DeploymentStore for ChangeNotifier {
    async fn save(&self, record: &DeploymentRecord) -> Result<SaveOutcome, AgentError> {
        let _guard = self.write_lock.lock().await;
        let outcome = self.inner.save(record).await?;

        let deployment = record.view(Utc::now(), self.stale_after);
        self.publish(match outcome {
            SaveOutcome::Created => ServerMessage::Creation { deployment },
            SaveOutcome::Updated => ServerMessage::Update { deployment },
        });
        Ok(outcome)
    }

    async fn find(&self, id: &str) -> Result<Option<DeploymentRecord>, AgentError> {
        self.inner.find(id).await
    }

    async fn query(&self, query: &DeploymentQuery) -> Result<Vec<DeploymentRecord>, AgentError> {
        self.inner.query(query).await
    }

    async fn set_current(&self, id: &str) -> Result<Vec<DeploymentRecord>, AgentError> {
        let _guard = self.write_lock.lock().await;
        let changed = self.inner.set_current(id).await?;

        let now = Utc::now();
        for record in &changed {
            self.publish(ServerMessage::Update {
                deployment: record.view(now, self.stale_after),
            });
        }
        Ok(changed)
    }
}
