//! Server state

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::broadcast::hub::Hub;
use crate::broadcast::notifier::ChangeNotifier;
use crate::deploy::pipeline::Pipeline;

/// Server state shared across handlers
pub struct ServerState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<ChangeNotifier>,
    pub hub: Arc<Hub>,
    pub webhook_secret: Option<SecretString>,
    pub git_ref: Option<String>,
    pub history_limit: usize,
    pub stale_after: Duration,
}

impl ServerState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<ChangeNotifier>,
        hub: Arc<Hub>,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            pipeline,
            store,
            hub,
            webhook_secret,
            git_ref: None,
            history_limit: 50,
            stale_after: crate::models::deployment::DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_git_ref(mut self, git_ref: Option<String>) -> Self {
        self.git_ref = git_ref;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}
