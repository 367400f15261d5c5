//! Application state management
//!
//! The composition root: every shared component is created here once and handed
//! out as an `Arc`.

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::broadcast::hub::Hub;
use crate::broadcast::notifier::ChangeNotifier;
use crate::deploy::coordinator::Coordinator;
use crate::deploy::executor::{BuildExecutor, CommandRunner, PipelineSteps, ShellRunner};
use crate::deploy::pipeline::Pipeline;
use crate::errors::AgentError;
use crate::server::state::ServerState;
use crate::store::file::FileStore;
use crate::store::DeploymentStore;

/// Main application state
pub struct AppState {
    /// Deployment slot
    pub coordinator: Arc<Coordinator>,

    /// Dashboard connections
    pub hub: Arc<Hub>,

    /// Record store that publishes every change to the hub
    pub store: Arc<ChangeNotifier>,

    /// Push to deploy policy
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Initialize application state backed by the history file and a shell runner
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        options.storage.setup().await?;
        let store = FileStore::open(options.storage.deployments_file()).await?;

        Ok(Self::with_parts(
            options,
            Arc::new(store),
            Arc::new(ShellRunner),
        ))
    }

    /// Wire the components around a given store and command runner
    pub fn with_parts(
        options: &AppOptions,
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let coordinator = Arc::new(Coordinator::new());
        let hub = Arc::new(Hub::new());
        let store = Arc::new(ChangeNotifier::new(store, hub.clone(), options.stale_after));

        let executor = Arc::new(BuildExecutor::new(
            runner,
            options.pipeline.work_dir.clone(),
            PipelineSteps::from_settings(&options.pipeline),
        ));

        let pipeline = Arc::new(Pipeline::new(
            coordinator.clone(),
            store.clone(),
            hub.clone(),
            executor,
        ));

        Self {
            coordinator,
            hub,
            store,
            pipeline,
        }
    }

    /// State handed to the HTTP handlers
    pub fn server_state(&self, options: &AppOptions) -> ServerState {
        ServerState::new(
            self.pipeline.clone(),
            self.store.clone(),
            self.hub.clone(),
            options.webhook_secret.clone(),
        )
        .with_git_ref(options.git_ref.clone())
        .with_history_limit(options.history_limit)
        .with_stale_after(options.stale_after)
    }

    /// Shutdown application state, letting any started build run to completion
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        if self.coordinator.is_busy() {
            info!("Waiting for the running deployment to finish...");
        }
        self.pipeline.wait_idle().await;
        Ok(())
    }
}
