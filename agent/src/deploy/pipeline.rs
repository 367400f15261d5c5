//! Deployment pipeline
//!
//! Turns push notifications into deployment records and drives them through the
//! build executor, one at a time:
//!
//! 1. A push that gets the slot is recorded `running` and built in a detached
//!    task; a push that does not is recorded `canceled`.
//! 2. A failed build is recorded `failed` and the slot is released. Canceled
//!    deployments stay canceled until the next push.
//! 3. A successful build is recorded `success` and the slot is released. The newest
//!    deployment canceled after it started is then replayed under its own id; older
//!    canceled ones are superseded for good. If a newer push grabbed the slot in
//!    the meantime, the candidate is left as it was and that push wins. With
//!    nothing to replay, the build is marked current and the service restarted.
//!
//! Store failures are logged and never stop the pipeline from moving on.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broadcast::hub::{Event, Hub};
use crate::broadcast::protocol::{ServerMessage, DEPLOYMENTS_TOPIC};
use crate::deploy::coordinator::Coordinator;
use crate::deploy::executor::BuildExecutor;
use crate::deploy::fsm::{self, DeploymentEvent};
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};
use crate::store::{DeploymentQuery, DeploymentStore};

/// Result of handing a push to the pipeline
#[derive(Debug)]
pub struct PushOutcome {
    /// The record created for the push
    pub deployment: DeploymentRecord,

    /// The detached run, including any replays it drains; `None` when the push
    /// was canceled
    pub handle: Option<JoinHandle<()>>,
}

/// What happens after a successful build
#[derive(Debug)]
enum NextStep {
    /// A superseded deployment now holds the slot
    Replay(DeploymentRecord),

    /// A newer push took the slot before the replay could
    Deferred,

    /// Nothing left to build
    Idle,
}

pub struct Pipeline {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn DeploymentStore>,
    hub: Arc<Hub>,
    executor: Arc<BuildExecutor>,

    /// Number of spawned runs that have not returned yet
    active_runs: watch::Sender<usize>,
}

impl Pipeline {
    pub fn new(
        coordinator: Arc<Coordinator>,
        store: Arc<dyn DeploymentStore>,
        hub: Arc<Hub>,
        executor: Arc<BuildExecutor>,
    ) -> Self {
        Self {
            coordinator,
            store,
            hub,
            executor,
            active_runs: watch::Sender::new(0),
        }
    }

    /// Whether a deployment currently holds the slot
    pub fn is_deploying(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Record an authenticated push and start building it if the slot is free.
    ///
    /// Returns once the record is stored; the build itself runs detached.
    pub async fn on_push(self: &Arc<Self>, message: impl Into<String>) -> PushOutcome {
        let acquired = self.coordinator.request_slot();
        let status = if acquired {
            DeploymentStatus::Running
        } else {
            DeploymentStatus::Canceled
        };

        let deployment = DeploymentRecord::new(message, status);
        self.persist(&deployment).await;

        if !acquired {
            info!(deployment = %deployment.id, "Deployment in progress, push recorded as canceled");
            return PushOutcome {
                deployment,
                handle: None,
            };
        }

        let pipeline = Arc::clone(self);
        let record = deployment.clone();
        self.active_runs.send_modify(|n| *n += 1);
        let handle = tokio::spawn(async move {
            pipeline.run(record).await;
            pipeline.active_runs.send_modify(|n| *n = n.saturating_sub(1));
        });

        PushOutcome {
            deployment,
            handle: Some(handle),
        }
    }

    /// Wait until every started run, replays included, has returned.
    ///
    /// Builds are never aborted, so shutdown waits here instead.
    pub async fn wait_idle(&self) {
        let mut active = self.active_runs.subscribe();
        let _ = active.wait_for(|n| *n == 0).await;
    }

    /// Build a deployment that already holds the slot, then keep replaying the
    /// newest superseded deployment until there is none.
    async fn run(&self, mut record: DeploymentRecord) {
        loop {
            info!(deployment = %record.id, message = %record.message, "Deployment started");

            if let Err(failure) = self.executor.build().await {
                error!(deployment = %record.id, %failure, "Deployment failed");
                self.transition(&mut record, DeploymentEvent::Fail(failure.output.clone()))
                    .await;
                self.coordinator.release();
                self.notice(format!(
                    "Deployment {} failed at step {}",
                    record.id, failure.name
                ));
                return;
            }

            info!(deployment = %record.id, "Deployment built successfully");
            self.transition(&mut record, DeploymentEvent::Succeed).await;
            self.coordinator.release();

            match self.next_step(&record).await {
                NextStep::Replay(next) => record = next,
                NextStep::Deferred => return,
                NextStep::Idle => {
                    self.go_live(&record).await;
                    return;
                }
            }
        }
    }

    async fn next_step(&self, finished: &DeploymentRecord) -> NextStep {
        let query = DeploymentQuery::latest_canceled_after(finished.started_at);
        let mut candidate = match self.store.query(&query).await {
            Ok(found) => match found.into_iter().next() {
                Some(candidate) => candidate,
                None => return NextStep::Idle,
            },
            Err(e) => {
                warn!(error = %e, "Failed to look up canceled deployments, skipping replay");
                return NextStep::Idle;
            }
        };

        // A newer push owns the slot; it supersedes the candidate
        if !self.coordinator.request_slot() {
            info!(deployment = %candidate.id, "Slot taken by a newer push, replay skipped");
            return NextStep::Deferred;
        }

        candidate.started_at = Utc::now();
        info!(deployment = %candidate.id, "Replaying superseded deployment");
        self.transition(&mut candidate, DeploymentEvent::Replay).await;
        self.notice(format!("Replaying deployment {}", candidate.id));
        NextStep::Replay(candidate)
    }

    async fn go_live(&self, record: &DeploymentRecord) {
        if let Err(e) = self.store.set_current(&record.id).await {
            warn!(deployment = %record.id, error = %e, "Failed to mark deployment current");
        }

        match self.executor.restart().await {
            Ok(_) => info!(deployment = %record.id, "Service restarted"),
            Err(failure) => {
                error!(deployment = %record.id, %failure, "Service restart failed");
                self.notice(format!(
                    "Deployment {} built but the restart failed",
                    record.id
                ));
            }
        }
    }

    async fn transition(&self, record: &mut DeploymentRecord, event: DeploymentEvent) {
        if let Err(e) = fsm::apply(record, event, Utc::now()) {
            error!(deployment = %record.id, error = %e, "Rejected deployment transition");
            return;
        }
        self.persist(record).await;
    }

    async fn persist(&self, record: &DeploymentRecord) {
        if let Err(e) = self.store.save(record).await {
            warn!(deployment = %record.id, error = %e, "Failed to persist deployment");
        }
    }

    fn notice(&self, text: String) {
        self.hub
            .broadcast(Event::topic(DEPLOYMENTS_TOPIC, ServerMessage::notice(text)));
    }
}
