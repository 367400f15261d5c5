//! Finite state machine for deployment records
//!
//! Legal transitions:
//!
//! ```text
//! canceled --Replay--> running --Succeed--> success
//!                              \--Fail-----> failed
//! ```
//!
//! A record created while the slot is free starts at `running`; one created while
//! busy starts at `canceled`. Everything else is rejected.

use chrono::{DateTime, Utc};

use crate::errors::AgentError;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// A superseded deployment acquired the slot
    Replay,

    /// All build steps exited successfully
    Succeed,

    /// A build step failed, carrying its captured output
    Fail(String),
}

/// Apply `event` to `record`, stamping `finished_at` with `now` on terminal events.
///
/// The record is left untouched when the transition is rejected.
pub fn apply(
    record: &mut DeploymentRecord,
    event: DeploymentEvent,
    now: DateTime<Utc>,
) -> Result<(), AgentError> {
    let next = match (record.status, &event) {
        (DeploymentStatus::Canceled, DeploymentEvent::Replay) => DeploymentStatus::Running,
        (DeploymentStatus::Running, DeploymentEvent::Succeed) => DeploymentStatus::Success,
        (DeploymentStatus::Running, DeploymentEvent::Fail(_)) => DeploymentStatus::Failed,
        (state, event) => {
            return Err(AgentError::InvalidTransition(format!(
                "{:?} -> {:?} for deployment {}",
                state, event, record.id
            )));
        }
    };

    record.status = next;
    match event {
        DeploymentEvent::Replay => {
            record.finished_at = None;
            record.output = None;
        }
        DeploymentEvent::Succeed => {
            record.finished_at = Some(now);
        }
        DeploymentEvent::Fail(output) => {
            record.finished_at = Some(now);
            record.output = Some(output);
        }
    }

    Ok(())
}
