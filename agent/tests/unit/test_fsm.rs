//! Deployment lifecycle tests

use chrono::Utc;

use shipd::deploy::fsm::{apply, DeploymentEvent};
use shipd::errors::AgentError;
use shipd::models::deployment::{DeploymentRecord, DeploymentStatus};

#[test]
fn test_fsm_replay_then_success_flow() {
    let mut record = DeploymentRecord::new("bump deps", DeploymentStatus::Canceled);

    // canceled -> running
    apply(&mut record, DeploymentEvent::Replay, Utc::now()).unwrap();
    assert_eq!(record.status, DeploymentStatus::Running);
    assert!(record.finished_at.is_none());

    // running -> success
    apply(&mut record, DeploymentEvent::Succeed, Utc::now()).unwrap();
    assert_eq!(record.status, DeploymentStatus::Success);
    assert!(record.finished_at.is_some());
    assert!(record.output.is_none());
}

#[test]
fn test_fsm_failure_keeps_output() {
    let mut record = DeploymentRecord::new("break build", DeploymentStatus::Running);

    apply(
        &mut record,
        DeploymentEvent::Fail("error[E0308]: mismatched types".to_string()),
        Utc::now(),
    )
    .unwrap();

    assert_eq!(record.status, DeploymentStatus::Failed);
    assert_eq!(
        record.output.as_deref(),
        Some("error[E0308]: mismatched types")
    );
}

#[test]
fn test_fsm_terminal_states_are_final() {
    for status in [DeploymentStatus::Success, DeploymentStatus::Failed] {
        for event in [
            DeploymentEvent::Replay,
            DeploymentEvent::Succeed,
            DeploymentEvent::Fail(String::new()),
        ] {
            let mut record = DeploymentRecord::new("done", status);
            let before = record.clone();

            let result = apply(&mut record, event, Utc::now());
            assert!(matches!(result, Err(AgentError::InvalidTransition(_))));
            assert_eq!(record, before);
        }
    }
}

#[test]
fn test_fsm_canceled_cannot_finish_without_replay() {
    let mut record = DeploymentRecord::new("queued", DeploymentStatus::Canceled);

    assert!(apply(&mut record, DeploymentEvent::Succeed, Utc::now()).is_err());
    assert!(apply(&mut record, DeploymentEvent::Fail("x".into()), Utc::now()).is_err());
    assert_eq!(record.status, DeploymentStatus::Canceled);
}
