//! Status machine tests driven through the mapper, as results arrive

use blacktree::deploy::fsm::{DeploymentStatus, Transition};
use blacktree::deploy::mapper::map_status;
use blacktree::errors::ApiError;

/// Fold worker tokens over a starting status the way the consumer does
fn replay(start: DeploymentStatus, tokens: &[&str]) -> DeploymentStatus {
    tokens.iter().fold(start, |current, token| {
        let reported = map_status(token).unwrap();
        match current.transition(reported) {
            Transition::Apply => reported,
            Transition::Unchanged | Transition::Rejected => current,
        }
    })
}

#[test]
fn test_fsm_initial_state() {
    assert_eq!(DeploymentStatus::default(), DeploymentStatus::Pending);
}

#[test]
fn test_fsm_worker_pipeline() {
    let status = replay(
        DeploymentStatus::Pending,
        &["cloned", "building", "built", "running"],
    );
    assert_eq!(status, DeploymentStatus::Ready);
}

#[test]
fn test_fsm_late_building_after_deleted() {
    let status = replay(
        DeploymentStatus::Pending,
        &["building", "running", "deleted", "building", "running"],
    );
    assert_eq!(status, DeploymentStatus::Deleted);
}

#[test]
fn test_fsm_replaying_a_result_is_idempotent() {
    let once = replay(DeploymentStatus::Pending, &["cloned", "built"]);
    let twice = replay(DeploymentStatus::Pending, &["cloned", "cloned", "built", "built"]);
    assert_eq!(once, twice);
}

#[test]
fn test_fsm_stale_build_progress_after_ready() {
    // an out-of-order `built` after `running` must not move READY backwards
    let status = replay(DeploymentStatus::Pending, &["building", "running", "built"]);
    assert_eq!(status, DeploymentStatus::Ready);
}

#[test]
fn test_fsm_stop_and_restart() {
    let status = replay(DeploymentStatus::Ready, &["stopped"]);
    assert_eq!(status, DeploymentStatus::Stopped);

    let status = replay(status, &["running"]);
    assert_eq!(status, DeploymentStatus::Ready);
}

#[test]
fn test_fsm_rebuild_of_running_deployment() {
    let status = replay(DeploymentStatus::Ready, &["cloned", "building", "built", "running"]);
    assert_eq!(status, DeploymentStatus::Ready);
}

#[test]
fn test_fsm_unknown_token_is_an_error() {
    assert!(matches!(map_status("exploded"), Err(ApiError::UnknownStatus(_))));
}

#[test]
fn test_fsm_optimistic_building_guard() {
    assert!(DeploymentStatus::Pending.accepts_optimistic_building());
    assert!(DeploymentStatus::Stopped.accepts_optimistic_building());
    assert!(!DeploymentStatus::Building.accepts_optimistic_building());
    assert!(!DeploymentStatus::Deleted.accepts_optimistic_building());
}
