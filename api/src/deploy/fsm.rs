//! Finite state machine for the deployment lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Registered, nothing reported by a worker yet
    #[default]
    Pending,

    /// Repository cloned on the worker
    Cloned,

    /// Image build in progress
    Building,

    /// Image built, container not started
    Built,

    /// Container running
    Ready,

    /// Container halted
    Stopped,

    /// Removed from the worker; absorbing
    Deleted,
}

/// Outcome of evaluating a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The new status should be stored
    Apply,

    /// Already in the requested status
    Unchanged,

    /// Not allowed from the current status (stale or after deletion)
    Rejected,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Cloned => "cloned",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Built => "built",
            DeploymentStatus::Ready => "ready",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Deleted => "deleted",
        }
    }

    /// No transition leaves this status
    pub fn is_terminal(&self) -> bool {
        *self == DeploymentStatus::Deleted
    }

    /// Statuses a worker report may move this status to
    pub fn allowed_targets(&self) -> &'static [DeploymentStatus] {
        use DeploymentStatus::*;

        match self {
            Pending => &[Cloned, Building, Built, Ready, Stopped, Deleted],
            Cloned => &[Building, Built, Ready, Stopped, Deleted],
            Building => &[Cloned, Built, Ready, Stopped, Deleted],
            Built => &[Cloned, Building, Ready, Stopped, Deleted],
            // a rebuild of a running container restarts at the clone step
            Ready => &[Cloned, Stopped, Deleted],
            Stopped => &[Cloned, Building, Ready, Deleted],
            Deleted => &[],
        }
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    /// Evaluate a worker-reported status against the current one
    pub fn transition(&self, next: DeploymentStatus) -> Transition {
        if *self == next {
            Transition::Unchanged
        } else if self.can_transition_to(next) {
            Transition::Apply
        } else {
            Transition::Rejected
        }
    }

    /// Whether a freshly published build/trigger may pre-set `Building`
    pub fn accepts_optimistic_building(&self) -> bool {
        !self.is_terminal() && *self != DeploymentStatus::Building
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
