//! Build run state.

use crate::ids::{FiringId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One execution attempt of a target in response to one trigger firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRun {
    pub id: RunId,
    /// Fully-qualified target name (`project@target`).
    pub target: String,
    pub project: String,
    pub firing: FiringId,
    pub state: RunState,
    /// Assigned worker hostname, set on Queued -> Assigned.
    pub worker: Option<String>,
    pub failure: Option<FailureReason>,
    /// Set when an operator requested cancellation of an in-flight run;
    /// the terminal state is decided by the worker's acknowledgement.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildRun {
    pub fn queued(target: &str, project: &str, firing: FiringId) -> Self {
        Self {
            id: RunId::new(),
            target: target.to_string(),
            project: project.to_string(),
            firing,
            state: RunState::Queued,
            worker: None,
            failure: None,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Assigned,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }

    /// Legal edges of the run state machine.
    ///
    /// `Assigned -> Failed` covers worker loss and dispatch failures before
    /// the worker acknowledged start; `Assigned -> Cancelled` covers a
    /// worker acknowledging cancellation before the start ack arrived.
    /// Success is only reachable through `Running`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Queued, Assigned)
                | (Queued, Cancelled)
                | (Assigned, Running)
                | (Assigned, Failed)
                | (Assigned, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Queued => "queued",
            RunState::Assigned => "assigned",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Why a run failed. Execution reasons are carried opaquely from the worker
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    WorkerLost,
    Execution(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::WorkerLost => write!(f, "worker lost"),
            FailureReason::Execution(reason) => write!(f, "{reason}"),
        }
    }
}
