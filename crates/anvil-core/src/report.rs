//! Report payloads for status-report collaborators.

use crate::ids::{FiringId, RunId};
use crate::run::{BuildRun, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a finished build run, delivered to report sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: String,
    pub project: String,
    pub firing: FiringId,
    pub state: RunState,
    pub failure: Option<String>,
    pub worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn from_run(run: &BuildRun) -> Self {
        Self {
            run_id: run.id,
            target: run.target.clone(),
            project: run.project.clone(),
            firing: run.firing,
            state: run.state,
            failure: run.failure.as_ref().map(|f| f.to_string()),
            worker: run.worker.clone(),
            created_at: run.created_at,
            completed_at: run.completed_at,
        }
    }

    /// One-line summary used by log and email sinks.
    pub fn summary(&self) -> String {
        match (&self.failure, &self.worker) {
            (Some(reason), Some(worker)) => {
                format!("{} {} on {}: {}", self.target, self.state, worker, reason)
            }
            (Some(reason), None) => format!("{} {}: {}", self.target, self.state, reason),
            (None, Some(worker)) => format!("{} {} on {}", self.target, self.state, worker),
            (None, None) => format!("{} {}", self.target, self.state),
        }
    }
}
