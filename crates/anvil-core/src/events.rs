//! Events consumed by the dispatch loop.
//!
//! All external stimuli (trigger firings, worker completions, connectivity
//! changes, operator requests) are queued through one channel and processed
//! one at a time, so the loop never observes half-transitioned state.

use crate::ids::RunId;
use serde::{Deserialize, Serialize};

/// Outcome reported by the worker collaborator for a dispatched run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Success,
    /// Failure reason is carried opaquely from the worker.
    Failure(String),
    /// The worker acknowledged a cancellation signal.
    Cancelled,
}

/// One queued input to the dispatch loop.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The nightly schedule reached its hour:minute for a project.
    NightlyDue { project: String },
    /// Operator requested builds of an explicit list of qualified target
    /// names, gated by the force-allow policy.
    ForceBuild {
        targets: Vec<String>,
        requested_by: Option<String>,
    },
    /// The worker acknowledged start of a dispatched run.
    WorkerAck { run: RunId },
    /// The worker reported completion of a run.
    WorkerCompleted {
        run: RunId,
        outcome: CompletionOutcome,
    },
    WorkerDisconnected { hostname: String },
    WorkerReconnected { hostname: String },
    /// Operator requested cancellation of a run.
    CancelRun {
        run: RunId,
        requested_by: Option<String>,
    },
    Shutdown,
}
