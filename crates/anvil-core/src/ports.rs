//! Port traits between the dispatch core and external collaborators.

use crate::ids::RunId;
use crate::report::RunReport;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a worker needs to execute one build run.
///
/// The transport is expected to check out `repo_url` at `branch` before
/// running the steps, so the checkout never appears as an explicit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub run_id: RunId,
    /// Fully-qualified target name (`project@target`).
    pub target: String,
    pub repo_url: String,
    pub branch: String,
    /// Resolved build steps, each an argv token list.
    pub steps: Vec<Vec<String>>,
    pub worker: String,
}

/// Wire transport to remote build workers.
///
/// `dispatch` must not block on the build itself: it hands the order off and
/// returns, with start acknowledgement and completion delivered back to the
/// dispatch loop as queued events. `cancel` is a cooperative signal; the run
/// only becomes cancelled once the worker acknowledges.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn dispatch(&self, order: DispatchOrder) -> Result<()>;

    async fn cancel(&self, run: RunId, worker: &str) -> Result<()>;
}

/// Delivery channel for completed-run reports (email, HTTP, ...).
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &RunReport) -> Result<()>;
}
