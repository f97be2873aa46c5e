//! Local worker transport for single-host operation.

use anvil_core::events::{CompletionOutcome, DispatchEvent};
use anvil_core::ids::RunId;
use anvil_core::ports::{DispatchOrder, WorkerTransport};
use anvil_core::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{info, warn};

/// In-process stand-in for remote build workers.
///
/// Each dispatched order runs on this host: acknowledge, clone the
/// repository into a per-run workspace, execute the resolved steps, then
/// feed the completion back into the dispatch loop as an event. Cancelling
/// aborts the run task and reports the run as cancelled.
pub struct LocalTransport {
    events: mpsc::UnboundedSender<DispatchEvent>,
    workspace_root: PathBuf,
    active: Arc<Mutex<HashMap<RunId, AbortHandle>>>,
}

impl LocalTransport {
    pub fn new(events: mpsc::UnboundedSender<DispatchEvent>, workspace_root: PathBuf) -> Self {
        Self {
            events,
            workspace_root,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn dispatch(&self, order: DispatchOrder) -> Result<()> {
        let run = order.run_id;
        let workspace = self.workspace_root.join(run.to_string());
        let events = self.events.clone();
        let active = Arc::clone(&self.active);

        // Register under the lock before the task can deregister itself,
        // otherwise a fast run would leave a stale entry behind.
        let mut registered = self.active.lock().await;
        let handle = tokio::spawn(async move {
            let _ = events.send(DispatchEvent::WorkerAck { run });
            info!(run = %run, target = %order.target, "local build started");

            let outcome = execute(&order, &workspace).await;
            remove_workspace(run, &workspace).await;

            active.lock().await.remove(&run);
            let _ = events.send(DispatchEvent::WorkerCompleted { run, outcome });
        });
        registered.insert(run, handle.abort_handle());
        Ok(())
    }

    async fn cancel(&self, run: RunId, worker: &str) -> Result<()> {
        let handle = self.active.lock().await.remove(&run);
        if let Some(handle) = handle {
            handle.abort();
            // The aborted task never reaches its own cleanup.
            remove_workspace(run, &self.workspace_root.join(run.to_string())).await;
            info!(run = %run, worker, "local build aborted");
            let _ = self.events.send(DispatchEvent::WorkerCompleted {
                run,
                outcome: CompletionOutcome::Cancelled,
            });
        } else {
            warn!(run = %run, worker, "cancel for a run that is not active here");
        }
        Ok(())
    }
}

async fn remove_workspace(run: RunId, workspace: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(run = %run, error = %e, "failed to clean up workspace");
        }
    }
}

/// Clone the repository and run every step in order. The first failing
/// command decides the outcome; remaining steps are skipped.
async fn execute(order: &DispatchOrder, workspace: &Path) -> CompletionOutcome {
    if let Err(e) = tokio::fs::create_dir_all(workspace).await {
        return CompletionOutcome::Failure(format!("create workspace: {e}"));
    }

    let clone = Command::new("git")
        .args(["clone", "--depth", "1", "--branch", &order.branch])
        .arg(&order.repo_url)
        .arg(".")
        .current_dir(workspace)
        .output()
        .await;
    match clone {
        Ok(out) if out.status.success() => {}
        Ok(out) => {
            return CompletionOutcome::Failure(format!(
                "git clone exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Err(e) => return CompletionOutcome::Failure(format!("git clone: {e}")),
    }

    for (index, step) in order.steps.iter().enumerate() {
        let Some((program, args)) = step.split_first() else {
            return CompletionOutcome::Failure(format!("step {index} is empty"));
        };
        match Command::new(program)
            .args(args)
            .current_dir(workspace)
            .output()
            .await
        {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                return CompletionOutcome::Failure(format!(
                    "step {index} ({program}) exited with {}",
                    out.status
                ));
            }
            Err(e) => return CompletionOutcome::Failure(format!("step {index} ({program}): {e}")),
        }
    }

    CompletionOutcome::Success
}
