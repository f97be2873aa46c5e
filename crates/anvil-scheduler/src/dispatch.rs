//! The dispatch loop.
//!
//! One logical loop owns all mutable scheduling state (worker pool, run
//! tracker). External stimuli arrive as `DispatchEvent`s on a single channel
//! and are processed one at a time; worker communication is fire-and-forget
//! from the loop's perspective, with acknowledgements and completions
//! delivered back as queued events.

use crate::pool::WorkerPool;
use crate::registry::ProjectRegistry;
use crate::tracker::RunTracker;
use crate::triggers::TriggerFiring;
use anvil_core::events::{CompletionOutcome, DispatchEvent};
use anvil_core::ids::RunId;
use anvil_core::policy::ForcePolicy;
use anvil_core::ports::{DispatchOrder, ReportSink, WorkerTransport};
use anvil_core::report::RunReport;
use anvil_core::run::{BuildRun, FailureReason, RunState};
use anvil_core::worker::Worker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-target status snapshot for report collaborators.
#[derive(Debug, Clone)]
pub struct TargetStatus {
    pub target: String,
    pub state: Option<RunState>,
    pub worker: Option<String>,
}

pub struct Dispatcher {
    registry: Arc<ProjectRegistry>,
    pool: WorkerPool,
    tracker: RunTracker,
    transport: Arc<dyn WorkerTransport>,
    sinks: Vec<Arc<dyn ReportSink>>,
    force_policy: ForcePolicy,
    /// Handed to spawned transport tasks so their outcomes come back through
    /// the same serialized channel as everything else.
    events: mpsc::UnboundedSender<DispatchEvent>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProjectRegistry>,
        pool: WorkerPool,
        transport: Arc<dyn WorkerTransport>,
        sinks: Vec<Arc<dyn ReportSink>>,
        force_policy: ForcePolicy,
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> Self {
        Self {
            registry,
            pool,
            tracker: RunTracker::new(),
            transport,
            sinks,
            force_policy,
            events,
        }
    }

    /// Consume events until `Shutdown` or all senders are gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<DispatchEvent>) {
        info!("dispatch loop started");
        while let Some(event) = events.recv().await {
            if matches!(event, DispatchEvent::Shutdown) {
                info!("dispatch loop shutting down");
                break;
            }
            self.handle_event(event);
        }
    }

    /// Process one event. Never panics, never blocks on I/O.
    pub fn handle_event(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::NightlyDue { project } => self.handle_nightly(&project),
            DispatchEvent::ForceBuild {
                targets,
                requested_by,
            } => self.handle_force(targets, requested_by),
            DispatchEvent::WorkerAck { run } => self.handle_ack(run),
            DispatchEvent::WorkerCompleted { run, outcome } => {
                self.handle_completion(run, outcome)
            }
            DispatchEvent::WorkerDisconnected { hostname } => self.handle_disconnect(&hostname),
            DispatchEvent::WorkerReconnected { hostname } => self.handle_reconnect(&hostname),
            DispatchEvent::CancelRun { run, requested_by } => {
                self.handle_cancel(run, requested_by)
            }
            DispatchEvent::Shutdown => {}
        }
    }

    fn handle_nightly(&mut self, project: &str) {
        if self.registry.project(project).is_none() {
            warn!(project, "nightly trigger for unknown project");
            return;
        }
        let firing = TriggerFiring::nightly(project);
        let targets = self.registry.project_target_names(project);
        let count = targets.len();
        for qualified in targets {
            let run = BuildRun::queued(&qualified, project, firing.id);
            if let Err(e) = self.tracker.record(run) {
                warn!(target = %qualified, error = %e, "failed to record nightly run");
            }
        }
        info!(project, firing = %firing.id, runs = count, "nightly firing queued runs");
        self.tick();
    }

    fn handle_force(&mut self, targets: Vec<String>, requested_by: Option<String>) {
        let firing = TriggerFiring::forced(requested_by.clone());
        let mut queued = 0usize;
        for name in targets {
            let Some(target) = self.registry.target(&name) else {
                warn!(target = %name, "force build for unknown target");
                continue;
            };
            if !self.force_policy.allows(&target.project) {
                warn!(
                    project = %target.project,
                    target = %name,
                    requested_by = ?requested_by,
                    "force build denied by policy"
                );
                continue;
            }
            let run = BuildRun::queued(&name, &target.project, firing.id);
            if let Err(e) = self.tracker.record(run) {
                warn!(target = %name, error = %e, "failed to record forced run");
                continue;
            }
            queued += 1;
        }
        if queued > 0 {
            info!(
                firing = %firing.id,
                runs = queued,
                requested_by = ?requested_by,
                "force firing queued runs"
            );
            self.tick();
        }
    }

    /// Assign queued runs to idle capable workers, oldest run first.
    /// Tie-break between eligible idle workers: lowest hostname.
    fn tick(&mut self) {
        for id in self.tracker.queued() {
            let Some(target_name) = self.tracker.get(id).map(|r| r.target.clone()) else {
                continue;
            };
            let Some(target) = self.registry.target(&target_name) else {
                // Catalog is static, so a queued run can only reference a
                // known target; guard anyway rather than drop the run.
                warn!(run = %id, target = %target_name, "queued run references unknown target");
                continue;
            };

            let hostname = self
                .pool
                .find_eligible(target)
                .into_iter()
                .find(|w| w.status.is_available())
                .map(|w| w.hostname.clone());
            let Some(hostname) = hostname else {
                debug!(run = %id, target = %target_name, "no eligible idle worker, run stays queued");
                continue;
            };

            if !self.pool.acquire(&hostname) {
                continue;
            }
            if let Err(e) = self.tracker.assign(id, &hostname) {
                warn!(run = %id, error = %e, "assignment rejected, releasing worker");
                self.pool.release(&hostname);
                continue;
            }

            info!(run = %id, target = %target_name, worker = %hostname, "dispatching run");
            let order = DispatchOrder {
                run_id: id,
                target: target_name,
                repo_url: target.repo_url.clone(),
                branch: target.branch.clone(),
                steps: target.steps.clone(),
                worker: hostname,
            };
            let transport = Arc::clone(&self.transport);
            let events = self.events.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.dispatch(order).await {
                    warn!(run = %id, error = %e, "dispatch failed, synthesizing failure");
                    let _ = events.send(DispatchEvent::WorkerCompleted {
                        run: id,
                        outcome: CompletionOutcome::Failure(format!("dispatch failed: {e}")),
                    });
                }
            });
        }
    }

    fn handle_ack(&mut self, id: RunId) {
        if let Err(e) = self.tracker.mark_running(id) {
            warn!(run = %id, error = %e, "ignoring worker start ack");
        }
    }

    fn handle_completion(&mut self, id: RunId, outcome: CompletionOutcome) {
        let Some(run) = self.tracker.get(id) else {
            warn!(run = %id, "completion for unknown run");
            return;
        };
        if run.state.is_terminal() {
            // A cancelled or worker-lost run can still see its original
            // completion arrive later.
            debug!(run = %id, state = %run.state, "late completion ignored");
            return;
        }
        let worker = run.worker.clone();

        let (state, failure) = match outcome {
            CompletionOutcome::Success => (RunState::Succeeded, None),
            CompletionOutcome::Failure(reason) => {
                (RunState::Failed, Some(FailureReason::Execution(reason)))
            }
            CompletionOutcome::Cancelled => (RunState::Cancelled, None),
        };
        if let Err(e) = self.tracker.finish(id, state, failure) {
            warn!(run = %id, error = %e, "completion rejected");
            return;
        }
        info!(run = %id, state = %state, "run completed");

        if let Some(hostname) = worker {
            self.pool.release(&hostname);
        }
        self.publish_report(id);
        self.tick();
    }

    fn handle_disconnect(&mut self, hostname: &str) {
        if let Err(e) = self.pool.mark_disconnected(hostname) {
            warn!(hostname, error = %e, "disconnect for unknown worker");
            return;
        }
        info!(hostname, "worker disconnected");

        // Fail everything in flight on that worker. The worker stays out of
        // the idle set until reconnection is confirmed.
        for id in self.tracker.active_on_worker(hostname) {
            match self
                .tracker
                .finish(id, RunState::Failed, Some(FailureReason::WorkerLost))
            {
                Ok(()) => {
                    warn!(run = %id, hostname, "run failed: worker lost");
                    self.publish_report(id);
                }
                Err(e) => warn!(run = %id, error = %e, "could not fail run for lost worker"),
            }
        }
    }

    fn handle_reconnect(&mut self, hostname: &str) {
        match self.pool.mark_reconnected(hostname) {
            Ok(()) => {
                info!(hostname, "worker reconnected");
                self.tick();
            }
            Err(e) => warn!(hostname, error = %e, "reconnect for unknown worker"),
        }
    }

    fn handle_cancel(&mut self, id: RunId, requested_by: Option<String>) {
        let Some(run) = self.tracker.get(id) else {
            warn!(run = %id, "cancel for unknown run");
            return;
        };
        match run.state {
            RunState::Queued => {
                if let Err(e) = self.tracker.finish(id, RunState::Cancelled, None) {
                    warn!(run = %id, error = %e, "cancel rejected");
                    return;
                }
                info!(run = %id, requested_by = ?requested_by, "queued run cancelled");
                self.publish_report(id);
            }
            RunState::Assigned | RunState::Running => {
                let Some(worker) = run.worker.clone() else {
                    warn!(run = %id, "in-flight run without worker, cannot signal cancel");
                    return;
                };
                if let Err(e) = self.tracker.request_cancel(id) {
                    warn!(run = %id, error = %e, "cancel request not recorded");
                    return;
                }
                info!(run = %id, worker = %worker, requested_by = ?requested_by, "cancellation signalled");
                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.cancel(id, &worker).await {
                        warn!(run = %id, error = %e, "cancel signal failed");
                    }
                });
            }
            _ => debug!(run = %id, "cancel for terminal run ignored"),
        }
    }

    /// Fan a finished run's report out to the sinks; delivery is async and
    /// failures only log.
    fn publish_report(&self, id: RunId) {
        let Some(run) = self.tracker.get(id) else {
            return;
        };
        let report = RunReport::from_run(run);
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let report = report.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&report).await {
                    warn!(run = %report.run_id, error = %e, "report delivery failed");
                }
            });
        }
    }

    // Read-only snapshots for reporting. Always copies, never live
    // references into loop state.

    pub fn target_statuses(&self) -> Vec<TargetStatus> {
        self.registry
            .targets()
            .iter()
            .map(|t| {
                let qualified = t.qualified_name();
                let latest = self.tracker.latest(&qualified);
                TargetStatus {
                    target: qualified,
                    state: latest.map(|r| r.state),
                    worker: latest.and_then(|r| r.worker.clone()),
                }
            })
            .collect()
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.pool.snapshot()
    }

    pub fn history(&self, target: &str) -> Vec<BuildRun> {
        self.tracker.history(target).cloned().collect()
    }

    pub fn queued_len(&self) -> usize {
        self.tracker.queued().len()
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
