//! Worker pool: registration, eligibility matching, status transitions.

use anvil_core::project::Target;
use anvil_core::worker::{Worker, WorkerStatus};
use anvil_core::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// All known workers, keyed by hostname.
///
/// Owned and mutated only by the dispatch loop (status transitions) and the
/// connectivity collaborator's events routed through it.
#[derive(Debug, Default)]
pub struct WorkerPool {
    // BTreeMap keeps every iteration in hostname order, which makes
    // eligibility results and tie-breaks deterministic.
    workers: BTreeMap<String, Worker>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker definition at startup.
    pub fn register(&mut self, worker: Worker) -> Result<()> {
        if self.workers.contains_key(&worker.hostname) {
            return Err(Error::DuplicateWorker(worker.hostname));
        }
        info!(hostname = %worker.hostname, capabilities = ?worker.capabilities, "registered worker");
        self.workers.insert(worker.hostname.clone(), worker);
        Ok(())
    }

    pub fn get(&self, hostname: &str) -> Option<&Worker> {
        self.workers.get(hostname)
    }

    /// Workers whose capability set covers the target's requirements,
    /// in hostname order. Disconnected workers are excluded; a target with
    /// no requirements matches every connected worker.
    pub fn find_eligible(&self, target: &Target) -> Vec<&Worker> {
        self.workers
            .values()
            .filter(|w| w.status != WorkerStatus::Disconnected)
            .filter(|w| w.covers(&target.required_capabilities))
            .collect()
    }

    /// Atomically transition an Idle worker to Busy. Returns false without
    /// blocking if the worker is not Idle; the caller picks another
    /// candidate.
    pub fn acquire(&mut self, hostname: &str) -> bool {
        match self.workers.get_mut(hostname) {
            Some(worker) if worker.status == WorkerStatus::Idle => {
                worker.status = WorkerStatus::Busy;
                true
            }
            _ => false,
        }
    }

    /// Busy -> Idle. Idempotent when already Idle (duplicate release after a
    /// cancelled run); a Disconnected worker stays Disconnected until its
    /// reconnection is confirmed.
    pub fn release(&mut self, hostname: &str) {
        match self.workers.get_mut(hostname) {
            Some(worker) => match worker.status {
                WorkerStatus::Busy => worker.status = WorkerStatus::Idle,
                WorkerStatus::Idle => {
                    debug!(hostname, "release of an already idle worker");
                }
                WorkerStatus::Disconnected => {
                    debug!(hostname, "release ignored for disconnected worker");
                }
            },
            None => warn!(hostname, "release of unknown worker"),
        }
    }

    pub fn mark_disconnected(&mut self, hostname: &str) -> Result<()> {
        let worker = self
            .workers
            .get_mut(hostname)
            .ok_or_else(|| Error::WorkerNotFound(hostname.to_string()))?;
        worker.status = WorkerStatus::Disconnected;
        Ok(())
    }

    pub fn mark_reconnected(&mut self, hostname: &str) -> Result<()> {
        let worker = self
            .workers
            .get_mut(hostname)
            .ok_or_else(|| Error::WorkerNotFound(hostname.to_string()))?;
        worker.status = WorkerStatus::Idle;
        Ok(())
    }

    /// Cloned snapshot for report collaborators; never a live reference.
    pub fn snapshot(&self) -> Vec<Worker> {
        self.workers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
