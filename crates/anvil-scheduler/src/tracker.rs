//! Build run bookkeeping.

use anvil_core::ids::RunId;
use anvil_core::run::{BuildRun, FailureReason, RunState};
use anvil_core::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use tracing::error;

/// In-flight and completed build runs, keyed by run id.
///
/// Every state change goes through one legality check against the run state
/// machine; an illegal transition is logged and rejected with the run left
/// in its last-known-good state. Terminal runs are immutable.
#[derive(Debug, Default)]
pub struct RunTracker {
    runs: HashMap<RunId, BuildRun>,
    /// Insertion order; the queued scan walks this FIFO.
    order: Vec<RunId>,
    by_target: HashMap<String, Vec<RunId>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, run: BuildRun) -> Result<()> {
        if self.runs.contains_key(&run.id) {
            return Err(Error::Internal(format!("run {} recorded twice", run.id)));
        }
        self.order.push(run.id);
        self.by_target
            .entry(run.target.clone())
            .or_default()
            .push(run.id);
        self.runs.insert(run.id, run);
        Ok(())
    }

    pub fn get(&self, id: RunId) -> Option<&BuildRun> {
        self.runs.get(&id)
    }

    /// Queued -> Assigned, binding the run to a worker.
    pub fn assign(&mut self, id: RunId, worker: &str) -> Result<()> {
        let run = self.transition(id, RunState::Assigned)?;
        run.worker = Some(worker.to_string());
        Ok(())
    }

    /// Assigned -> Running, on worker start acknowledgement.
    pub fn mark_running(&mut self, id: RunId) -> Result<()> {
        let run = self.transition(id, RunState::Running)?;
        run.started_at = Some(Utc::now());
        Ok(())
    }

    /// Move a run to a terminal state.
    pub fn finish(
        &mut self,
        id: RunId,
        state: RunState,
        failure: Option<FailureReason>,
    ) -> Result<()> {
        if !state.is_terminal() {
            return Err(Error::Internal(format!(
                "finish called with non-terminal state {state}"
            )));
        }
        let run = self.transition(id, state)?;
        run.failure = failure;
        run.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Flag an in-flight run as cancel-requested. The terminal state is
    /// decided later by the worker's acknowledgement or disconnect.
    pub fn request_cancel(&mut self, id: RunId) -> Result<()> {
        let run = self
            .runs
            .get_mut(&id)
            .ok_or(Error::RunNotFound(id))?;
        run.cancel_requested = true;
        Ok(())
    }

    fn transition(&mut self, id: RunId, to: RunState) -> Result<&mut BuildRun> {
        let run = self.runs.get_mut(&id).ok_or(Error::RunNotFound(id))?;
        if !run.state.can_transition_to(to) {
            error!(
                run = %id,
                target = %run.target,
                from = %run.state,
                to = %to,
                "invalid run state transition rejected"
            );
            return Err(Error::InvalidTransition {
                from: run.state,
                to,
            });
        }
        run.state = to;
        Ok(run)
    }

    /// Queued runs, oldest first.
    pub fn queued(&self) -> Vec<RunId> {
        self.order
            .iter()
            .filter(|id| {
                self.runs
                    .get(id)
                    .is_some_and(|r| r.state == RunState::Queued)
            })
            .copied()
            .collect()
    }

    /// Runs currently assigned to or running on a worker.
    pub fn active_on_worker(&self, hostname: &str) -> Vec<RunId> {
        self.order
            .iter()
            .filter(|id| {
                self.runs.get(id).is_some_and(|r| {
                    matches!(r.state, RunState::Assigned | RunState::Running)
                        && r.worker.as_deref() == Some(hostname)
                })
            })
            .copied()
            .collect()
    }

    /// Past and present runs of a target, newest first.
    pub fn history<'a>(&'a self, target: &str) -> impl Iterator<Item = &'a BuildRun> {
        self.by_target
            .get(target)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .rev()
            .filter_map(|id| self.runs.get(id))
    }

    /// Most recent run of a target.
    pub fn latest(&self, target: &str) -> Option<&BuildRun> {
        self.history(target).next()
    }

    /// Retention hook: per target, drop all but the newest `keep_last`
    /// terminal runs. In-flight runs are never pruned.
    pub fn prune(&mut self, keep_last: usize) {
        let mut removed = Vec::new();
        for ids in self.by_target.values_mut() {
            let terminal: Vec<RunId> = ids
                .iter()
                .filter(|id| {
                    self.runs
                        .get(id)
                        .is_some_and(|r| r.state.is_terminal())
                })
                .copied()
                .collect();
            if terminal.len() <= keep_last {
                continue;
            }
            let drop_set: std::collections::HashSet<RunId> =
                terminal[..terminal.len() - keep_last].iter().copied().collect();
            ids.retain(|id| !drop_set.contains(id));
            removed.extend(drop_set);
        }
        for id in removed {
            self.runs.remove(&id);
            self.order.retain(|other| *other != id);
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::ids::FiringId;

    fn queued_run(target: &str) -> BuildRun {
        BuildRun::queued(target, "proj", FiringId::new())
    }

    #[test]
    fn legal_path_to_success() {
        let mut tracker = RunTracker::new();
        let run = queued_run("proj@a");
        let id = run.id;
        tracker.record(run).unwrap();

        tracker.assign(id, "w.example.com").unwrap();
        tracker.mark_running(id).unwrap();
        tracker.finish(id, RunState::Succeeded, None).unwrap();

        let run = tracker.get(id).unwrap();
        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.worker.as_deref(), Some("w.example.com"));
        assert!(run.started_at.is_some());
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn illegal_transition_leaves_run_unchanged() {
        let mut tracker = RunTracker::new();
        let run = queued_run("proj@a");
        let id = run.id;
        tracker.record(run).unwrap();

        // Queued -> Succeeded skips the whole machine.
        let err = tracker.finish(id, RunState::Succeeded, None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(tracker.get(id).unwrap().state, RunState::Queued);
        assert!(tracker.get(id).unwrap().completed_at.is_none());
    }

    #[test]
    fn terminal_runs_are_immutable() {
        let mut tracker = RunTracker::new();
        let run = queued_run("proj@a");
        let id = run.id;
        tracker.record(run).unwrap();
        tracker.finish(id, RunState::Cancelled, None).unwrap();

        assert!(tracker.assign(id, "w").is_err());
        assert!(tracker
            .finish(id, RunState::Failed, Some(FailureReason::WorkerLost))
            .is_err());
        assert_eq!(tracker.get(id).unwrap().state, RunState::Cancelled);
        assert!(tracker.get(id).unwrap().failure.is_none());
    }

    #[test]
    fn queued_is_fifo() {
        let mut tracker = RunTracker::new();
        let first = queued_run("proj@a");
        let second = queued_run("proj@b");
        let (first_id, second_id) = (first.id, second.id);
        tracker.record(first).unwrap();
        tracker.record(second).unwrap();

        assert_eq!(tracker.queued(), vec![first_id, second_id]);
        tracker.assign(first_id, "w").unwrap();
        assert_eq!(tracker.queued(), vec![second_id]);
    }

    #[test]
    fn history_is_newest_first() {
        let mut tracker = RunTracker::new();
        let old = queued_run("proj@a");
        let new = queued_run("proj@a");
        let other = queued_run("proj@b");
        let (old_id, new_id) = (old.id, new.id);
        tracker.record(old).unwrap();
        tracker.record(other).unwrap();
        tracker.record(new).unwrap();

        let ids: Vec<RunId> = tracker.history("proj@a").map(|r| r.id).collect();
        assert_eq!(ids, vec![new_id, old_id]);
        assert_eq!(tracker.latest("proj@a").unwrap().id, new_id);
        assert!(tracker.latest("proj@c").is_none());
    }

    #[test]
    fn active_on_worker_tracks_assignment() {
        let mut tracker = RunTracker::new();
        let run = queued_run("proj@a");
        let id = run.id;
        tracker.record(run).unwrap();
        assert!(tracker.active_on_worker("w").is_empty());

        tracker.assign(id, "w").unwrap();
        assert_eq!(tracker.active_on_worker("w"), vec![id]);
        tracker.mark_running(id).unwrap();
        assert_eq!(tracker.active_on_worker("w"), vec![id]);

        tracker.finish(id, RunState::Succeeded, None).unwrap();
        assert!(tracker.active_on_worker("w").is_empty());
    }

    #[test]
    fn prune_keeps_newest_terminal_and_all_active() {
        let mut tracker = RunTracker::new();
        let mut terminal_ids = Vec::new();
        for _ in 0..3 {
            let run = queued_run("proj@a");
            let id = run.id;
            tracker.record(run).unwrap();
            tracker.finish(id, RunState::Cancelled, None).unwrap();
            terminal_ids.push(id);
        }
        let active = queued_run("proj@a");
        let active_id = active.id;
        tracker.record(active).unwrap();

        tracker.prune(1);
        assert!(tracker.get(terminal_ids[0]).is_none());
        assert!(tracker.get(terminal_ids[1]).is_none());
        assert!(tracker.get(terminal_ids[2]).is_some());
        assert!(tracker.get(active_id).is_some());
        assert_eq!(tracker.len(), 2);
    }
}
