//! Trigger sources: the nightly timer and forced builds.

use anvil_core::events::DispatchEvent;
use anvil_core::ids::FiringId;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A recurring time-based trigger: fires once per 24h period at a fixed
/// hour:minute, for every target of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightlySchedule {
    hour: u32,
    minute: u32,
}

impl NightlySchedule {
    /// Hour and minute are validated at config load; this re-checks so an
    /// out-of-range schedule cannot exist.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// The next firing instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour, self.minute, 0)
            .expect("validated hour:minute");
        let candidate = Utc.from_utc_datetime(&today);
        if candidate > now {
            candidate
        } else {
            candidate + ChronoDuration::days(1)
        }
    }
}

/// One trigger firing: the unit that a batch of queued runs belongs to.
/// Firings are independent; a nightly firing while a previous batch is
/// unfinished simply produces a second batch.
#[derive(Debug, Clone)]
pub struct TriggerFiring {
    pub id: FiringId,
    pub kind: TriggerKind,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum TriggerKind {
    Nightly { project: String },
    Forced { requested_by: Option<String> },
}

impl TriggerFiring {
    pub fn nightly(project: &str) -> Self {
        Self {
            id: FiringId::new(),
            kind: TriggerKind::Nightly {
                project: project.to_string(),
            },
            fired_at: Utc::now(),
        }
    }

    pub fn forced(requested_by: Option<String>) -> Self {
        Self {
            id: FiringId::new(),
            kind: TriggerKind::Forced { requested_by },
            fired_at: Utc::now(),
        }
    }
}

/// Timer task feeding `NightlyDue` events into the dispatch loop, one per
/// project per firing, until shutdown.
pub fn spawn_nightly(
    schedule: NightlySchedule,
    projects: Vec<String>,
    events: mpsc::UnboundedSender<DispatchEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            hour = schedule.hour,
            minute = schedule.minute,
            projects = projects.len(),
            "nightly trigger armed"
        );
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(0));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!(at = %next, "nightly trigger fired");
                    for project in &projects {
                        if events
                            .send(DispatchEvent::NightlyDue {
                                project: project.clone(),
                            })
                            .is_err()
                        {
                            warn!("dispatch loop gone, stopping nightly trigger");
                            return;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown, otherwise this
                    // arm would resolve immediately on every iteration.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("nightly trigger shutting down");
                        return;
                    }
                }
            }
        }
    })
}
