//! Build worker types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A remote build worker known to the pool.
///
/// Created from static configuration at startup; only the dispatch loop and
/// the connectivity collaborator mutate its status afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub hostname: String,
    pub credential: String,
    /// Declared capability tags (architecture/toolchain features).
    pub capabilities: BTreeSet<String>,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(
        hostname: impl Into<String>,
        credential: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            credential: credential.into(),
            capabilities: capabilities.into_iter().collect(),
            status: WorkerStatus::Idle,
            registered_at: Utc::now(),
        }
    }

    /// Whether this worker's capabilities cover the given requirements.
    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Disconnected,
}

impl WorkerStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerStatus::Idle)
    }
}
