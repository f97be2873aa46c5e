//! Force-build policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which projects an operator may force-build.
///
/// Configured as `"*"` (all), an explicit project allow-list, or absent
/// (none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcePolicy {
    All,
    AllowList(BTreeSet<String>),
    None,
}

impl ForcePolicy {
    pub fn allows(&self, project: &str) -> bool {
        match self {
            ForcePolicy::All => true,
            ForcePolicy::AllowList(projects) => projects.contains(project),
            ForcePolicy::None => false,
        }
    }
}

impl Default for ForcePolicy {
    fn default() -> Self {
        ForcePolicy::None
    }
}
