//! Project, target template, and expanded target types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One substitution axis of a target template: a pattern with the ordered
/// list of values it may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub pattern: String,
    pub values: Vec<String>,
}

/// A parameterized description of a buildable unit before axis expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetTemplate {
    /// Name template; axis patterns are substituted into it.
    pub name: String,
    pub branch: String,
    /// Ordered build steps, each an ordered argv token list.
    pub steps: Vec<Vec<String>>,
    /// Axes in declaration order. Axis i varies slower than axis i+1.
    pub parameters: Vec<ParameterAxis>,
    /// Capability tags a worker must declare to build this template's
    /// targets. Empty means every worker is eligible.
    pub required_capabilities: BTreeSet<String>,
}

/// A project: a source repository and the templates built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub url: String,
    pub templates: Vec<TargetTemplate>,
}

/// One fully resolved, concrete buildable unit after expansion.
///
/// Immutable after expansion; name and steps have all substitutions applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub project: String,
    pub repo_url: String,
    pub name: String,
    pub branch: String,
    pub steps: Vec<Vec<String>>,
    pub required_capabilities: BTreeSet<String>,
}

impl Target {
    /// Fully-qualified target identifier: `project@targetname`.
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.project, self.name)
    }
}
