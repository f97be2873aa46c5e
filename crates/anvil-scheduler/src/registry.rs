//! The static target catalog.

use crate::expand;
use anvil_core::project::{Project, Target};
use anvil_core::{Error, Result};
use std::collections::HashMap;
use tracing::info;

/// Immutable registry of projects and their expanded targets, built once
/// during the initialization phase. All lookups after startup are reads.
#[derive(Debug)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
    targets: Vec<Target>,
    by_qualified_name: HashMap<String, usize>,
}

impl ProjectRegistry {
    /// Expand every template of every project into the target catalog.
    ///
    /// Catalog order is project load order, then template declaration order,
    /// then expansion order. Two targets resolving to the same qualified
    /// name is a startup error.
    pub fn build(projects: Vec<Project>) -> Result<Self> {
        let mut targets = Vec::new();
        let mut by_qualified_name = HashMap::new();

        for project in &projects {
            let before = targets.len();
            for template in &project.templates {
                for target in expand::expand(project, template)? {
                    let qualified = target.qualified_name();
                    if by_qualified_name
                        .insert(qualified.clone(), targets.len())
                        .is_some()
                    {
                        return Err(Error::DuplicateTarget(qualified));
                    }
                    targets.push(target);
                }
            }
            info!(
                project = %project.name,
                targets = targets.len() - before,
                "expanded project"
            );
        }

        Ok(Self {
            projects,
            targets,
            by_qualified_name,
        })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, qualified_name: &str) -> Option<&Target> {
        self.by_qualified_name
            .get(qualified_name)
            .map(|&idx| &self.targets[idx])
    }

    pub fn project_targets<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a Target> {
        self.targets.iter().filter(move |t| t.project == project)
    }

    /// Fully-qualified names of a project's targets, for scheduler entries
    /// and report collaborators.
    pub fn project_target_names(&self, project: &str) -> Vec<String> {
        self.project_targets(project)
            .map(Target::qualified_name)
            .collect()
    }
}
