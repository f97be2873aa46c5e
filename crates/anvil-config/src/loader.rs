//! Directory loader with load-time validation.

use crate::model::{
    MasterConfig, ProjectConfig, ReportSinkConfig, TargetTemplateConfig, WorkerConfig,
};
use anvil_core::policy::ForcePolicy;
use anvil_core::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything read from one configuration directory, validated.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub master: MasterConfig,
    pub workers: Vec<WorkerConfig>,
    pub projects: Vec<ProjectConfig>,
    pub sinks: Vec<ReportSinkConfig>,
    pub force_policy: ForcePolicy,
}

/// Load and validate a configuration directory.
///
/// Any malformed file, missing required field, duplicate hostname or project
/// name, empty parameter axis, or invalid substitution pattern is fatal: the
/// process refuses to start on a broken configuration.
pub fn load(dir: &Path) -> Result<LoadedConfig> {
    let master_path = dir.join("master.json");
    let master: MasterConfig = if master_path.is_file() {
        read_json(&master_path)?
    } else {
        info!(path = %master_path.display(), "no master.json, using defaults");
        MasterConfig::default()
    };
    validate_master(&master_path, &master)?;

    let mut workers = Vec::new();
    for path in json_files(&dir.join("workers"))? {
        info!(file = %path.display(), "loading worker config");
        let worker: WorkerConfig = read_json(&path)?;
        validate_worker(&path, &worker)?;
        workers.push(worker);
    }

    let mut projects = Vec::new();
    for path in json_files(&dir.join("projects"))? {
        info!(file = %path.display(), "loading project config");
        let project: ProjectConfig = read_json(&path)?;
        validate_project(&path, &project)?;
        projects.push(project);
    }

    let mut sinks = Vec::new();
    for path in json_files(&dir.join("reports"))? {
        info!(file = %path.display(), "loading report sink config");
        let sink: ReportSinkConfig = read_json(&path)?;
        validate_sink(&path, &sink)?;
        sinks.push(sink);
    }

    check_duplicates(&workers, &projects)?;
    let force_policy = resolve_force_policy(&master_path, &master, &projects)?;

    if workers.is_empty() {
        warn!("no workers configured; every run will stay queued");
    }
    if projects.is_empty() {
        warn!("no projects configured");
    }

    Ok(LoadedConfig {
        master,
        workers,
        projects,
        sinks,
        force_policy,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        file: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| Error::Config {
        file: path.display().to_string(),
        message: e.to_string(),
    })
}

/// The `.json` files of a directory, sorted by name for deterministic load
/// order. A missing directory is treated as empty.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn config_err(file: &Path, message: impl Into<String>) -> Error {
    Error::Config {
        file: file.display().to_string(),
        message: message.into(),
    }
}

fn validate_master(file: &Path, master: &MasterConfig) -> Result<()> {
    if master.nightly.hour > 23 {
        return Err(config_err(
            file,
            format!("nightly.hour out of range: {}", master.nightly.hour),
        ));
    }
    if master.nightly.minute > 59 {
        return Err(config_err(
            file,
            format!("nightly.minute out of range: {}", master.nightly.minute),
        ));
    }
    Ok(())
}

fn validate_worker(file: &Path, worker: &WorkerConfig) -> Result<()> {
    if worker.hostname.is_empty() {
        return Err(config_err(file, "hostname must not be empty"));
    }
    if worker.password.is_empty() {
        return Err(config_err(file, "password must not be empty"));
    }
    Ok(())
}

fn validate_project(file: &Path, project: &ProjectConfig) -> Result<()> {
    if project.name.is_empty() {
        return Err(config_err(file, "name must not be empty"));
    }
    if project.url.is_empty() {
        return Err(config_err(file, "url must not be empty"));
    }
    let mut seen = BTreeSet::new();
    for template in &project.configurations {
        validate_template(file, project, template)?;
        if !seen.insert(template.name.as_str()) {
            return Err(config_err(
                file,
                format!("duplicate configuration name {:?}", template.name),
            ));
        }
    }
    Ok(())
}

fn validate_template(
    file: &Path,
    project: &ProjectConfig,
    template: &TargetTemplateConfig,
) -> Result<()> {
    let context = format!("project {:?} configuration {:?}", project.name, template.name);
    if template.name.is_empty() {
        return Err(config_err(file, "configuration name must not be empty"));
    }
    if template.steps.is_empty() {
        return Err(config_err(file, format!("{context}: steps must not be empty")));
    }
    for step in &template.steps {
        if step.is_empty() {
            return Err(config_err(
                file,
                format!("{context}: every step needs at least one argument"),
            ));
        }
    }
    for axis in &template.parameters {
        if axis.pattern.is_empty() {
            return Err(config_err(
                file,
                format!("{context}: parameter pattern must not be empty"),
            ));
        }
        if let Err(e) = Regex::new(&axis.pattern) {
            return Err(config_err(
                file,
                format!("{context}: invalid pattern {:?}: {e}", axis.pattern),
            ));
        }
        if axis.values.is_empty() {
            return Err(config_err(
                file,
                format!(
                    "{context}: parameter {:?} has an empty value list",
                    axis.pattern
                ),
            ));
        }
    }
    Ok(())
}

fn validate_sink(file: &Path, sink: &ReportSinkConfig) -> Result<()> {
    match sink {
        ReportSinkConfig::Email {
            smtp_host, from, to, ..
        } => {
            if smtp_host.is_empty() {
                return Err(config_err(file, "smtp_host must not be empty"));
            }
            if from.is_empty() {
                return Err(config_err(file, "from must not be empty"));
            }
            if to.is_empty() {
                return Err(config_err(file, "to must list at least one recipient"));
            }
        }
        ReportSinkConfig::Http { url } => {
            if url.is_empty() {
                return Err(config_err(file, "url must not be empty"));
            }
        }
        ReportSinkConfig::Log => {}
    }
    Ok(())
}

fn check_duplicates(workers: &[WorkerConfig], projects: &[ProjectConfig]) -> Result<()> {
    let mut hostnames = BTreeSet::new();
    for worker in workers {
        if !hostnames.insert(worker.hostname.as_str()) {
            return Err(Error::DuplicateWorker(worker.hostname.clone()));
        }
    }
    let mut names = BTreeSet::new();
    for project in projects {
        if !names.insert(project.name.as_str()) {
            return Err(Error::Config {
                file: format!("projects/{}", project.name),
                message: format!("duplicate project name {:?}", project.name),
            });
        }
    }
    Ok(())
}

fn resolve_force_policy(
    file: &Path,
    master: &MasterConfig,
    projects: &[ProjectConfig],
) -> Result<ForcePolicy> {
    let Some(raw) = &master.force else {
        return Ok(ForcePolicy::None);
    };
    let policy = raw
        .resolve()
        .map_err(|pattern| config_err(file, format!("force must be \"*\" or a project list, got {pattern:?}")))?;
    if let ForcePolicy::AllowList(names) = &policy {
        let known: BTreeSet<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        for name in names {
            if !known.contains(name.as_str()) {
                return Err(config_err(
                    file,
                    format!("force allow-list names unknown project {name:?}"),
                ));
            }
        }
    }
    Ok(policy)
}
