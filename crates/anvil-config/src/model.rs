//! Configuration file structures.
//!
//! One struct per JSON entity, with recognized options enumerated explicitly
//! rather than carried as free-form maps.

use anvil_core::policy::ForcePolicy;
use anvil_core::project::{ParameterAxis, Project, TargetTemplate};
use anvil_core::worker::Worker;
use serde::{Deserialize, Serialize};

/// One worker definition (`workers/*.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub hostname: String,
    pub password: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl WorkerConfig {
    pub fn into_worker(self) -> Worker {
        Worker::new(self.hostname, self.password, self.features)
    }
}

/// One substitution axis: a pattern and the values it expands to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub pattern: String,
    pub values: Vec<String>,
}

/// One parameterized build configuration of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetTemplateConfig {
    pub name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub steps: Vec<Vec<String>>,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    /// Capability tags a worker must declare to build these targets.
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_branch() -> String {
    "master".to_string()
}

/// One project definition (`projects/*.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub url: String,
    pub configurations: Vec<TargetTemplateConfig>,
}

impl ProjectConfig {
    pub fn into_project(self) -> Project {
        Project {
            name: self.name,
            url: self.url,
            templates: self
                .configurations
                .into_iter()
                .map(|c| TargetTemplate {
                    name: c.name,
                    branch: c.branch,
                    steps: c.steps,
                    parameters: c
                        .parameters
                        .into_iter()
                        .map(|p| ParameterAxis {
                            pattern: p.pattern,
                            values: p.values,
                        })
                        .collect(),
                    required_capabilities: c.features.into_iter().collect(),
                })
                .collect(),
        }
    }
}

/// One report sink definition (`reports/*.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportSinkConfig {
    Email {
        smtp_host: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        from: String,
        to: Vec<String>,
    },
    Http {
        url: String,
    },
    Log,
}

fn default_smtp_port() -> u16 {
    587
}

/// Nightly trigger time, applied to every project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NightlyConfig {
    #[serde(default)]
    pub hour: u32,
    #[serde(default = "default_minute")]
    pub minute: u32,
}

fn default_minute() -> u32 {
    52
}

impl Default for NightlyConfig {
    fn default() -> Self {
        Self {
            hour: 0,
            minute: default_minute(),
        }
    }
}

/// Force policy as written in `master.json`: `"*"` or a project list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForcePolicyConfig {
    Pattern(String),
    Projects(Vec<String>),
}

impl ForcePolicyConfig {
    /// Interpret the raw value; `Err` carries the offending pattern.
    pub fn resolve(&self) -> Result<ForcePolicy, String> {
        match self {
            ForcePolicyConfig::Pattern(p) if p == "*" => Ok(ForcePolicy::All),
            ForcePolicyConfig::Pattern(p) => Err(p.clone()),
            ForcePolicyConfig::Projects(names) => Ok(ForcePolicy::AllowList(
                names.iter().cloned().collect(),
            )),
        }
    }
}

/// Overall master settings (`master.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub nightly: NightlyConfig,
    #[serde(default)]
    pub force: Option<ForcePolicyConfig>,
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

fn default_title() -> String {
    "anvil".to_string()
}

fn default_worker_port() -> u16 {
    9000
}

fn default_status_port() -> u16 {
    8000
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            nightly: NightlyConfig::default(),
            force: None,
            worker_port: default_worker_port(),
            status_port: default_status_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn project_config_defaults() {
        let json = r#"{
            "name": "riscv-gcc",
            "url": "https://example.com/riscv-gcc.git",
            "configurations": [
                {"name": "gcc-ARCH", "steps": [["make", "ARCH"]]}
            ]
        }"#;
        let config: ProjectConfig = serde_json::from_str(json).unwrap();
        let project = config.into_project();
        assert_eq!(project.templates[0].branch, "master");
        assert!(project.templates[0].parameters.is_empty());
        assert!(project.templates[0].required_capabilities.is_empty());
    }

    #[test]
    fn report_sink_tagged_parse() {
        let json = r#"{"type": "http", "url": "https://example.com/hook"}"#;
        let sink: ReportSinkConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(sink, ReportSinkConfig::Http { .. }));

        let json = r#"{"type": "email", "smtp_host": "mail.example.com",
                       "from": "anvil@example.com", "to": ["ops@example.com"]}"#;
        let sink: ReportSinkConfig = serde_json::from_str(json).unwrap();
        match sink {
            ReportSinkConfig::Email { smtp_port, .. } => assert_eq!(smtp_port, 587),
            other => panic!("unexpected sink: {other:?}"),
        }
    }

    #[test]
    fn force_policy_star_and_list() {
        let star: ForcePolicyConfig = serde_json::from_str(r#""*""#).unwrap();
        assert_eq!(star.resolve().unwrap(), ForcePolicy::All);

        let list: ForcePolicyConfig = serde_json::from_str(r#"["riscv-gcc"]"#).unwrap();
        assert!(list.resolve().unwrap().allows("riscv-gcc"));

        let bad: ForcePolicyConfig = serde_json::from_str(r#""riscv-*""#).unwrap();
        assert!(bad.resolve().is_err());
    }
}
