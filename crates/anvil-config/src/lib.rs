//! Configuration model and loader.
//!
//! The master reads one configuration directory at startup:
//!
//! ```text
//! <config>/master.json      overall settings (nightly time, force policy)
//! <config>/workers/*.json   one worker definition per file
//! <config>/projects/*.json  one project definition per file
//! <config>/reports/*.json   one report sink per file
//! ```
//!
//! Loading is the only place configuration errors can surface: every file is
//! validated here, all failures are fatal, and the rest of the system works
//! on immutable registries built from the result.

pub mod loader;
pub mod model;

pub use loader::{load, LoadedConfig};
pub use model::{
    MasterConfig, NightlyConfig, ParameterConfig, ProjectConfig, ReportSinkConfig,
    TargetTemplateConfig, WorkerConfig,
};
