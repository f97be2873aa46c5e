//! Error types for Anvil.

use crate::ids::RunId;
use crate::run::RunState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors: fatal at load time.
    #[error("configuration error in {file}: {message}")]
    Config { file: String, message: String },

    #[error("duplicate worker hostname: {0}")]
    DuplicateWorker(String),

    #[error("duplicate target name after expansion: {0}")]
    DuplicateTarget(String),

    // Lookup errors
    #[error("unknown worker: {0}")]
    WorkerNotFound(String),

    #[error("unknown target: {0}")]
    TargetNotFound(String),

    #[error("unknown project: {0}")]
    ProjectNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(RunId),

    // Scheduling errors: logged, never crash the loop.
    #[error("invalid run transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("force build not allowed for project: {0}")]
    ForceNotAllowed(String),

    // Expansion errors
    #[error("invalid substitution pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    // Collaborator errors
    #[error("worker transport error: {0}")]
    Transport(String),

    #[error("report delivery failed: {0}")]
    Report(String),

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
