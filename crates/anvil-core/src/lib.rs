//! Anvil Core
//!
//! Core domain types, traits, and error handling for the Anvil build
//! orchestrator. This crate has minimal dependencies and defines the shared
//! vocabulary used across all other crates.

pub mod error;
pub mod events;
pub mod ids;
pub mod policy;
pub mod ports;
pub mod project;
pub mod report;
pub mod run;
pub mod worker;

pub use error::{Error, Result};
pub use ids::*;
