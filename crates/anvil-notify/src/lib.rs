//! Report sink implementations.
//!
//! Delivery channels for completed-run reports, behind the core
//! `ReportSink` port. Formatting is deliberately minimal: sinks carry the
//! structured `RunReport` (HTTP) or its one-line summary (email, log);
//! anything richer belongs to the receiving collaborator.

pub mod sender;

pub use sender::{build_sinks, EmailSink, HttpSink, LogSink};
