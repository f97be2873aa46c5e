//! Build scheduling and worker coordination for Anvil.
//!
//! The static target catalog is produced once at startup by the expander and
//! registry; the dispatch loop then consumes trigger and worker events,
//! matching queued runs to idle capable workers.

pub mod dispatch;
pub mod expand;
pub mod pool;
pub mod registry;
pub mod tracker;
pub mod triggers;
