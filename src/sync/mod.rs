//! Synchronization between the remote service and the local tiers.

mod locks;
mod orchestrator;
mod record;
mod startup;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{SyncOrchestrator, SyncSettings};
pub use record::{SyncPhase, SyncReport, SyncStatus};
pub use startup::{HydrationReport, StartupLoader};
