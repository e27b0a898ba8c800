//! Local cache tiers for report data.
//!
//! - `StructuredCache` holds the most recently synced rows per slot and is the
//!   read path for every consumer
//! - `DurableStore` keeps schema-agnostic snapshot files that survive the
//!   structured cache being dropped by a migration or corruption

mod durable;
mod storage;
mod traits;

pub use durable::DurableStore;
pub use storage::{SlotMeta, SqliteStorage, StructuredCache};
pub use traits::dedupe_by_natural_id;
