use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::report::types::{EntityKind, FiscalYear};

type SlotKey = (EntityKind, FiscalYear);

/// One async lock per (kind, year) slot.
///
/// Everything that writes a slot (sync, startup hydration) holds the slot's
/// guard, so writes to the same slot never interleave across tiers.
#[derive(Debug, Default)]
pub struct KeyLocks {
  locks: Mutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, kind: EntityKind, year: &FiscalYear) -> OwnedMutexGuard<()> {
    let slot = {
      let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
      Arc::clone(locks.entry((kind, year.clone())).or_default())
    };
    slot.lock_owned().await
  }
}
