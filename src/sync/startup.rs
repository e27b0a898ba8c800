use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{DurableStore, StructuredCache};
use crate::error::PersistenceError;
use crate::pools::WorkerPools;
use crate::report::types::{EntityKind, FiscalYear, ReportRecord};

use super::locks::KeyLocks;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
  /// Slots copied from snapshots with their row counts
  pub hydrated: Vec<(EntityKind, FiscalYear, usize)>,
  /// Slots already cached or without a usable snapshot
  pub skipped: usize,
  pub failed: usize,
}

impl HydrationReport {
  pub fn rows(&self) -> usize {
    self.hydrated.iter().map(|(_, _, n)| n).sum()
  }
}

/// Fills empty structured cache slots from durable snapshots.
///
/// Runs before any network call so the read path has data immediately after
/// a restart or after a migration wiped the cache. Slots that already have
/// cached content are left alone; the cache is the newer tier.
pub struct StartupLoader<S> {
  cache: Arc<S>,
  durable: Arc<DurableStore>,
  pools: WorkerPools,
  locks: Arc<KeyLocks>,
}

impl<S: StructuredCache> StartupLoader<S> {
  /// `locks` must be the orchestrator's, so hydration never races a sync.
  pub fn new(cache: Arc<S>, durable: Arc<DurableStore>, pools: WorkerPools, locks: Arc<KeyLocks>) -> Self {
    Self {
      cache,
      durable,
      pools,
      locks,
    }
  }

  /// Hydrate every kind of one fiscal year.
  pub async fn hydrate(&self, year: &FiscalYear) -> HydrationReport {
    let slots: Vec<(EntityKind, FiscalYear)> = EntityKind::ALL.iter().map(|k| (*k, year.clone())).collect();
    self.hydrate_slots(slots).await
  }

  /// Hydrate every slot that has a snapshot on disk.
  pub async fn hydrate_all(&self) -> HydrationReport {
    let durable = Arc::clone(&self.durable);
    let slots = match self.pools.run_io(move || durable.list()).await {
      Ok(slots) => slots,
      Err(e) => {
        warn!(error = %e, "cannot list snapshots");
        return HydrationReport::default();
      }
    };
    self.hydrate_slots(slots).await
  }

  async fn hydrate_slots(&self, slots: Vec<(EntityKind, FiscalYear)>) -> HydrationReport {
    let mut report = HydrationReport::default();

    for (kind, year) in slots {
      match self.hydrate_slot(kind, &year).await {
        Ok(Some(count)) => report.hydrated.push((kind, year, count)),
        Ok(None) => report.skipped += 1,
        Err(e) => {
          warn!(%kind, %year, error = %e, "hydration failed");
          report.failed += 1;
        }
      }
    }

    info!(
      hydrated = report.hydrated.len(),
      rows = report.rows(),
      skipped = report.skipped,
      failed = report.failed,
      "startup hydration finished"
    );
    report
  }

  /// Returns the row count copied, or None if the slot was skipped.
  async fn hydrate_slot(&self, kind: EntityKind, year: &FiscalYear) -> Result<Option<usize>, PersistenceError> {
    let _guard = self.locks.lock(kind, year).await;

    let cache = Arc::clone(&self.cache);
    let durable = Arc::clone(&self.durable);
    let slot_year = year.clone();

    self
      .pools
      .run_io(move || -> Result<Option<usize>, PersistenceError> {
        if cache.slot_meta(kind, &slot_year)?.is_some() {
          return Ok(None);
        }

        let snapshot = match durable.load_snapshot::<ReportRecord>(kind, &slot_year) {
          Ok(Some(snapshot)) => snapshot,
          Ok(None) => return Ok(None),
          Err(e) => {
            warn!(%kind, year = %slot_year, error = %e, "ignoring unreadable snapshot");
            return Ok(None);
          }
        };

        let count = snapshot.records.len();
        cache.replace_slot_at(kind, &slot_year, &snapshot.records, snapshot.header.saved_at)?;
        debug!(%kind, year = %slot_year, count, "slot hydrated from snapshot");
        Ok(Some(count))
      })
      .await
      .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::sync::testing::{outstanding, stock, year};

  struct Harness {
    cache: Arc<SqliteStorage>,
    durable: Arc<DurableStore>,
    loader: StartupLoader<SqliteStorage>,
    _dir: tempfile::TempDir,
  }

  fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteStorage::open_in_memory("ACME").unwrap());
    let durable = Arc::new(DurableStore::open(dir.path()).unwrap());
    let loader = StartupLoader::new(
      Arc::clone(&cache),
      Arc::clone(&durable),
      WorkerPools::default(),
      Arc::new(KeyLocks::new()),
    );
    Harness {
      cache,
      durable,
      loader,
      _dir: dir,
    }
  }

  #[tokio::test]
  async fn test_hydrates_empty_cache_from_snapshots() {
    let h = harness();
    assert!(h.durable.save(EntityKind::Outstanding, &year(), &outstanding(120)));
    assert!(h.durable.save(EntityKind::Stock, &year(), &stock(7)));

    let report = h.loader.hydrate(&year()).await;

    assert_eq!(report.hydrated.len(), 2);
    assert_eq!(report.rows(), 127);
    assert_eq!(report.skipped, EntityKind::ALL.len() - 2);
    let rows: Vec<ReportRecord> = h.cache.read_slot(EntityKind::Outstanding, &year()).unwrap();
    assert_eq!(rows, outstanding(120));
  }

  #[tokio::test]
  async fn test_keeps_synced_time_of_snapshot() {
    let h = harness();
    h.durable.save(EntityKind::Stock, &year(), &stock(2));
    let snapshot = h
      .durable
      .load_snapshot::<ReportRecord>(EntityKind::Stock, &year())
      .unwrap()
      .unwrap();

    h.loader.hydrate(&year()).await;

    let meta = h.cache.slot_meta(EntityKind::Stock, &year()).unwrap().unwrap();
    assert_eq!(meta.synced_at, snapshot.header.saved_at);
    assert_eq!(meta.row_count, 2);
  }

  #[tokio::test]
  async fn test_does_not_overwrite_cached_slot() {
    let h = harness();
    h.cache.replace_slot(EntityKind::Stock, &year(), &stock(3)).unwrap();
    h.durable.save(EntityKind::Stock, &year(), &stock(9));

    let report = h.loader.hydrate(&year()).await;

    assert!(report.hydrated.is_empty());
    let rows: Vec<ReportRecord> = h.cache.read_slot(EntityKind::Stock, &year()).unwrap();
    assert_eq!(rows.len(), 3);
  }

  #[tokio::test]
  async fn test_corrupt_snapshot_is_skipped() {
    let h = harness();
    std::fs::write(h.durable.snapshot_path(EntityKind::Ledger, &year()), b"not a snapshot").unwrap();

    let report = h.loader.hydrate(&year()).await;

    assert!(report.hydrated.is_empty());
    assert_eq!(report.failed, 0);
    let rows: Vec<ReportRecord> = h.cache.read_slot(EntityKind::Ledger, &year()).unwrap();
    assert!(rows.is_empty());
  }

  #[tokio::test]
  async fn test_hydrate_all_covers_every_year_on_disk() {
    let h = harness();
    let previous = FiscalYear::parse("2023-24").unwrap();
    h.durable.save(EntityKind::Stock, &year(), &stock(2));
    h.durable.save(EntityKind::Stock, &previous, &stock(5));

    let report = h.loader.hydrate_all().await;

    assert_eq!(report.hydrated.len(), 2);
    let rows: Vec<ReportRecord> = h.cache.read_slot(EntityKind::Stock, &previous).unwrap();
    assert_eq!(rows.len(), 5);
  }
}
