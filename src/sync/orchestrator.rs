//! Remote to cache to snapshot synchronization.
//!
//! For each (kind, year) slot the orchestrator fetches the full collection,
//! replaces the structured cache slot, then writes the durable snapshot. A
//! failed fetch leaves both local tiers untouched, so the read path keeps
//! serving the previous data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{dedupe_by_natural_id, DurableStore, SlotMeta, StructuredCache};
use crate::config::Config;
use crate::error::{FetchError, PersistenceError, SyncFailure};
use crate::pools::{PoolError, WorkerPools};
use crate::report::client::RemoteSource;
use crate::report::types::{EntityKind, FiscalYear, ReportRecord, UserId};

use super::locks::KeyLocks;
use super::record::{RecommendedAction, SyncPhase, SyncRecord, SyncReport, SyncStatus};

#[derive(Debug, Clone)]
pub struct SyncSettings {
  /// Upper bound on one remote call; exceeding it is `NetworkUnavailable`
  pub fetch_timeout: Duration,
  pub offline_mode: bool,
  pub stale_after: chrono::Duration,
  pub retry_after: chrono::Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      fetch_timeout: Duration::from_secs(30),
      offline_mode: false,
      stale_after: chrono::Duration::minutes(60),
      retry_after: chrono::Duration::minutes(5),
    }
  }
}

impl SyncSettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      fetch_timeout: Duration::from_secs(config.api.timeout_secs),
      offline_mode: config.offline_mode,
      stale_after: chrono::Duration::minutes(config.sync.stale_after_minutes),
      retry_after: chrono::Duration::minutes(config.sync.retry_after_minutes),
    }
  }
}

/// Cached rows of one slot as served to the read path.
#[derive(Debug, Clone, Default)]
pub struct SlotView {
  pub records: Vec<ReportRecord>,
  /// None if the slot was never synced or hydrated
  pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SlotState {
  phase: SyncPhase,
  /// Time of the last failure, kept only while it is retryable
  retryable_failure_at: Option<DateTime<Utc>>,
}

type SlotKey = (EntityKind, FiscalYear);

pub struct SyncOrchestrator<R, S> {
  remote: Arc<R>,
  cache: Arc<S>,
  durable: Arc<DurableStore>,
  pools: WorkerPools,
  locks: Arc<KeyLocks>,
  settings: SyncSettings,
  slots: Arc<Mutex<HashMap<SlotKey, SlotState>>>,
}

impl<R, S> Clone for SyncOrchestrator<R, S> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      cache: Arc::clone(&self.cache),
      durable: Arc::clone(&self.durable),
      pools: self.pools.clone(),
      locks: Arc::clone(&self.locks),
      settings: self.settings.clone(),
      slots: Arc::clone(&self.slots),
    }
  }
}

impl<R, S> SyncOrchestrator<R, S>
where
  R: RemoteSource + 'static,
  S: StructuredCache,
{
  pub fn new(
    remote: Arc<R>,
    cache: Arc<S>,
    durable: Arc<DurableStore>,
    pools: WorkerPools,
    settings: SyncSettings,
  ) -> Self {
    Self {
      remote,
      cache,
      durable,
      pools,
      locks: Arc::new(KeyLocks::new()),
      settings,
      slots: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Slot locks shared with anything else that writes slots.
  pub fn locks(&self) -> Arc<KeyLocks> {
    Arc::clone(&self.locks)
  }

  // ==========================================================================
  // Sync operations
  // ==========================================================================

  /// Sync one kind. Never fails: problems are reported in the record.
  pub async fn sync_one(&self, kind: EntityKind, user: UserId, year: &FiscalYear) -> SyncRecord {
    let _guard = self.locks.lock(kind, year).await;
    let started_at = Utc::now();
    let clock = Instant::now();
    self.set_phase(kind, year, SyncPhase::Fetching);

    let result = self.fetch_and_persist(kind, user, year).await;
    let duration_ms = clock.elapsed().as_millis() as u64;

    match result {
      Ok(count) => {
        self.finish_slot(kind, year, SyncPhase::Idle, None);
        info!(%kind, %year, count, duration_ms, "sync complete");
        SyncRecord::succeeded(kind, started_at, duration_ms, count)
      }
      Err(failure) => {
        let retryable_at = failure.is_retryable().then(Utc::now);
        self.finish_slot(kind, year, SyncPhase::Failed, retryable_at);
        warn!(%kind, %year, duration_ms, error = %failure, "sync failed, keeping cached data");
        SyncRecord::failed(kind, started_at, duration_ms, failure)
      }
    }
  }

  /// Sync every kind concurrently. Failures are isolated per kind.
  pub async fn sync_all(&self, user: UserId, year: &FiscalYear) -> SyncReport {
    self.sync_selective(&EntityKind::ALL, user, year).await
  }

  /// Sync the given kinds concurrently; duplicates are synced once.
  pub async fn sync_selective(&self, kinds: &[EntityKind], user: UserId, year: &FiscalYear) -> SyncReport {
    let mut unique: Vec<EntityKind> = kinds.to_vec();
    unique.sort();
    unique.dedup();

    debug!(%year, kinds = unique.len(), "starting sync run");
    let records = join_all(unique.into_iter().map(|kind| self.sync_one(kind, user, year))).await;
    let report: SyncReport = records.into_iter().collect();

    if report.is_success() {
      info!(%year, kinds = report.len(), rows = report.total_records(), "sync run succeeded");
    } else {
      warn!(%year, failed = report.failures().len(), kinds = report.len(), "sync run partially failed");
    }
    report
  }

  async fn fetch_and_persist(
    &self,
    kind: EntityKind,
    user: UserId,
    year: &FiscalYear,
  ) -> Result<usize, SyncFailure> {
    let fetched = self.fetch(kind, user, year).await?;

    let (records, dropped) = dedupe_by_natural_id(fetched);
    if dropped > 0 {
      warn!(%kind, %year, dropped, "remote returned duplicate ids, keeping first occurrence");
    }
    let count = records.len();
    let records: Arc<[ReportRecord]> = Arc::from(records);

    self.set_phase(kind, year, SyncPhase::Persisting);

    let cache = Arc::clone(&self.cache);
    let rows = Arc::clone(&records);
    let slot_year = year.clone();
    self
      .pools
      .run_io(move || cache.replace_slot(kind, &slot_year, &rows[..]))
      .await
      .map_err(internal_failure)??;
    debug!(%kind, %year, count, "cache slot replaced");

    let durable = Arc::clone(&self.durable);
    let slot_year = year.clone();
    let saved = self
      .pools
      .run_io(move || durable.save(kind, &slot_year, &records[..]))
      .await
      .map_err(internal_failure)?;
    if !saved {
      // The cache already holds the new rows; the previous snapshot stays on disk
      return Err(PersistenceError::WriteFailed(format!("snapshot for {} {} not written", kind, year)).into());
    }

    Ok(count)
  }

  async fn fetch(
    &self,
    kind: EntityKind,
    user: UserId,
    year: &FiscalYear,
  ) -> Result<Vec<ReportRecord>, FetchError> {
    if self.settings.offline_mode {
      return Err(FetchError::NetworkUnavailable("offline mode".into()));
    }

    // The deadline starts once the I/O permit is held, not while queued for it
    let timeout = self.settings.fetch_timeout;
    let call = async { tokio::time::timeout(timeout, self.remote.fetch(kind, user, year)).await };
    match self.pools.io(call).await {
      Ok(Ok(result)) => result,
      Ok(Err(_)) => Err(FetchError::NetworkUnavailable(format!(
        "no response within {}s",
        timeout.as_secs_f32()
      ))),
      Err(e) => Err(FetchError::NetworkUnavailable(e.to_string())),
    }
  }

  // ==========================================================================
  // Read path and status
  // ==========================================================================

  /// Cached rows for a slot. Local errors are logged and read as empty.
  pub async fn read_slot(&self, kind: EntityKind, year: &FiscalYear) -> SlotView {
    let cache = Arc::clone(&self.cache);
    let slot_year = year.clone();
    let result = self
      .pools
      .run_io(move || -> Result<SlotView, PersistenceError> {
        let records = cache.read_slot(kind, &slot_year)?;
        let synced_at = cache.slot_meta(kind, &slot_year)?.map(|m| m.synced_at);
        Ok(SlotView { records, synced_at })
      })
      .await;

    match result {
      Ok(Ok(view)) => view,
      Ok(Err(e)) => {
        warn!(%kind, %year, error = %e, "cache read failed");
        SlotView::default()
      }
      Err(e) => {
        warn!(%kind, %year, error = %e, "cache read task failed");
        SlotView::default()
      }
    }
  }

  /// Freshness of the cached year and what to do next. Performs no writes.
  pub async fn get_sync_status(&self, year: &FiscalYear) -> SyncStatus {
    let cache = Arc::clone(&self.cache);
    let slot_year = year.clone();
    let metas = self
      .pools
      .run_io(move || {
        EntityKind::ALL
          .iter()
          .map(|kind| {
            let meta = cache.slot_meta(*kind, &slot_year).unwrap_or_else(|e| {
              warn!(%kind, year = %slot_year, error = %e, "cannot read slot metadata");
              None
            });
            (*kind, meta)
          })
          .collect::<Vec<(EntityKind, Option<SlotMeta>)>>()
      })
      .await
      .unwrap_or_else(|e| {
        warn!(%year, error = %e, "status read task failed");
        Vec::new()
      });

    self.status_from(year, &metas, Utc::now())
  }

  fn status_from(
    &self,
    year: &FiscalYear,
    metas: &[(EntityKind, Option<SlotMeta>)],
    now: DateTime<Utc>,
  ) -> SyncStatus {
    let mut missing = Vec::new();
    let mut stale = Vec::new();
    let mut last_sync: Option<DateTime<Utc>> = None;

    for kind in EntityKind::ALL {
      let meta = metas.iter().find(|(k, _)| *k == kind).and_then(|(_, m)| m.as_ref());
      match meta {
        None => missing.push(kind),
        Some(meta) => {
          if now - meta.synced_at > self.settings.stale_after {
            stale.push(kind);
          }
          last_sync = Some(last_sync.map_or(meta.synced_at, |t| t.max(meta.synced_at)));
        }
      }
    }

    let is_data_fresh = missing.is_empty() && stale.is_empty();
    let can_sync = !self.settings.offline_mode;
    let recently_failed = self.recent_retryable_failure(year, now);

    let recommended_action = if is_data_fresh {
      RecommendedAction::NoAction
    } else if !can_sync || recently_failed {
      RecommendedAction::RetryLater
    } else if missing.len() == EntityKind::ALL.len() {
      RecommendedAction::FullSync
    } else {
      RecommendedAction::PartialSync
    };

    SyncStatus {
      last_sync,
      is_data_fresh,
      can_sync,
      recommended_action,
      missing,
      stale,
    }
  }

  // ==========================================================================
  // Slot state bookkeeping
  // ==========================================================================

  /// Current state machine phase of a slot.
  pub fn phase(&self, kind: EntityKind, year: &FiscalYear) -> SyncPhase {
    let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
    slots
      .get(&(kind, year.clone()))
      .map(|s| s.phase)
      .unwrap_or_default()
  }

  fn set_phase(&self, kind: EntityKind, year: &FiscalYear, phase: SyncPhase) {
    let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
    let state = slots.entry((kind, year.clone())).or_default();
    debug!(%kind, %year, from = %state.phase, to = %phase, "sync phase");
    state.phase = phase;
  }

  fn finish_slot(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
    phase: SyncPhase,
    retryable_failure_at: Option<DateTime<Utc>>,
  ) {
    self.set_phase(kind, year, phase);
    let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(state) = slots.get_mut(&(kind, year.clone())) {
      state.retryable_failure_at = retryable_failure_at;
    }
  }

  fn recent_retryable_failure(&self, year: &FiscalYear, now: DateTime<Utc>) -> bool {
    let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
    slots.iter().any(|((_, y), state)| {
      y == year
        && state
          .retryable_failure_at
          .is_some_and(|at| now - at < self.settings.retry_after)
    })
  }
}

fn internal_failure(e: PoolError) -> SyncFailure {
  PersistenceError::WriteFailed(e.to_string()).into()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::sync::testing::{outstanding, stock, user, year, MockRemote};

  struct Harness {
    remote: Arc<MockRemote>,
    cache: Arc<SqliteStorage>,
    durable: Arc<DurableStore>,
    orchestrator: SyncOrchestrator<MockRemote, SqliteStorage>,
    _dir: tempfile::TempDir,
  }

  fn harness_with(settings: SyncSettings) -> Harness {
    harness_with_pools(settings, WorkerPools::new(4, 2))
  }

  fn harness_with_pools(settings: SyncSettings, pools: WorkerPools) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MockRemote::new());
    let cache = Arc::new(SqliteStorage::open_in_memory("ACME").unwrap());
    let durable = Arc::new(DurableStore::open(dir.path().join("snapshots")).unwrap());
    let orchestrator = SyncOrchestrator::new(
      Arc::clone(&remote),
      Arc::clone(&cache),
      Arc::clone(&durable),
      pools,
      settings,
    );
    Harness {
      remote,
      cache,
      durable,
      orchestrator,
      _dir: dir,
    }
  }

  fn harness() -> Harness {
    harness_with(SyncSettings::default())
  }

  fn cached(h: &Harness, kind: EntityKind) -> Vec<ReportRecord> {
    h.cache.read_slot(kind, &year()).unwrap()
  }

  #[tokio::test]
  async fn test_sync_writes_both_tiers() {
    let h = harness();
    h.remote.respond(EntityKind::Outstanding, outstanding(120));

    let record = h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await;

    assert!(record.success, "{:?}", record.error);
    assert_eq!(record.record_count, 120);
    assert_eq!(cached(&h, EntityKind::Outstanding).len(), 120);
    let snapshot: Vec<ReportRecord> = h.durable.load(EntityKind::Outstanding, &year());
    assert_eq!(snapshot.len(), 120);
    assert_eq!(snapshot, cached(&h, EntityKind::Outstanding));
    assert_eq!(h.orchestrator.phase(EntityKind::Outstanding, &year()), SyncPhase::Idle);
  }

  #[tokio::test]
  async fn test_repeated_sync_replaces_instead_of_appending() {
    let h = harness();
    h.remote.respond(EntityKind::Stock, stock(30));

    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;
    let first = cached(&h, EntityKind::Stock);
    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;

    assert_eq!(cached(&h, EntityKind::Stock), first);
    assert_eq!(h.remote.calls(EntityKind::Stock), 2);
  }

  #[tokio::test]
  async fn test_timeout_keeps_previous_slot() {
    let h = harness_with(SyncSettings {
      fetch_timeout: Duration::from_millis(50),
      ..SyncSettings::default()
    });
    h.remote.respond(EntityKind::Outstanding, outstanding(50));
    assert!(h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await.success);

    h.remote.hang(EntityKind::Outstanding);
    let record = h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await;

    assert!(!record.success);
    assert!(matches!(
      record.error,
      Some(SyncFailure::Fetch(FetchError::NetworkUnavailable(_)))
    ));
    assert_eq!(cached(&h, EntityKind::Outstanding).len(), 50);
    let snapshot: Vec<ReportRecord> = h.durable.load(EntityKind::Outstanding, &year());
    assert_eq!(snapshot.len(), 50);
    assert_eq!(h.orchestrator.phase(EntityKind::Outstanding, &year()), SyncPhase::Failed);
  }

  #[tokio::test]
  async fn test_failing_kind_does_not_touch_others() {
    let h = harness();
    h.remote.respond(EntityKind::Stock, stock(10));
    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;

    h.remote.respond(EntityKind::Outstanding, outstanding(5));
    h.remote.fail(
      EntityKind::Stock,
      FetchError::ServerError {
        code: 500,
        message: "boom".into(),
      },
    );

    let report = h
      .orchestrator
      .sync_selective(&[EntityKind::Outstanding, EntityKind::Stock], user(), &year())
      .await;

    let success = |kind| report.iter().find(|r| r.kind == kind).unwrap().success;
    assert!(success(EntityKind::Outstanding));
    assert!(!success(EntityKind::Stock));
    assert!(!report.is_success());
    assert_eq!(cached(&h, EntityKind::Stock).len(), 10);
    assert_eq!(cached(&h, EntityKind::Outstanding).len(), 5);
  }

  #[tokio::test]
  async fn test_sync_all_covers_every_kind() {
    let h = harness();
    h.remote.respond(EntityKind::Outstanding, outstanding(3));
    h.remote.fail(EntityKind::Ledger, FetchError::MalformedResponse("bad".into()));

    let report = h.orchestrator.sync_all(user(), &year()).await;

    assert_eq!(report.len(), EntityKind::ALL.len());
    assert_eq!(h.remote.total_calls(), EntityKind::ALL.len());
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures.contains_key(&EntityKind::Ledger));
    assert!(report.check().is_err());
  }

  #[tokio::test]
  async fn test_selective_dedupes_kinds() {
    let h = harness();
    let report = h
      .orchestrator
      .sync_selective(&[EntityKind::Stock, EntityKind::Stock], user(), &year())
      .await;
    assert_eq!(report.len(), 1);
    assert_eq!(h.remote.calls(EntityKind::Stock), 1);
  }

  #[tokio::test]
  async fn test_duplicate_remote_ids_are_dropped() {
    let h = harness();
    let mut rows = outstanding(5);
    rows.push(rows[0].clone());
    h.remote.respond(EntityKind::Outstanding, rows);

    let record = h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await;

    assert_eq!(record.record_count, 5);
    assert_eq!(cached(&h, EntityKind::Outstanding).len(), 5);
  }

  #[tokio::test]
  async fn test_offline_mode_never_calls_remote() {
    let h = harness_with(SyncSettings {
      offline_mode: true,
      ..SyncSettings::default()
    });
    h.remote.respond(EntityKind::Stock, stock(3));

    let record = h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;

    assert!(!record.success);
    assert_eq!(h.remote.total_calls(), 0);
    assert!(cached(&h, EntityKind::Stock).is_empty());
  }

  #[tokio::test]
  async fn test_same_slot_syncs_are_serialized() {
    let h = harness();
    h.remote.respond(EntityKind::Stock, stock(5));
    h.remote.set_delay(Duration::from_millis(40));

    let clock = Instant::now();
    let y = year();
    let (a, b) = tokio::join!(
      h.orchestrator.sync_one(EntityKind::Stock, user(), &y),
      h.orchestrator.sync_one(EntityKind::Stock, user(), &y),
    );

    assert!(a.success && b.success);
    assert!(clock.elapsed() >= Duration::from_millis(80));
    assert_eq!(cached(&h, EntityKind::Stock).len(), 5);
  }

  #[tokio::test]
  async fn test_waiting_for_io_permit_does_not_count_toward_timeout() {
    let h = harness_with_pools(
      SyncSettings {
        fetch_timeout: Duration::from_millis(100),
        ..SyncSettings::default()
      },
      WorkerPools::new(1, 1),
    );
    h.remote.set_delay(Duration::from_millis(60));

    let report = h
      .orchestrator
      .sync_selective(&[EntityKind::Stock, EntityKind::Ledger, EntityKind::Expiry], user(), &year())
      .await;

    for record in report.iter() {
      assert!(record.success, "{}: {:?}", record.kind, record.error);
    }
  }

  #[tokio::test]
  async fn test_snapshot_write_failure_is_reported_and_cache_keeps_new_rows() {
    let h = harness();
    h.remote.respond(EntityKind::Outstanding, outstanding(50));
    assert!(h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await.success);

    // A directory at the temp path makes the snapshot write fail
    let tmp = h
      .durable
      .snapshot_path(EntityKind::Outstanding, &year())
      .with_extension("snapshot.tmp");
    std::fs::create_dir(&tmp).unwrap();

    h.remote.respond(EntityKind::Outstanding, outstanding(80));
    let record = h.orchestrator.sync_one(EntityKind::Outstanding, user(), &year()).await;

    assert!(!record.success);
    assert!(matches!(
      record.error,
      Some(SyncFailure::Persistence(PersistenceError::WriteFailed(_)))
    ));
    assert_eq!(cached(&h, EntityKind::Outstanding).len(), 80);
    let snapshot: Vec<ReportRecord> = h.durable.load(EntityKind::Outstanding, &year());
    assert_eq!(snapshot.len(), 50);
    assert_eq!(h.orchestrator.phase(EntityKind::Outstanding, &year()), SyncPhase::Failed);
  }

  #[tokio::test]
  async fn test_different_kinds_sync_concurrently() {
    let h = harness();
    h.remote.set_delay(Duration::from_millis(60));

    let clock = Instant::now();
    h.orchestrator
      .sync_selective(&[EntityKind::Stock, EntityKind::Ledger, EntityKind::Expiry], user(), &year())
      .await;

    assert!(clock.elapsed() < Duration::from_millis(170));
  }

  #[tokio::test]
  async fn test_read_slot_reports_sync_time() {
    let h = harness();
    let empty = h.orchestrator.read_slot(EntityKind::Template, &year()).await;
    assert!(empty.records.is_empty());
    assert!(empty.synced_at.is_none());

    h.remote.respond(EntityKind::Stock, stock(4));
    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;
    let view = h.orchestrator.read_slot(EntityKind::Stock, &year()).await;
    assert_eq!(view.records.len(), 4);
    assert!(view.synced_at.is_some());
  }

  #[tokio::test]
  async fn test_status_recommends_full_then_partial_then_nothing() {
    let h = harness();

    let status = h.orchestrator.get_sync_status(&year()).await;
    assert_eq!(status.recommended_action, RecommendedAction::FullSync);
    assert!(status.last_sync.is_none());
    assert!(!status.is_data_fresh);
    assert!(status.can_sync);

    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;
    let status = h.orchestrator.get_sync_status(&year()).await;
    assert_eq!(status.recommended_action, RecommendedAction::PartialSync);
    assert_eq!(status.missing.len(), EntityKind::ALL.len() - 1);

    h.orchestrator.sync_all(user(), &year()).await;
    let status = h.orchestrator.get_sync_status(&year()).await;
    assert_eq!(status.recommended_action, RecommendedAction::NoAction);
    assert!(status.is_data_fresh);
    assert!(status.last_sync.is_some());
  }

  #[tokio::test]
  async fn test_status_marks_old_slots_stale() {
    let h = harness();
    let old = Utc::now() - chrono::Duration::hours(3);
    for kind in EntityKind::ALL {
      h.cache
        .replace_slot_at::<ReportRecord>(kind, &year(), &[], old)
        .unwrap();
    }

    let status = h.orchestrator.get_sync_status(&year()).await;
    assert!(!status.is_data_fresh);
    assert_eq!(status.stale.len(), EntityKind::ALL.len());
    assert_eq!(status.recommended_action, RecommendedAction::PartialSync);
    assert_eq!(status.last_sync, Some(old));
  }

  #[tokio::test]
  async fn test_status_after_network_failure_is_retry_later() {
    let h = harness();
    h.remote.fail(EntityKind::Stock, FetchError::NetworkUnavailable("down".into()));
    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;

    let status = h.orchestrator.get_sync_status(&year()).await;
    assert_eq!(status.recommended_action, RecommendedAction::RetryLater);

    // Success clears the pending retry
    h.remote.respond(EntityKind::Stock, stock(1));
    h.orchestrator.sync_one(EntityKind::Stock, user(), &year()).await;
    let status = h.orchestrator.get_sync_status(&year()).await;
    assert_eq!(status.recommended_action, RecommendedAction::PartialSync);
  }

  #[tokio::test]
  async fn test_offline_status_cannot_sync() {
    let h = harness_with(SyncSettings {
      offline_mode: true,
      ..SyncSettings::default()
    });
    let status = h.orchestrator.get_sync_status(&year()).await;
    assert!(!status.can_sync);
    assert_eq!(status.recommended_action, RecommendedAction::RetryLater);
  }
}
