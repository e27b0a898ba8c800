use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::info;

use crate::cache::{DurableStore, SqliteStorage, StructuredCache};
use crate::config::{self, Config};
use crate::pagination::PaginationEngine;
use crate::pools::WorkerPools;
use crate::progressive::ProgressiveProcessor;
use crate::report::client::HttpRemoteSource;
use crate::report::types::{EntityKind, FiscalYear, ReportRecord, UserId};
use crate::sync::{HydrationReport, StartupLoader, SyncOrchestrator, SyncPhase, SyncReport, SyncSettings, SyncStatus};
use crate::task::BackgroundTask;

type Orchestrator = SyncOrchestrator<HttpRemoteSource, SqliteStorage>;

const TICK: Duration = Duration::from_millis(250);

/// Wired-up components for one company and fiscal year
pub struct App {
  config: Config,
  user: UserId,
  cache: Arc<SqliteStorage>,
  durable: Arc<DurableStore>,
  orchestrator: Orchestrator,
  loader: StartupLoader<SqliteStorage>,
  pagination: PaginationEngine,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let user = config.user_id()?;
    let data_dir = config.storage.data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    let company = config.api.company_code.clone();
    let cache = Arc::new(SqliteStorage::open(&data_dir.join("cache.db"), &company)?);
    let durable = Arc::new(DurableStore::open(data_dir.join("snapshots").join(&company))?);

    let pools = WorkerPools::new(config.sync.io_concurrency, config.sync.compute_concurrency);
    let remote = Arc::new(HttpRemoteSource::new(&config.api)?);

    let orchestrator = SyncOrchestrator::new(
      remote,
      Arc::clone(&cache),
      Arc::clone(&durable),
      pools.clone(),
      SyncSettings::from_config(&config),
    );
    let loader = StartupLoader::new(
      Arc::clone(&cache),
      Arc::clone(&durable),
      pools.clone(),
      orchestrator.locks(),
    );

    let processor = ProgressiveProcessor::new(pools, config.sync.chunk_size);
    let pagination = PaginationEngine::from_config(processor, &config.pagination);

    info!(
      company = %company,
      year = %config.fiscal_year,
      offline = config.offline_mode,
      data_dir = %data_dir.display(),
      "repsync ready"
    );

    Ok(Self {
      config,
      user,
      cache,
      durable,
      orchestrator,
      loader,
      pagination,
    })
  }

  pub fn year(&self) -> &FiscalYear {
    &self.config.fiscal_year
  }

  pub async fn hydrate(&self) -> HydrationReport {
    self.loader.hydrate(self.year()).await
  }

  /// Sync `kinds` (all kinds when empty) in the background, reporting progress.
  ///
  /// Ctrl-C aborts the run; slots already written stay written.
  pub async fn sync(&self, kinds: Vec<EntityKind>) -> Result<SyncReport> {
    self.loader.hydrate_all().await;

    let watched = if kinds.is_empty() { EntityKind::ALL.to_vec() } else { kinds.clone() };
    let orchestrator = self.orchestrator.clone();
    let user = self.user;
    let year = self.year().clone();
    let mut task = BackgroundTask::spawn(async move {
      if kinds.is_empty() {
        orchestrator.sync_all(user, &year).await
      } else {
        orchestrator.sync_selective(&kinds, user, &year).await
      }
    });

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut ticker = tokio::time::interval(TICK);
    while !task.poll() {
      tokio::select! {
        _ = ticker.tick() => {
          let active = watched
            .iter()
            .map(|kind| self.orchestrator.phase(*kind, self.year()))
            .filter(|phase| matches!(phase, SyncPhase::Fetching | SyncPhase::Persisting))
            .count();
          eprint!(
            "\rsyncing {} ... {}/{} in flight, {:.1}s",
            self.year(),
            active,
            watched.len(),
            task.elapsed().as_secs_f32()
          );
        }
        _ = &mut interrupt => {
          task.cancel();
          eprintln!();
          return Err(eyre!("sync interrupted after {:.1}s", task.elapsed().as_secs_f32()));
        }
      }
    }
    eprintln!();

    task.take().ok_or_else(|| eyre!("sync task ended without a result"))
  }

  pub async fn status(&self) -> SyncStatus {
    self.hydrate().await;
    self.orchestrator.get_sync_status(self.year()).await
  }

  /// Walk `pages` windows of a cached slot, optionally filtered by text.
  pub async fn show(&self, kind: EntityKind, filter: Option<String>, pages: usize) -> Result<()> {
    self.hydrate().await;

    let year = self.year();
    let view = self.orchestrator.read_slot(kind, year).await;
    let records = match view.synced_at {
      Some(at) => {
        println!("{} {} ({} rows, synced {})", kind, year, view.records.len(), at);
        view.records
      }
      None if self.durable.exists(kind, year) => {
        // Hydration skipped or failed this slot; read the snapshot directly
        let records: Vec<ReportRecord> = self.durable.load(kind, year);
        if records.is_empty() {
          println!("{} {}: snapshot on disk is unreadable", kind, year);
        } else {
          println!("{} {} ({} rows from snapshot)", kind, year, records.len());
        }
        records
      }
      None => {
        println!("{} {}: no cached data", kind, year);
        Vec::new()
      }
    };

    let predicate = move |record: &ReportRecord| {
      filter
        .as_deref()
        .map(|needle| record.matches_text(needle))
        .unwrap_or(true)
    };
    let engine = self.pagination.clone();
    let mut filtering = BackgroundTask::spawn(async move { engine.init(records, predicate).await });
    let mut state = self.pagination.loading();
    let mut ticker = tokio::time::interval(TICK);
    while state.is_loading() {
      ticker.tick().await;
      if filtering.poll() {
        state = filtering.take().ok_or_else(|| eyre!("filtering ended without a result"))??;
      }
    }

    for page in 0..pages.max(1) {
      if page > 0 {
        if !state.has_more() {
          break;
        }
        state = self.pagination.load_more(&state);
      }
      println!(
        "-- rows {}..{} of {}{}",
        state.window_start() + 1,
        state.window_end(),
        state.total(),
        if state.has_more() { " (more)" } else { "" }
      );
      for record in state.visible() {
        println!("{}", record.summary_line());
      }
    }
    Ok(())
  }

  /// Delete snapshots older than `days`, or the configured retention.
  pub fn purge(&self, days: Option<u64>) -> usize {
    let age = match days {
      Some(days) => config::days(days),
      None => self.config.storage.retention(),
    };
    self.durable.purge_older_than(age)
  }

  /// Remove a fiscal year from both local tiers.
  pub fn clear_year(&self, year: &FiscalYear) -> Result<(usize, usize)> {
    let slots = self.cache.clear_year(year)?;
    let files = self.durable.delete_year(year);
    Ok((slots, files))
  }

  /// Remove a kind from both local tiers, for one year or across years.
  pub fn forget(&self, kind: EntityKind, year: Option<&FiscalYear>) -> Result<(usize, usize)> {
    match year {
      Some(year) => {
        let had_slot = self.cache.slot_meta(kind, year)?.is_some();
        self.cache.clear_slot(kind, year)?;
        let had_file = self.durable.delete(kind, year);
        Ok((usize::from(had_slot), usize::from(had_file)))
      }
      None => {
        let slots = self.cache.clear_kind(kind)?;
        let files = self.durable.delete_kind(kind);
        Ok((slots, files))
      }
    }
  }
}
