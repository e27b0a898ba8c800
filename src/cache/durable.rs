//! File-based snapshot tier that outlives the structured cache.
//!
//! One file per (fiscal year, kind), named `<year>_<kind>.snapshot`. A file
//! holds a one-line JSON header followed by the JSON array of rows:
//!
//! ```text
//! {"format":1,"kind":"stock","fiscal_year":"2024-25","saved_at":"...","count":2,"sha256":"..."}
//! [{"kind":"stock","item_code":"I1",...},{"kind":"stock","item_code":"I2",...}]
//! ```
//!
//! The body is checksummed so a torn or edited file reads as "no data"
//! instead of as a silently shorter slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::report::types::{EntityKind, FiscalYear};

use super::traits::Cacheable;

const FORMAT_VERSION: u32 = 1;
const EXTENSION: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
  pub format: u32,
  pub kind: EntityKind,
  pub fiscal_year: FiscalYear,
  pub saved_at: DateTime<Utc>,
  pub count: usize,
  pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct Snapshot<T> {
  pub header: SnapshotHeader,
  pub records: Vec<T>,
}

/// Flat snapshot store rooted at one directory.
#[derive(Debug, Clone)]
pub struct DurableStore {
  root: PathBuf,
}

impl DurableStore {
  /// Open (and create if needed) a snapshot directory.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
    let root = root.into();
    fs::create_dir_all(&root).map_err(|e| {
      PersistenceError::WriteFailed(format!(
        "Failed to create snapshot directory {}: {}",
        root.display(),
        e
      ))
    })?;
    Ok(Self { root })
  }

  pub fn snapshot_path(&self, kind: EntityKind, year: &FiscalYear) -> PathBuf {
    self.root.join(format!("{}_{}.{}", year, kind, EXTENSION))
  }

  /// Persist a slot snapshot. Failures are logged and reported as `false`.
  pub fn save<T: Cacheable>(&self, kind: EntityKind, year: &FiscalYear, records: &[T]) -> bool {
    match self.try_save(kind, year, records) {
      Ok(()) => true,
      Err(e) => {
        warn!(%kind, %year, error = %e, "failed to write snapshot");
        false
      }
    }
  }

  fn try_save<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
    records: &[T],
  ) -> Result<(), PersistenceError> {
    let body = serde_json::to_vec(records)
      .map_err(|e| PersistenceError::WriteFailed(format!("Failed to serialize snapshot: {}", e)))?;

    let header = SnapshotHeader {
      format: FORMAT_VERSION,
      kind,
      fiscal_year: year.clone(),
      saved_at: Utc::now(),
      count: records.len(),
      sha256: checksum(&body),
    };
    let header_line = serde_json::to_vec(&header)
      .map_err(|e| PersistenceError::WriteFailed(format!("Failed to serialize header: {}", e)))?;

    let path = self.snapshot_path(kind, year);
    let tmp_path = path.with_extension(format!("{}.tmp", EXTENSION));

    let written = write_file(&tmp_path, &header_line, &body).and_then(|()| fs::rename(&tmp_path, &path));
    if let Err(e) = written {
      if let Err(cleanup) = fs::remove_file(&tmp_path) {
        debug!(path = %tmp_path.display(), error = %cleanup, "temp snapshot not removed");
      }
      return Err(e.into());
    }

    debug!(%kind, %year, count = records.len(), path = %path.display(), "snapshot saved");
    Ok(())
  }

  /// Load a slot snapshot; missing or corrupt files read as empty.
  pub fn load<T: Cacheable>(&self, kind: EntityKind, year: &FiscalYear) -> Vec<T> {
    match self.load_snapshot(kind, year) {
      Ok(Some(snapshot)) => snapshot.records,
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(%kind, %year, error = %e, "ignoring unreadable snapshot");
        Vec::new()
      }
    }
  }

  /// Load a snapshot with its header. `Ok(None)` if no file exists.
  pub fn load_snapshot<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
  ) -> Result<Option<Snapshot<T>>, PersistenceError> {
    let path = self.snapshot_path(kind, year);
    let bytes = match fs::read(&path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    let split = bytes
      .iter()
      .position(|b| *b == b'\n')
      .ok_or_else(|| PersistenceError::Corrupt(format!("{}: missing header", path.display())))?;
    let (header_bytes, body) = (&bytes[..split], &bytes[split + 1..]);

    let header: SnapshotHeader = serde_json::from_slice(header_bytes)
      .map_err(|e| PersistenceError::Corrupt(format!("{}: bad header: {}", path.display(), e)))?;

    if header.format != FORMAT_VERSION {
      return Err(PersistenceError::Corrupt(format!(
        "{}: unsupported format {}",
        path.display(),
        header.format
      )));
    }
    if header.kind != kind || &header.fiscal_year != year {
      return Err(PersistenceError::Corrupt(format!(
        "{}: header names {} {}",
        path.display(),
        header.kind,
        header.fiscal_year
      )));
    }
    if checksum(body) != header.sha256 {
      return Err(PersistenceError::Corrupt(format!(
        "{}: checksum mismatch",
        path.display()
      )));
    }

    let records: Vec<T> = serde_json::from_slice(body)
      .map_err(|e| PersistenceError::Corrupt(format!("{}: bad body: {}", path.display(), e)))?;
    if records.len() != header.count {
      return Err(PersistenceError::Corrupt(format!(
        "{}: expected {} rows, found {}",
        path.display(),
        header.count,
        records.len()
      )));
    }

    Ok(Some(Snapshot { header, records }))
  }

  pub fn exists(&self, kind: EntityKind, year: &FiscalYear) -> bool {
    self.snapshot_path(kind, year).is_file()
  }

  /// Every (kind, year) pair with a snapshot file, sorted.
  pub fn list(&self) -> Vec<(EntityKind, FiscalYear)> {
    let mut slots: Vec<(EntityKind, FiscalYear)> = self
      .snapshot_files()
      .into_iter()
      .filter_map(|path| parse_file_name(&path))
      .collect();
    slots.sort();
    slots
  }

  /// Delete snapshots whose file is at least `age` old. Returns files removed.
  pub fn purge_older_than(&self, age: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for path in self.snapshot_files() {
      let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "cannot read snapshot age");
          continue;
        }
      };
      let elapsed = now.duration_since(modified).unwrap_or(Duration::ZERO);
      if elapsed >= age && self.remove(&path) {
        removed += 1;
      }
    }

    info!(removed, max_age_secs = age.as_secs(), "purged old snapshots");
    removed
  }

  /// Delete the snapshot of one slot. Returns false if there was none.
  pub fn delete(&self, kind: EntityKind, year: &FiscalYear) -> bool {
    self.exists(kind, year) && self.remove(&self.snapshot_path(kind, year))
  }

  /// Delete all snapshots of a kind across fiscal years.
  pub fn delete_kind(&self, kind: EntityKind) -> usize {
    self.delete_where(|k, _| k == kind)
  }

  /// Delete all snapshots of a fiscal year.
  pub fn delete_year(&self, year: &FiscalYear) -> usize {
    self.delete_where(|_, y| y == year)
  }

  fn delete_where(&self, pred: impl Fn(EntityKind, &FiscalYear) -> bool) -> usize {
    self
      .snapshot_files()
      .into_iter()
      .filter(|path| parse_file_name(path).is_some_and(|(k, y)| pred(k, &y)))
      .filter(|path| self.remove(path))
      .count()
  }

  fn remove(&self, path: &Path) -> bool {
    match fs::remove_file(path) {
      Ok(()) => true,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete snapshot");
        false
      }
    }
  }

  fn snapshot_files(&self) -> Vec<PathBuf> {
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) => {
        warn!(root = %self.root.display(), error = %e, "cannot list snapshots");
        return Vec::new();
      }
    };

    entries
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path())
      .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
      .collect()
  }
}

fn write_file(path: &Path, header_line: &[u8], body: &[u8]) -> std::io::Result<()> {
  let mut file = fs::File::create(path)?;
  file.write_all(header_line)?;
  file.write_all(b"\n")?;
  file.write_all(body)?;
  file.sync_all()
}

/// `2024-25_sale_purchase.snapshot` -> (SalePurchase, 2024-25)
fn parse_file_name(path: &Path) -> Option<(EntityKind, FiscalYear)> {
  let stem = path.file_stem()?.to_str()?;
  let (year, kind) = stem.split_once('_')?;
  Some((kind.parse().ok()?, FiscalYear::parse(year).ok()?))
}

fn checksum(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}
