//! Structured cache trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::report::types::{EntityKind, FiscalYear};

use super::traits::Cacheable;

/// Bookkeeping stored alongside each slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMeta {
  /// When the slot content was last fetched from the remote service
  pub synced_at: DateTime<Utc>,
  pub row_count: usize,
}

/// Trait for structured cache backends.
///
/// A slot is the full row set of one kind and fiscal year for the company the
/// store was opened for. Writers replace whole slots; readers never observe a
/// half-written slot.
pub trait StructuredCache: Send + Sync + 'static {
  /// Atomically clear the slot and insert `records`, stamping `synced_at`.
  fn replace_slot_at<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
    records: &[T],
    synced_at: DateTime<Utc>,
  ) -> Result<(), PersistenceError>;

  /// Atomically clear the slot and insert `records` as of now.
  fn replace_slot<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
    records: &[T],
  ) -> Result<(), PersistenceError> {
    self.replace_slot_at(kind, year, records, Utc::now())
  }

  /// All rows of a slot in stored order; empty if the slot does not exist.
  fn read_slot<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
  ) -> Result<Vec<T>, PersistenceError>;

  fn clear_slot(&self, kind: EntityKind, year: &FiscalYear) -> Result<(), PersistenceError>;

  /// Remove every slot of a fiscal year. Returns the number of slots removed.
  fn clear_year(&self, year: &FiscalYear) -> Result<usize, PersistenceError>;

  /// Remove every slot of a kind across years. Returns the number of slots removed.
  fn clear_kind(&self, kind: EntityKind) -> Result<usize, PersistenceError>;

  fn slot_meta(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
  ) -> Result<Option<SlotMeta>, PersistenceError>;
}

/// SQLite-based structured cache.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  company_code: String,
}

/// Bump when the table layout changes; older layouts are dropped on open.
const SCHEMA_VERSION: i64 = 1;

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Serialized rows, one per natural id within a slot
CREATE TABLE IF NOT EXISTS slot_rows (
    company_code TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    fiscal_year TEXT NOT NULL,
    natural_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (company_code, entity_kind, fiscal_year, natural_id)
);

CREATE INDEX IF NOT EXISTS idx_slot_rows_position
    ON slot_rows(company_code, entity_kind, fiscal_year, position);

-- Slot tracking
CREATE TABLE IF NOT EXISTS slot_meta (
    company_code TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    fiscal_year TEXT NOT NULL,
    synced_at TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    PRIMARY KEY (company_code, entity_kind, fiscal_year)
);
"#;

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS slot_rows;
DROP TABLE IF EXISTS slot_meta;
"#;

impl SqliteStorage {
  /// Open or create the cache database at `path`, scoped to one company.
  pub fn open(path: &Path, company_code: &str) -> Result<Self, PersistenceError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        PersistenceError::WriteFailed(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      PersistenceError::WriteFailed(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn, company_code)
  }

  /// Open a private in-memory cache.
  pub fn open_in_memory(company_code: &str) -> Result<Self, PersistenceError> {
    Self::with_connection(Connection::open_in_memory()?, company_code)
  }

  fn with_connection(conn: Connection, company_code: &str) -> Result<Self, PersistenceError> {
    let storage = Self {
      conn: Mutex::new(conn),
      company_code: company_code.to_string(),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
    self
      .conn
      .lock()
      .map_err(|e| PersistenceError::WriteFailed(format!("Lock poisoned: {}", e)))
  }

  /// Run database migrations for cache tables.
  ///
  /// The cache is disposable: a database written by a different layout is
  /// dropped and recreated, and the durable snapshots refill it.
  fn run_migrations(&self) -> Result<(), PersistenceError> {
    let conn = self.lock()?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
      warn!(
        found = version,
        expected = SCHEMA_VERSION,
        "cache schema changed, dropping cached slots"
      );
      conn.execute_batch(DROP_SCHEMA)?;
    }

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| PersistenceError::WriteFailed(format!("Failed to run cache migrations: {}", e)))?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
  }
}

impl StructuredCache for SqliteStorage {
  fn replace_slot_at<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
    records: &[T],
    synced_at: DateTime<Utc>,
  ) -> Result<(), PersistenceError> {
    let mut conn = self.lock()?;
    let kind = kind.as_str();
    let year = year.as_str();

    // Readers share the connection mutex, so they see either the old or the new slot
    let tx = conn.transaction()?;

    tx.execute(
      "DELETE FROM slot_rows WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?",
      params![self.company_code, kind, year],
    )?;

    {
      let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO slot_rows (company_code, entity_kind, fiscal_year, natural_id, position, data)
         VALUES (?, ?, ?, ?, ?, ?)",
      )?;
      for (position, record) in records.iter().enumerate() {
        let data = serde_json::to_vec(record)
          .map_err(|e| PersistenceError::WriteFailed(format!("Failed to serialize row: {}", e)))?;
        stmt.execute(params![
          self.company_code,
          kind,
          year,
          record.natural_id(),
          position as i64,
          data
        ])?;
      }
    }

    let row_count: i64 = tx.query_row(
      "SELECT COUNT(*) FROM slot_rows WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?",
      params![self.company_code, kind, year],
      |row| row.get(0),
    )?;

    tx.execute(
      "INSERT OR REPLACE INTO slot_meta (company_code, entity_kind, fiscal_year, synced_at, row_count)
       VALUES (?, ?, ?, ?, ?)",
      params![self.company_code, kind, year, synced_at.to_rfc3339(), row_count],
    )?;

    tx.commit()?;
    Ok(())
  }

  fn read_slot<T: Cacheable>(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
  ) -> Result<Vec<T>, PersistenceError> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(
      "SELECT natural_id, data FROM slot_rows
       WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?
       ORDER BY position",
    )?;

    let rows = stmt.query_map(params![self.company_code, kind.as_str(), year.as_str()], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
      let (natural_id, data) = row?;
      match serde_json::from_slice::<T>(&data) {
        Ok(record) => records.push(record),
        Err(e) => warn!(%kind, %year, %natural_id, error = %e, "skipping unreadable cached row"),
      }
    }

    Ok(records)
  }

  fn clear_slot(&self, kind: EntityKind, year: &FiscalYear) -> Result<(), PersistenceError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM slot_rows WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?",
      params![self.company_code, kind.as_str(), year.as_str()],
    )?;
    tx.execute(
      "DELETE FROM slot_meta WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?",
      params![self.company_code, kind.as_str(), year.as_str()],
    )?;
    tx.commit()?;
    Ok(())
  }

  fn clear_year(&self, year: &FiscalYear) -> Result<usize, PersistenceError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM slot_rows WHERE company_code = ? AND fiscal_year = ?",
      params![self.company_code, year.as_str()],
    )?;
    let slots = tx.execute(
      "DELETE FROM slot_meta WHERE company_code = ? AND fiscal_year = ?",
      params![self.company_code, year.as_str()],
    )?;
    tx.commit()?;
    info!(%year, slots, "cleared cached fiscal year");
    Ok(slots)
  }

  fn clear_kind(&self, kind: EntityKind) -> Result<usize, PersistenceError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM slot_rows WHERE company_code = ? AND entity_kind = ?",
      params![self.company_code, kind.as_str()],
    )?;
    let slots = tx.execute(
      "DELETE FROM slot_meta WHERE company_code = ? AND entity_kind = ?",
      params![self.company_code, kind.as_str()],
    )?;
    tx.commit()?;
    info!(%kind, slots, "cleared cached kind");
    Ok(slots)
  }

  fn slot_meta(
    &self,
    kind: EntityKind,
    year: &FiscalYear,
  ) -> Result<Option<SlotMeta>, PersistenceError> {
    let conn = self.lock()?;

    let meta: Option<(String, i64)> = conn
      .query_row(
        "SELECT synced_at, row_count FROM slot_meta
         WHERE company_code = ? AND entity_kind = ? AND fiscal_year = ?",
        params![self.company_code, kind.as_str(), year.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match meta {
      Some((synced_at, row_count)) => Ok(Some(SlotMeta {
        synced_at: parse_datetime(&synced_at)?,
        row_count: row_count.max(0) as usize,
      })),
      None => Ok(None),
    }
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| PersistenceError::Corrupt(format!("Failed to parse datetime '{}': {}", s, e)))
}
