//! Outcome and status types reported by the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{OrchestrationError, SyncFailure};
use crate::report::types::EntityKind;

/// Result of one single-kind sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
  pub kind: EntityKind,
  pub started_at: DateTime<Utc>,
  pub duration_ms: u64,
  pub success: bool,
  pub error: Option<SyncFailure>,
  /// Rows written to the local tiers; zero on failure
  pub record_count: usize,
}

impl SyncRecord {
  pub fn succeeded(kind: EntityKind, started_at: DateTime<Utc>, duration_ms: u64, record_count: usize) -> Self {
    Self {
      kind,
      started_at,
      duration_ms,
      success: true,
      error: None,
      record_count,
    }
  }

  pub fn failed(kind: EntityKind, started_at: DateTime<Utc>, duration_ms: u64, error: SyncFailure) -> Self {
    Self {
      kind,
      started_at,
      duration_ms,
      success: false,
      error: Some(error),
      record_count: 0,
    }
  }

  pub fn error_message(&self) -> Option<String> {
    self.error.as_ref().map(|e| e.to_string())
  }
}

impl fmt::Display for SyncRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.error_message() {
      None => write!(
        f,
        "{:<14} ok      {:>6} rows  {:>6} ms",
        self.kind, self.record_count, self.duration_ms
      ),
      Some(message) => write!(f, "{:<14} FAILED  {}", self.kind, message),
    }
  }
}

/// Per-kind results of a multi-kind sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  records: BTreeMap<EntityKind, SyncRecord>,
}

impl SyncReport {
  pub fn insert(&mut self, record: SyncRecord) {
    self.records.insert(record.kind, record);
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
    self.records.values()
  }

  /// True only if every kind in the run succeeded.
  pub fn is_success(&self) -> bool {
    self.records.values().all(|r| r.success)
  }

  pub fn failures(&self) -> BTreeMap<EntityKind, SyncFailure> {
    self
      .records
      .values()
      .filter_map(|r| r.error.clone().map(|e| (r.kind, e)))
      .collect()
  }

  /// `PartialFailure` listing every failed kind, if any failed.
  pub fn check(&self) -> Result<(), OrchestrationError> {
    let failures = self.failures();
    if failures.is_empty() {
      Ok(())
    } else {
      Err(OrchestrationError::PartialFailure(failures))
    }
  }

  pub fn total_records(&self) -> usize {
    self.records.values().map(|r| r.record_count).sum()
  }
}

impl FromIterator<SyncRecord> for SyncReport {
  fn from_iter<I: IntoIterator<Item = SyncRecord>>(iter: I) -> Self {
    let mut report = SyncReport::default();
    for record in iter {
      report.insert(record);
    }
    report
  }
}

/// Per (kind, year) sync state machine.
///
/// `Idle -> Fetching -> Persisting -> Idle` on success,
/// `Idle -> Fetching -> Failed` on failure. `Failed` holds until the next
/// sync of that slot starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
  #[default]
  Idle,
  Fetching,
  Persisting,
  Failed,
}

impl fmt::Display for SyncPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SyncPhase::Idle => "idle",
      SyncPhase::Fetching => "fetching",
      SyncPhase::Persisting => "persisting",
      SyncPhase::Failed => "failed",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
  /// Nothing is cached for the year
  FullSync,
  /// Some kinds are missing or stale
  PartialSync,
  NoAction,
  /// Offline, or a retryable failure happened moments ago
  RetryLater,
}

impl fmt::Display for RecommendedAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RecommendedAction::FullSync => "full sync",
      RecommendedAction::PartialSync => "partial sync",
      RecommendedAction::NoAction => "no action",
      RecommendedAction::RetryLater => "retry later",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
  /// Most recent successful sync of any kind
  pub last_sync: Option<DateTime<Utc>>,
  /// Every kind is cached and none is older than the freshness window
  pub is_data_fresh: bool,
  pub can_sync: bool,
  pub recommended_action: RecommendedAction,
  /// Kinds with no cached slot
  pub missing: Vec<EntityKind>,
  /// Kinds cached but older than the freshness window
  pub stale: Vec<EntityKind>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FetchError;

  fn ok(kind: EntityKind, count: usize) -> SyncRecord {
    SyncRecord::succeeded(kind, Utc::now(), 5, count)
  }

  fn failed(kind: EntityKind) -> SyncRecord {
    SyncRecord::failed(
      kind,
      Utc::now(),
      5,
      FetchError::NetworkUnavailable("down".into()).into(),
    )
  }

  #[test]
  fn test_report_success_requires_every_kind() {
    let report: SyncReport = vec![ok(EntityKind::Stock, 3), ok(EntityKind::Ledger, 4)]
      .into_iter()
      .collect();
    assert!(report.is_success());
    assert!(report.check().is_ok());
    assert_eq!(report.total_records(), 7);

    let report: SyncReport = vec![ok(EntityKind::Stock, 3), failed(EntityKind::Ledger)]
      .into_iter()
      .collect();
    assert!(!report.is_success());
    match report.check() {
      Err(OrchestrationError::PartialFailure(failures)) => {
        assert_eq!(failures.len(), 1);
        assert!(failures.contains_key(&EntityKind::Ledger));
      }
      other => panic!("expected partial failure, got {:?}", other),
    }
  }

  #[test]
  fn test_failed_record_has_message_and_no_rows() {
    let record = failed(EntityKind::Outstanding);
    assert!(!record.success);
    assert_eq!(record.record_count, 0);
    assert_eq!(
      record.error_message().as_deref(),
      Some("network unavailable: down")
    );
    assert!(record.to_string().contains("FAILED"));
  }
}
