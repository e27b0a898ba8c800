//! Error types for the sync and cache tiers.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::report::types::EntityKind;

/// Failure to obtain a collection from the remote service.
///
/// Every variant is recoverable: the caller falls back to cached data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// Transport failed, timed out, or offline mode is enabled.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// Non-2xx status, or a 2xx envelope with `isSuccess = false`.
  #[error("server error {code}: {message}")]
  ServerError { code: u16, message: String },

  /// The body could not be decoded into typed records.
  #[error("malformed response: {0}")]
  MalformedResponse(String),
}

impl FetchError {
  /// Returns true if retrying after a short wait is likely to help.
  pub fn is_retryable(&self) -> bool {
    match self {
      FetchError::NetworkUnavailable(_) => true,
      FetchError::ServerError { code, .. } => *code >= 500 || *code == 429,
      FetchError::MalformedResponse(_) => false,
    }
  }
}

/// Failure while writing to or reading from a local tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
  #[error("write failed: {0}")]
  WriteFailed(String),

  #[error("corrupt data: {0}")]
  Corrupt(String),
}

impl From<rusqlite::Error> for PersistenceError {
  fn from(e: rusqlite::Error) -> Self {
    PersistenceError::WriteFailed(e.to_string())
  }
}

impl From<std::io::Error> for PersistenceError {
  fn from(e: std::io::Error) -> Self {
    PersistenceError::WriteFailed(e.to_string())
  }
}

impl From<serde_json::Error> for PersistenceError {
  fn from(e: serde_json::Error) -> Self {
    PersistenceError::Corrupt(e.to_string())
  }
}

/// Why a single-kind sync did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// Unexpected failure while persisting fetched data.
  #[error(transparent)]
  Persistence(#[from] PersistenceError),
}

impl SyncFailure {
  pub fn is_retryable(&self) -> bool {
    match self {
      SyncFailure::Fetch(e) => e.is_retryable(),
      SyncFailure::Persistence(_) => false,
    }
  }
}

/// Errors surfaced from multi-kind sync runs.
///
/// Informational only: every kind that failed still has its previous
/// cached data available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
  #[error("{}", PartialSummary(.0))]
  PartialFailure(BTreeMap<EntityKind, SyncFailure>),
}

struct PartialSummary<'a>(&'a BTreeMap<EntityKind, SyncFailure>);

impl fmt::Display for PartialSummary<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} kind(s) failed to sync:", self.0.len())?;
    for (kind, failure) in self.0 {
      write!(f, " [{}: {}]", kind, failure)?;
    }
    Ok(())
  }
}
