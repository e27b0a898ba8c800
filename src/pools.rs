//! Bounded worker pools.
//!
//! Two independent permit pools: one for network/file/database I/O and one for
//! CPU-bound chunk transforms. Blocking work runs on tokio's blocking threads,
//! but only while holding a permit from its pool, so a large batch transform
//! can never take the slots that network and database calls need.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("worker pool is shut down")]
  Closed,

  #[error("worker task panicked: {0}")]
  Panicked(String),
}

#[derive(Clone, Debug)]
pub struct WorkerPools {
  io: Arc<Semaphore>,
  compute: Arc<Semaphore>,
}

impl WorkerPools {
  pub fn new(io_concurrency: usize, compute_concurrency: usize) -> Self {
    Self {
      io: Arc::new(Semaphore::new(io_concurrency.max(1))),
      compute: Arc::new(Semaphore::new(compute_concurrency.max(1))),
    }
  }

  pub async fn io_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
    Arc::clone(&self.io)
      .acquire_owned()
      .await
      .map_err(|_| PoolError::Closed)
  }

  pub async fn compute_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
    Arc::clone(&self.compute)
      .acquire_owned()
      .await
      .map_err(|_| PoolError::Closed)
  }

  /// Await an async I/O operation while holding an I/O permit.
  pub async fn io<Fut>(&self, fut: Fut) -> Result<Fut::Output, PoolError>
  where
    Fut: Future,
  {
    let _permit = self.io_permit().await?;
    Ok(fut.await)
  }

  /// Run blocking I/O (SQLite, files) on a blocking thread under an I/O permit.
  pub async fn run_io<F, R>(&self, f: F) -> Result<R, PoolError>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let permit = self.io_permit().await?;
    run_blocking(permit, f).await
  }

  /// Run a CPU-bound transform on a blocking thread under a compute permit.
  pub async fn run_compute<F, R>(&self, f: F) -> Result<R, PoolError>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let permit = self.compute_permit().await?;
    run_blocking(permit, f).await
  }
}

impl Default for WorkerPools {
  fn default() -> Self {
    Self::new(4, 2)
  }
}

async fn run_blocking<F, R>(permit: OwnedSemaphorePermit, f: F) -> Result<R, PoolError>
where
  F: FnOnce() -> R + Send + 'static,
  R: Send + 'static,
{
  tokio::task::spawn_blocking(move || {
    let _permit = permit;
    f()
  })
  .await
  .map_err(|e| PoolError::Panicked(e.to_string()))
}
