//! Run-once background work polled from a ticking loop.
//!
//! A `BackgroundTask<T>` spawns one future on the runtime and delivers its
//! single result through a oneshot channel. The caller never blocks: it calls
//! `poll()` on each tick and collects the value with `take()`.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = orchestrator.clone();
//! let mut task = BackgroundTask::spawn(async move {
//!     orchestrator.sync_all(user, &year).await
//! });
//!
//! loop {
//!     ticker.tick().await;
//!     if task.poll() {
//!         break;
//!     }
//!     render_spinner(task.elapsed());
//! }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState<T> {
  /// Not started yet
  Idle,
  Running,
  /// Completed and delivered its result
  Finished(T),
  /// Aborted, or the worker ended without producing a result
  Cancelled,
}

impl<T> TaskState<T> {
  pub fn is_running(&self) -> bool {
    matches!(self, TaskState::Running)
  }
}

pub struct BackgroundTask<T> {
  state: TaskState<T>,
  receiver: Option<oneshot::Receiver<T>>,
  handle: Option<JoinHandle<()>>,
  started_at: Option<Instant>,
  elapsed: Option<Duration>,
}

impl<T: Send + 'static> BackgroundTask<T> {
  pub fn new() -> Self {
    Self {
      state: TaskState::Idle,
      receiver: None,
      handle: None,
      started_at: None,
      elapsed: None,
    }
  }

  /// Create a task and start it immediately.
  pub fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = T> + Send + 'static,
  {
    let mut task = Self::new();
    task.start(future);
    task
  }

  /// Start `future` unless a previous run is still in progress.
  ///
  /// Returns false when the task was already running.
  pub fn start<Fut>(&mut self, future: Fut) -> bool
  where
    Fut: Future<Output = T> + Send + 'static,
  {
    if self.state.is_running() {
      return false;
    }

    let (tx, rx) = oneshot::channel();
    self.receiver = Some(rx);
    self.state = TaskState::Running;
    self.started_at = Some(Instant::now());
    self.elapsed = None;

    self.handle = Some(tokio::spawn(async move {
      // Receiver may already be gone if the task was cancelled
      let _ = tx.send(future.await);
    }));
    true
  }

  /// Check for a result without blocking.
  ///
  /// Returns true when the state changed on this call.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(value) => {
        self.finish(TaskState::Finished(value));
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.finish(TaskState::Cancelled);
        true
      }
    }
  }

  /// Abort a running task. A result already sent is discarded.
  pub fn cancel(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
    if self.state.is_running() {
      self.finish(TaskState::Cancelled);
    }
  }

  pub fn is_running(&self) -> bool {
    self.state.is_running()
  }

  /// Move the result out, leaving the task idle.
  pub fn take(&mut self) -> Option<T> {
    match std::mem::replace(&mut self.state, TaskState::Idle) {
      TaskState::Finished(value) => Some(value),
      other => {
        self.state = other;
        None
      }
    }
  }

  /// Time spent running so far, or the total run time once finished.
  pub fn elapsed(&self) -> Duration {
    match (self.elapsed, self.started_at) {
      (Some(elapsed), _) => elapsed,
      (None, Some(started)) => started.elapsed(),
      (None, None) => Duration::ZERO,
    }
  }

  fn finish(&mut self, state: TaskState<T>) {
    self.state = state;
    self.receiver = None;
    self.handle = None;
    self.elapsed = self.started_at.map(|t| t.elapsed());
  }
}

impl<T: Send + 'static> Default for BackgroundTask<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BackgroundTask<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BackgroundTask")
      .field("state", &self.state)
      .field("started_at", &self.started_at)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_task_delivers_result_once() {
    let mut task = BackgroundTask::spawn(async { vec![1, 2, 3] });
    assert!(task.is_running());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(task.poll());
    // Nothing further to deliver
    assert!(!task.poll());
    assert_eq!(task.take(), Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_poll_before_completion_is_unchanged() {
    let mut task = BackgroundTask::spawn(async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      1
    });
    assert!(!task.poll());
    assert!(task.is_running());
  }

  #[tokio::test]
  async fn test_start_while_running_is_noop() {
    let runs = Arc::new(AtomicU32::new(0));
    let mut task = BackgroundTask::new();

    let first = Arc::clone(&runs);
    assert!(task.start(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      first.fetch_add(1, Ordering::SeqCst)
    }));

    let second = Arc::clone(&runs);
    assert!(!task.start(async move { second.fetch_add(100, Ordering::SeqCst) }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(task.poll());
    assert_eq!(task.take(), Some(0));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_cancel_aborts_work() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let mut task = BackgroundTask::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      counter.fetch_add(1, Ordering::SeqCst)
    });

    task.cancel();
    assert!(!task.is_running());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.poll());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_take_resets_to_idle() {
    let mut task = BackgroundTask::spawn(async { "done" });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(task.poll());
    assert_eq!(task.take(), Some("done"));
    assert_eq!(task.take(), None);
    // Idle again, so a new run can start
    assert!(task.start(async { "again" }));
  }
}
