//! Chunked, cancellable processing of large collections.
//!
//! `ProgressiveProcessor::process` splits a collection into fixed-size chunks,
//! runs a transform on each chunk in the compute pool, and yields the
//! cumulative output after every chunk. Chunks are processed and yielded
//! strictly in input order.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = processor.process(rows, |chunk| chunk.to_vec(), |p| {
//!     println!("{}/{}", p.done, p.total);
//! });
//!
//! while let Some(batch) = stream.next().await {
//!     render(&batch?.items);
//! }
//! ```
//!
//! Nothing runs until the stream is first polled. Dropping the stream stops
//! scheduling further chunks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::pools::{PoolError, WorkerPools};

/// Progress after a chunk completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
  pub done: usize,
  pub total: usize,
}

impl Progress {
  pub fn is_complete(&self) -> bool {
    self.done >= self.total
  }
}

/// One emission: everything processed so far.
#[derive(Debug, Clone)]
pub struct Processed<R> {
  pub progress: Progress,
  pub items: Vec<R>,
}

type Emission<R> = Result<Processed<R>, PoolError>;
type Producer = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone, Debug)]
pub struct ProgressiveProcessor {
  pools: WorkerPools,
  chunk_size: usize,
}

impl ProgressiveProcessor {
  pub fn new(pools: WorkerPools, chunk_size: usize) -> Self {
    Self {
      pools,
      chunk_size: chunk_size.max(1),
    }
  }

  /// Process `items` chunk by chunk.
  ///
  /// `step` maps one chunk to its output; `on_progress` is called after each
  /// chunk with monotonically increasing `done`. An empty input yields one
  /// empty emission with progress `0/0`.
  pub fn process<T, R, F, P>(&self, items: Vec<T>, step: F, mut on_progress: P) -> ProgressStream<R>
  where
    T: Send + Sync + 'static,
    R: Clone + Send + 'static,
    F: Fn(&[T]) -> Vec<R> + Send + Sync + 'static,
    P: FnMut(Progress) + Send + 'static,
  {
    // Capacity 1: the producer runs at most one chunk ahead of the consumer
    let (tx, rx) = mpsc::channel::<Emission<R>>(1);
    let pools = self.pools.clone();
    let chunk_size = self.chunk_size;
    let items = Arc::new(items);
    let step = Arc::new(step);

    let producer = async move {
      let total = items.len();
      let mut acc: Vec<R> = Vec::with_capacity(total);

      if total == 0 {
        let progress = Progress { done: 0, total: 0 };
        on_progress(progress);
        let _ = tx
          .send(Ok(Processed {
            progress,
            items: acc,
          }))
          .await;
        return;
      }

      let mut start = 0;
      while start < total {
        if tx.is_closed() {
          debug!(done = start, total, "consumer detached, stopping");
          return;
        }

        let end = (start + chunk_size).min(total);
        let chunk_items = Arc::clone(&items);
        let chunk_step = Arc::clone(&step);
        let output = pools
          .run_compute(move || chunk_step(&chunk_items[start..end]))
          .await;

        match output {
          Ok(output) => acc.extend(output),
          Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
          }
        }

        let progress = Progress { done: end, total };
        on_progress(progress);

        let emission = Processed {
          progress,
          items: acc.clone(),
        };
        if tx.send(Ok(emission)).await.is_err() {
          debug!(done = end, total, "consumer detached, stopping");
          return;
        }
        start = end;
      }
    };

    ProgressStream {
      rx,
      producer: Some(Box::pin(producer)),
      handle: None,
    }
  }
}

/// Lazy stream of cumulative results. Dropping it cancels the producer.
pub struct ProgressStream<R> {
  rx: mpsc::Receiver<Emission<R>>,
  producer: Option<Producer>,
  handle: Option<JoinHandle<()>>,
}

impl<R> ProgressStream<R> {
  /// Drain the stream and return the final cumulative result.
  pub async fn finish(mut self) -> Result<Processed<R>, PoolError>
  where
    R: Send + 'static,
  {
    let mut last = None;
    while let Some(emission) = self.next().await {
      last = Some(emission?);
    }
    last.ok_or(PoolError::Closed)
  }
}

impl<R> Stream for ProgressStream<R> {
  type Item = Emission<R>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if let Some(producer) = this.producer.take() {
      this.handle = Some(tokio::spawn(producer));
    }
    this.rx.poll_recv(cx)
  }
}

impl<R> Drop for ProgressStream<R> {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }
}
