//! Sliding-window pagination over a filtered collection.
//!
//! The filtered collection is computed once by `init` through the
//! `ProgressiveProcessor`. `load_more` extends the visible window by one page
//! and, once `max_visible` is exceeded, evicts from the front so memory held
//! by the view stays bounded.

use std::sync::Arc;

use tracing::debug;

use crate::config::PaginationConfig;
use crate::pools::PoolError;
use crate::progressive::ProgressiveProcessor;

/// One view over a filtered collection.
///
/// `visible` is always `all_filtered[window_start..window_start + visible.len()]`.
#[derive(Debug, Clone)]
pub struct PaginationState<T> {
  all_filtered: Arc<[T]>,
  window_start: usize,
  window_size: usize,
  visible: Vec<T>,
  has_more: bool,
  is_loading: bool,
}

impl<T: Clone> PaginationState<T> {
  /// Placeholder shown while `init` is still filtering.
  fn loading(window_size: usize) -> Self {
    Self {
      all_filtered: Arc::from(Vec::new()),
      window_start: 0,
      window_size,
      visible: Vec::new(),
      has_more: false,
      is_loading: true,
    }
  }

  fn window(all_filtered: Arc<[T]>, start: usize, end: usize, window_size: usize) -> Self {
    let visible = all_filtered[start..end].to_vec();
    let has_more = end < all_filtered.len();
    Self {
      all_filtered,
      window_start: start,
      window_size,
      visible,
      has_more,
      is_loading: false,
    }
  }

  pub fn visible(&self) -> &[T] {
    &self.visible
  }

  pub fn window_start(&self) -> usize {
    self.window_start
  }

  /// Exclusive end of the visible window within the filtered collection.
  pub fn window_end(&self) -> usize {
    self.window_start + self.visible.len()
  }

  pub fn total(&self) -> usize {
    self.all_filtered.len()
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn is_loading(&self) -> bool {
    self.is_loading
  }
}

#[derive(Clone, Debug)]
pub struct PaginationEngine {
  processor: ProgressiveProcessor,
  page_size: usize,
  max_visible: usize,
}

impl PaginationEngine {
  pub fn new(processor: ProgressiveProcessor, page_size: usize, max_visible: usize) -> Self {
    let page_size = page_size.max(1);
    Self {
      processor,
      page_size,
      max_visible: max_visible.max(page_size),
    }
  }

  pub fn from_config(processor: ProgressiveProcessor, config: &PaginationConfig) -> Self {
    Self::new(processor, config.page_size, config.max_visible)
  }

  /// State to show until `init` completes.
  pub fn loading<T: Clone>(&self) -> PaginationState<T> {
    PaginationState::loading(self.page_size)
  }

  /// Filter `all_items` in chunks and expose the first page.
  pub async fn init<T, P>(&self, all_items: Vec<T>, predicate: P) -> Result<PaginationState<T>, PoolError>
  where
    T: Clone + Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
  {
    let filtered = self
      .processor
      .process(
        all_items,
        move |chunk: &[T]| chunk.iter().filter(|item| predicate(item)).cloned().collect(),
        |progress| {
          debug!(done = progress.done, total = progress.total, complete = progress.is_complete(), "filtering")
        },
      )
      .finish()
      .await?
      .items;

    let all_filtered: Arc<[T]> = Arc::from(filtered);
    let end = self.page_size.min(all_filtered.len());
    Ok(PaginationState::window(all_filtered, 0, end, self.page_size))
  }

  /// Extend the window by one page, sliding past `max_visible`.
  ///
  /// Returns the state unchanged when nothing more can be loaded.
  pub fn load_more<T: Clone>(&self, state: &PaginationState<T>) -> PaginationState<T> {
    if !state.has_more || state.is_loading {
      return state.clone();
    }

    let total = state.total();
    let end = (state.window_end() + state.window_size).min(total);
    let start = end.saturating_sub(self.max_visible).max(state.window_start);
    if start > state.window_start {
      debug!(evicted = start - state.window_start, start, end, "window slid");
    }
    PaginationState::window(Arc::clone(&state.all_filtered), start, end, state.window_size)
  }
}
