//! Injected in-flight load counter and the loading state derived from it.
//!
//! One counter is shared by the loader and the manager of a scene; separate
//! scenes in the same process get separate counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot reported to loading-state subscribers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadingState {
  pub is_loading: bool,
  /// Loads finished (successfully or not) since the counter was created.
  pub items_loaded: u64,
  /// Loads started since the counter was created.
  pub items_requested: u64,
}

#[derive(Debug, Default)]
struct CounterInner {
  in_flight: AtomicUsize,
  requested: AtomicU64,
  loaded: AtomicU64,
  failed: AtomicU64,
}

/// Cloneable handle; all clones see the same counts.
#[derive(Clone, Debug, Default)]
pub struct LoadCounter {
  inner: Arc<CounterInner>,
}

impl LoadCounter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Loads currently in flight.
  #[inline]
  pub fn in_flight(&self) -> usize {
    self.inner.in_flight.load(Ordering::Acquire)
  }

  /// Reserve a slot if fewer than `limit` loads are in flight.
  pub fn try_begin(&self, limit: usize) -> bool {
    let reserved = self
      .inner
      .in_flight
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
      .is_ok();
    if reserved {
      self.inner.requested.fetch_add(1, Ordering::Relaxed);
    }
    reserved
  }

  /// Release a slot taken by [`LoadCounter::try_begin`].
  pub fn finish(&self, success: bool) {
    let _ = self
      .inner
      .in_flight
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    self.inner.loaded.fetch_add(1, Ordering::Relaxed);
    if !success {
      self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub fn failed(&self) -> u64 {
    self.inner.failed.load(Ordering::Relaxed)
  }

  pub fn state(&self) -> LoadingState {
    LoadingState {
      is_loading: self.in_flight() > 0,
      items_loaded: self.inner.loaded.load(Ordering::Relaxed),
      items_requested: self.inner.requested.load(Ordering::Relaxed),
    }
  }
}
