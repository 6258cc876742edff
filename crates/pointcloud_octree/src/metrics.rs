//! Streaming statistics: visibility, residency, pass timing, load latency.
//!
//! Compiled in with the `metrics` feature and toggled at runtime through
//! [`COLLECT_METRICS`]. Without the feature every `record_*` call is a no-op.
//!
//! ```ignore
//! use std::sync::atomic::Ordering;
//! use pointcloud_octree::metrics::COLLECT_METRICS;
//!
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//! let avg = manager.metrics().avg_pass_us();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

use crate::loading::CompletionSummary;
use crate::visibility::VisibilityUpdate;

/// Runtime switch, only consulted when the `metrics` feature is enabled.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// True when metrics are compiled in and switched on.
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Fixed-capacity history; the oldest sample falls out first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  samples: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      samples: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  pub fn push(&mut self, value: T) {
    if self.capacity == 0 {
      return;
    }
    if self.samples.len() == self.capacity {
      self.samples.pop_front();
    }
    self.samples.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn clear(&mut self) {
    self.samples.clear();
  }

  /// Oldest to newest.
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.samples.iter()
  }

  pub fn last(&self) -> Option<&T> {
    self.samples.back()
  }
}

impl RollingWindow<u64> {
  pub fn sum(&self) -> u64 {
    self.samples.iter().sum()
  }

  pub fn average(&self) -> f64 {
    if self.samples.is_empty() {
      return 0.0;
    }
    self.sum() as f64 / self.samples.len() as f64
  }

  pub fn max(&self) -> Option<u64> {
    self.samples.iter().copied().max()
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    // ~2 seconds of passes at 60 Hz
    Self::new(128)
  }
}

/// Scene-level counters updated by the manager.
#[derive(Debug, Clone, Default)]
pub struct StreamingMetrics {
  /// Visible nodes after the last pass.
  pub visible_nodes: usize,
  /// Visible points after the last pass.
  pub visible_points: u64,
  /// GPU-resident nodes tracked by the LRU.
  pub resident_nodes: usize,
  /// GPU-resident points tracked by the LRU.
  pub resident_points: u64,

  /// Visibility pass durations in microseconds.
  pub pass_timings: RollingWindow<u64>,
  /// Request-to-apply load latencies in microseconds.
  pub load_latencies: RollingWindow<u64>,
  pub last_pass_us: u64,

  // Cumulative over the session
  pub total_passes: u64,
  pub total_promoted: u64,
  pub total_loaded: u64,
  pub total_failed: u64,
  pub total_evicted: u64,
}

impl StreamingMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record the outcome and duration of a visibility pass.
  pub fn record_pass(&mut self, update: &VisibilityUpdate, elapsed_us: u64) {
    if !is_enabled() {
      return;
    }
    self.visible_nodes = update.visible_nodes.len();
    self.visible_points = update.num_visible_points;
    self.pass_timings.push(elapsed_us);
    self.last_pass_us = elapsed_us;
    self.total_passes += 1;
    self.total_promoted += update.promoted as u64;
    self.total_evicted += update.evicted.len() as u64;
  }

  /// Record applied load completions.
  pub fn record_completions(&mut self, summary: &CompletionSummary) {
    if !is_enabled() {
      return;
    }
    self.total_loaded += summary.loaded.len() as u64;
    self.total_failed += summary.failed.len() as u64;
    for latency in &summary.latencies {
      self.load_latencies.push(latency.as_micros() as u64);
    }
  }

  pub fn record_residency(&mut self, nodes: usize, points: u64) {
    if !is_enabled() {
      return;
    }
    self.resident_nodes = nodes;
    self.resident_points = points;
  }

  /// Nodes released outside a pass (budget change, model removal).
  pub fn record_evicted(&mut self, count: usize) {
    if is_enabled() {
      self.total_evicted += count as u64;
    }
  }

  pub fn avg_pass_us(&self) -> f64 {
    self.pass_timings.average()
  }

  pub fn avg_load_latency_us(&self) -> f64 {
    self.load_latencies.average()
  }

  /// Clear per-frame values and histories; cumulative totals are kept.
  pub fn reset(&mut self) {
    self.visible_nodes = 0;
    self.visible_points = 0;
    self.resident_nodes = 0;
    self.resident_points = 0;
    self.pass_timings.clear();
    self.load_latencies.clear();
    self.last_pass_us = 0;
  }
}
