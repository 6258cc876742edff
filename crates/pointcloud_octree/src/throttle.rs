//! Leading + trailing throttle for visibility passes.
//!
//! ```text
//! interval:   |<------ 100ms ------>|<------ 100ms ------>|
//! request:    R1    R2   R3
//! runs:       ▲ (leading)           ▲ (trailing, covers R2 + R3)
//! ```
//!
//! A burst of camera changes runs one pass immediately and one more once the
//! interval has elapsed, so the last camera state is always processed.

use std::time::Duration;

// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

#[derive(Clone, Debug)]
pub struct Throttle {
  interval: Duration,
  last_run: Option<Instant>,
  pending: bool,
}

impl Throttle {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last_run: None,
      pending: false,
    }
  }

  #[inline]
  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn set_interval(&mut self, interval: Duration) {
    self.interval = interval;
  }

  /// A trailing run is owed.
  #[inline]
  pub fn is_pending(&self) -> bool {
    self.pending
  }

  fn ready(&self, now: Instant) -> bool {
    self
      .last_run
      .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
  }

  /// Ask for a run. Returns true if the caller should run now; otherwise a
  /// trailing run is scheduled.
  pub fn request(&mut self, now: Instant) -> bool {
    if self.ready(now) {
      self.last_run = Some(now);
      self.pending = false;
      true
    } else {
      self.pending = true;
      false
    }
  }

  /// Returns true once when a scheduled trailing run is due.
  pub fn poll(&mut self, now: Instant) -> bool {
    if self.pending && self.ready(now) {
      self.last_run = Some(now);
      self.pending = false;
      true
    } else {
      false
    }
  }

  /// Forget the last run and any pending trailing run.
  pub fn reset(&mut self) {
    self.last_run = None;
    self.pending = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const INTERVAL: Duration = Duration::from_millis(100);

  #[test]
  fn test_leading_run_is_immediate() {
    let mut throttle = Throttle::new(INTERVAL);
    let t0 = Instant::now();
    assert!(throttle.request(t0));
    assert!(!throttle.is_pending());
  }

  #[test]
  fn test_burst_collapses_into_one_trailing_run() {
    let mut throttle = Throttle::new(INTERVAL);
    let t0 = Instant::now();
    assert!(throttle.request(t0));
    assert!(!throttle.request(t0 + Duration::from_millis(10)));
    assert!(!throttle.request(t0 + Duration::from_millis(20)));
    assert!(throttle.is_pending());

    assert!(!throttle.poll(t0 + Duration::from_millis(50)));
    assert!(throttle.poll(t0 + Duration::from_millis(100)));
    // Only once
    assert!(!throttle.poll(t0 + Duration::from_millis(300)));
  }

  #[test]
  fn test_poll_without_request_never_runs() {
    let mut throttle = Throttle::new(INTERVAL);
    let t0 = Instant::now();
    assert!(!throttle.poll(t0));
    assert!(!throttle.poll(t0 + Duration::from_secs(1)));
  }

  #[test]
  fn test_request_after_interval_runs_again() {
    let mut throttle = Throttle::new(INTERVAL);
    let t0 = Instant::now();
    assert!(throttle.request(t0));
    assert!(throttle.request(t0 + INTERVAL));
  }

  #[test]
  fn test_reset_allows_immediate_run() {
    let mut throttle = Throttle::new(INTERVAL);
    let t0 = Instant::now();
    throttle.request(t0);
    throttle.request(t0 + Duration::from_millis(1));
    throttle.reset();
    assert!(!throttle.is_pending());
    assert!(throttle.request(t0 + Duration::from_millis(2)));
  }
}
