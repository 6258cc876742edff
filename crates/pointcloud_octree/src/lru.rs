//! Least-recently-used tracking of GPU-resident nodes under a point budget.
//!
//! ```text
//! touch(A) touch(B) touch(C)        order: A(1) B(2) C(3)
//! free_memory (budget = B + C)      evict A  → B(2) C(3)
//! touch(B)                          order: C(3) B(4)
//! ```
//!
//! The cache never disposes anything itself: `free_memory` hands each victim
//! to a caller-supplied eviction callback, which reports every key it
//! released (a victim's resident descendants go with it).

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use tracing::debug;

#[derive(Clone, Copy, Debug)]
struct LruEntry {
  tick: u64,
  num_points: u64,
}

/// Recency-ordered set of resident keys with their point counts.
#[derive(Debug)]
pub struct Lru<K> {
  /// Oldest first.
  order: BTreeMap<u64, K>,
  entries: HashMap<K, LruEntry>,
  next_tick: u64,
  num_points: u64,
  point_budget: u64,
}

impl<K> Lru<K>
where
  K: Copy + Eq + Hash,
{
  pub fn new(point_budget: u64) -> Self {
    Self {
      order: BTreeMap::new(),
      entries: HashMap::new(),
      next_tick: 0,
      num_points: 0,
      point_budget,
    }
  }

  /// Mark `key` as most recently used, inserting it if absent.
  pub fn touch(&mut self, key: K, num_points: u64) {
    let tick = self.next_tick;
    self.next_tick += 1;

    if let Some(old) = self.entries.insert(key, LruEntry { tick, num_points }) {
      self.order.remove(&old.tick);
      self.num_points -= old.num_points;
    }
    self.order.insert(tick, key);
    self.num_points += num_points;
  }

  /// Forget `key`. Returns false if it was not tracked.
  pub fn remove(&mut self, key: &K) -> bool {
    match self.entries.remove(key) {
      Some(entry) => {
        self.order.remove(&entry.tick);
        self.num_points -= entry.num_points;
        true
      }
      None => false,
    }
  }

  #[inline]
  pub fn contains(&self, key: &K) -> bool {
    self.entries.contains_key(key)
  }

  /// Number of tracked keys.
  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Sum of tracked point counts.
  #[inline]
  pub fn num_points(&self) -> u64 {
    self.num_points
  }

  #[inline]
  pub fn point_budget(&self) -> u64 {
    self.point_budget
  }

  /// Change the budget. Returns true when the cache is now over budget and
  /// the caller should run [`Lru::free_memory`].
  pub fn set_point_budget(&mut self, point_budget: u64) -> bool {
    let shrunk = point_budget < self.point_budget;
    self.point_budget = point_budget;
    shrunk && self.is_over_budget()
  }

  #[inline]
  pub fn is_over_budget(&self) -> bool {
    self.num_points > self.point_budget
  }

  /// Keys from least to most recently used.
  pub fn iter_oldest_first(&self) -> impl Iterator<Item = &K> {
    self.order.values()
  }

  /// Evict least-recently-used keys until within budget.
  ///
  /// Keys for which `is_protected` returns true are skipped. `evict` disposes
  /// a victim and returns every key it released; all of them leave the cache.
  /// Returns the released keys in eviction order.
  pub fn free_memory<P, E>(&mut self, is_protected: P, mut evict: E) -> Vec<K>
  where
    P: Fn(&K) -> bool,
    E: FnMut(K) -> Vec<K>,
  {
    if !self.is_over_budget() {
      return Vec::new();
    }

    let candidates: Vec<K> = self.order.values().copied().filter(|k| !is_protected(k)).collect();
    let mut released = Vec::new();

    for key in candidates {
      if !self.is_over_budget() {
        break;
      }
      // Already released as a descendant of an earlier victim
      if !self.contains(&key) {
        continue;
      }
      let disposed = evict(key);
      self.remove(&key);
      for other in &disposed {
        self.remove(other);
      }
      if !disposed.contains(&key) {
        released.push(key);
      }
      released.extend(disposed);
    }

    debug!(
      released = released.len(),
      num_points = self.num_points,
      point_budget = self.point_budget,
      "LRU free_memory"
    );
    released
  }
}

#[cfg(test)]
#[path = "lru_test.rs"]
mod lru_test;
