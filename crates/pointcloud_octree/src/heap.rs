//! Binary min-heap keyed by a caller-supplied score.
//!
//! The visibility pass scores items with `1 / weight`, so `pop` yields the
//! highest-weight node first. Ordering among equal scores follows structural
//! position only (not insertion order).
//!
//! Invariant after every operation: `score(parent) <= score(child)`.

/// Array-backed binary heap ordered by `score`.
pub struct BinaryHeap<T, F>
where
  F: Fn(&T) -> f64,
{
  content: Vec<T>,
  score: F,
}

impl<T, F> BinaryHeap<T, F>
where
  F: Fn(&T) -> f64,
{
  pub fn new(score: F) -> Self {
    Self {
      content: Vec::new(),
      score,
    }
  }

  pub fn with_capacity(capacity: usize, score: F) -> Self {
    Self {
      content: Vec::with_capacity(capacity),
      score,
    }
  }

  /// Append and bubble up.
  pub fn push(&mut self, item: T) {
    self.content.push(item);
    self.bubble_up(self.content.len() - 1);
  }

  /// Remove the lowest-score item: move the last element to the root and sink it.
  pub fn pop(&mut self) -> Option<T> {
    let len = self.content.len();
    if len == 0 {
      return None;
    }
    let top = self.content.swap_remove(0);
    if !self.content.is_empty() {
      self.sink_down(0);
    }
    Some(top)
  }

  /// Lowest-score item without removing it.
  pub fn peek(&self) -> Option<&T> {
    self.content.first()
  }

  /// Remove the first item matching `predicate` (linear scan).
  pub fn remove_by<P>(&mut self, predicate: P) -> Option<T>
  where
    P: Fn(&T) -> bool,
  {
    let index = self.content.iter().position(predicate)?;
    let removed = self.content.swap_remove(index);
    if index < self.content.len() {
      // The moved element may violate either direction
      let score = (self.score)(&self.content[index]);
      if score < (self.score)(&removed) {
        self.bubble_up(index);
      } else {
        self.sink_down(index);
      }
    }
    Some(removed)
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.content.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.content.is_empty()
  }

  pub fn clear(&mut self) {
    self.content.clear();
  }

  /// Items in heap (array) order.
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.content.iter()
  }

  fn bubble_up(&mut self, mut index: usize) {
    let score = (self.score)(&self.content[index]);
    while index > 0 {
      let parent = (index - 1) / 2;
      if score >= (self.score)(&self.content[parent]) {
        break;
      }
      self.content.swap(index, parent);
      index = parent;
    }
  }

  fn sink_down(&mut self, mut index: usize) {
    let len = self.content.len();
    let score = (self.score)(&self.content[index]);
    loop {
      let left = 2 * index + 1;
      let right = left + 1;
      let mut smallest = index;
      let mut smallest_score = score;

      if left < len {
        let left_score = (self.score)(&self.content[left]);
        if left_score < smallest_score {
          smallest = left;
          smallest_score = left_score;
        }
      }
      if right < len && (self.score)(&self.content[right]) < smallest_score {
        smallest = right;
      }
      if smallest == index {
        break;
      }
      self.content.swap(index, smallest);
      index = smallest;
    }
  }
}

impl<T: PartialEq, F> BinaryHeap<T, F>
where
  F: Fn(&T) -> f64,
{
  /// Remove `item` if present (linear scan).
  pub fn remove(&mut self, item: &T) -> Option<T> {
    self.remove_by(|candidate| candidate == item)
  }
}

#[cfg(test)]
#[path = "heap_test.rs"]
mod heap_test;
