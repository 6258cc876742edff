//! Hierarchy files: parse on a worker, materialize on the main thread.
//!
//! A hierarchy file is a JSON object mapping `"D-X-Y-Z"` keys to point counts.
//! A count of `-1` means the subtree below that key lives in its own file,
//! fetched when that node is first loaded.
//!
//! ```json
//! { "0-0-0-0": 65341, "1-0-0-0": 438, "1-1-0-0": -1 }
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};

use super::node::NodeId;
use super::tree::PointCloudOctree;
use super::NodeKey;
use crate::error::HierarchyError;

/// One parsed hierarchy record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HierarchyEntry {
  pub key: NodeKey,
  /// `None` when the count lives in a deeper hierarchy file.
  pub num_points: Option<u64>,
}

/// Parse a hierarchy document into entries sorted breadth-first.
///
/// Sort order is level, then Morton index, so every parent precedes its
/// children.
#[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "hierarchy::parse"))]
pub fn parse_hierarchy(bytes: &[u8]) -> Result<Vec<HierarchyEntry>, HierarchyError> {
  let raw: HashMap<String, i64> = serde_json::from_slice(bytes)?;

  let mut entries = raw
    .into_iter()
    .map(|(key, count)| {
      Ok(HierarchyEntry {
        key: key.parse()?,
        num_points: u64::try_from(count).ok(),
      })
    })
    .collect::<Result<Vec<_>, HierarchyError>>()?;

  entries.sort_by_key(|e| e.key.breadth_first_order());
  Ok(entries)
}

impl PointCloudOctree {
  /// Attach hierarchy entries below `origin`.
  ///
  /// Entries must be sorted breadth-first (see [`parse_hierarchy`]). Entries
  /// outside the origin's subtree, or whose parent is missing, are skipped.
  /// Returns the number of nodes created or updated.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "hierarchy::materialize"))]
  pub fn apply_hierarchy(&mut self, origin: NodeId, entries: &[HierarchyEntry]) -> usize {
    let origin_key = self.node(origin).geometry.key;
    let mut applied = 0;

    for entry in entries {
      if entry.key == origin_key {
        if entry.num_points.is_some() {
          self.node_mut(origin).geometry.num_points = entry.num_points;
          applied += 1;
        }
        continue;
      }
      if !entry.key.is_descendant_of(&origin_key) {
        debug!(key = %entry.key, origin = %origin_key, "Hierarchy entry outside origin subtree");
        continue;
      }
      let Some(parent) = entry.key.parent().and_then(|p| self.find(&p)) else {
        warn!(key = %entry.key, "Hierarchy entry has no parent, skipping");
        continue;
      };
      self.insert_child(parent, entry.key.octant_in_parent(), entry.num_points);
      applied += 1;
    }

    applied
  }
}

#[cfg(test)]
#[path = "hierarchy_test.rs"]
mod hierarchy_test;
