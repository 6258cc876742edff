//! NodeKey - immutable address of an octree cell.
//!
//! Keys follow the Entwine "D-X-Y-Z" convention: level 0 is the root (coarsest)
//! and grid coordinates are at the key's own level. The string form is what
//! names hierarchy and payload files.

use std::fmt;
use std::str::FromStr;

use crate::error::HierarchyError;

/// Octree cell address - immutable value type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeKey {
  /// Depth (0 = root)
  pub level: u32,
  /// Grid X position at this level
  pub x: u32,
  /// Grid Y position at this level
  pub y: u32,
  /// Grid Z position at this level
  pub z: u32,
}

impl NodeKey {
  pub const ROOT: NodeKey = NodeKey {
    level: 0,
    x: 0,
    y: 0,
    z: 0,
  };

  pub fn new(level: u32, x: u32, y: u32, z: u32) -> Self {
    Self { level, x, y, z }
  }

  /// Get child key (one level deeper).
  ///
  /// Octant: 0-7 where bits represent +X, +Y, +Z offsets:
  /// - bit 2: X offset (0 or 1)
  /// - bit 1: Y offset (0 or 1)
  /// - bit 0: Z offset (0 or 1)
  pub fn child(&self, octant: u8) -> Self {
    debug_assert!(octant < 8);
    Self {
      level: self.level + 1,
      x: self.x * 2 + ((octant >> 2) & 1) as u32,
      y: self.y * 2 + ((octant >> 1) & 1) as u32,
      z: self.z * 2 + (octant & 1) as u32,
    }
  }

  /// Get parent key. Returns None for the root.
  pub fn parent(&self) -> Option<Self> {
    if self.level == 0 {
      return None;
    }
    Some(Self {
      level: self.level - 1,
      x: self.x / 2,
      y: self.y / 2,
      z: self.z / 2,
    })
  }

  /// Octant this key occupies inside its parent.
  #[inline]
  pub fn octant_in_parent(&self) -> u8 {
    (((self.x & 1) << 2) | ((self.y & 1) << 1) | (self.z & 1)) as u8
  }

  /// Morton (Z-order) index of the cell at its level.
  pub fn morton(&self) -> u64 {
    fn spread(v: u32) -> u64 {
      // 21 bits per axis fit in 63 bits
      let mut x = (v as u64) & 0x1f_ffff;
      x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
      x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
      x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
      x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
      x = (x | (x << 2)) & 0x1249_2492_4924_9249;
      x
    }
    (spread(self.x) << 2) | (spread(self.y) << 1) | spread(self.z)
  }

  /// Sort key for breadth-first materialization: level, then Morton index.
  ///
  /// Parents always sort before their children.
  #[inline]
  pub fn breadth_first_order(&self) -> (u32, u64) {
    (self.level, self.morton())
  }

  /// True if `self` lies in the subtree rooted at `ancestor` (inclusive).
  pub fn is_descendant_of(&self, ancestor: &NodeKey) -> bool {
    if self.level < ancestor.level {
      return false;
    }
    let shift = self.level - ancestor.level;
    (self.x >> shift) == ancestor.x && (self.y >> shift) == ancestor.y && (self.z >> shift) == ancestor.z
  }
}

impl fmt::Display for NodeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-{}-{}", self.level, self.x, self.y, self.z)
  }
}

impl FromStr for NodeKey {
  type Err = HierarchyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split('-').map(|p| p.parse::<u32>());
    let invalid = || HierarchyError::InvalidKey(s.to_string());
    let mut next = || parts.next().ok_or_else(invalid)?.map_err(|_| invalid());
    let key = NodeKey::new(next()?, next()?, next()?, next()?);
    if parts.next().is_some() {
      return Err(invalid());
    }
    let extent = 1u64 << key.level.min(63);
    if key.x as u64 >= extent || key.y as u64 >= extent || key.z as u64 >= extent {
      return Err(invalid());
    }
    Ok(key)
  }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod key_test;
