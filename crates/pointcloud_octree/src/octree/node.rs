//! Arena node types.
//!
//! Every octree cell is one [`OctreeNode`] in the owning octree's arena. The
//! cell's static description ([`GeometryNode`]) never moves; GPU residency is
//! a separate tag:
//!
//! ```text
//!            load ok              promote (upload)
//! Unloaded ─────────► Loaded ─────────────────────► Loaded + Tree
//!    │  ▲                                                 │
//!    │  └───────────────── evict (release buffer) ◄───────┘
//!    ▼
//! Loading ──── load error ────► Failed (terminal)
//! ```
//!
//! Parents refer to children by [`NodeId`], so promotion and eviction never
//! touch the parent's child slots.

use std::sync::Arc;

use glam::{DMat4, DVec3};

use super::NodeKey;
use crate::constants::OCTREE_CHILDREN;
use crate::geometry::{Aabb, Sphere};
use crate::loading::PointAttributes;
use crate::picking::GpuBuffer;

/// Index of a node inside its octree's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
  /// The root is always the first arena slot.
  pub const ROOT: NodeId = NodeId(0);

  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Point-data lifecycle of a cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LoadState {
  #[default]
  Unloaded,
  Loading,
  Loaded,
  /// Terminal: never retried automatically.
  Failed,
}

/// Static description of an octree cell plus its lazily-loaded points.
#[derive(Clone, Debug)]
pub struct GeometryNode {
  pub id: NodeId,
  pub key: NodeKey,
  pub level: u32,
  /// Point spacing at this level (halves per level).
  pub spacing: f64,
  /// Cell bounds in model space.
  pub bounding_box: Aabb,
  pub bounding_sphere: Sphere,
  /// `None` until the hierarchy describing this cell has been fetched.
  pub num_points: Option<u64>,
  pub children: [Option<NodeId>; OCTREE_CHILDREN],
  pub parent: Option<NodeId>,
  pub state: LoadState,
  /// Decoded attributes, present while `state == Loaded`.
  pub points: Option<Arc<PointAttributes>>,
  /// Tight bounds of the decoded points (model space).
  pub tight_bounds: Option<Aabb>,
  /// Mean of the decoded points (model space).
  pub mean: Option<DVec3>,
}

impl GeometryNode {
  pub(crate) fn new(id: NodeId, key: NodeKey, spacing: f64, bounding_box: Aabb, parent: Option<NodeId>) -> Self {
    Self {
      id,
      key,
      level: key.level,
      spacing,
      bounding_box,
      bounding_sphere: bounding_box.bounding_sphere(),
      num_points: None,
      children: [None; OCTREE_CHILDREN],
      parent,
      state: LoadState::Unloaded,
      points: None,
      tight_bounds: None,
      mean: None,
    }
  }

  /// Point count, treating an unknown count as zero.
  #[inline]
  pub fn point_count(&self) -> u64 {
    self.num_points.unwrap_or(0)
  }

  /// True while the descendant shape below this cell is unknown.
  #[inline]
  pub fn needs_hierarchy(&self) -> bool {
    self.num_points.is_none()
  }

  #[inline]
  pub fn is_loaded(&self) -> bool {
    self.state == LoadState::Loaded
  }

  #[inline]
  pub fn is_loading(&self) -> bool {
    self.state == LoadState::Loading
  }

  #[inline]
  pub fn has_failed(&self) -> bool {
    self.state == LoadState::Failed
  }

  pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.children.iter().flatten().copied()
  }

  /// Drop point data and return to `Unloaded`.
  pub(crate) fn unload(&mut self) {
    self.points = None;
    self.state = LoadState::Unloaded;
  }
}

/// Render-facing wrapper around a loaded cell.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
  pub buffer: GpuBuffer,
  /// Model-to-world transform including the cell origin offset.
  pub world_matrix: DMat4,
  /// Set by the visibility pass that last touched this node.
  pub visible: bool,
}

/// GPU residency tag of a node.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Residency {
  /// Point data is not on the GPU.
  #[default]
  Geometry,
  /// Point data is uploaded and renderable.
  Tree(TreeNode),
}

/// Arena entry: cell description plus residency.
#[derive(Clone, Debug)]
pub struct OctreeNode {
  pub geometry: GeometryNode,
  pub residency: Residency,
}

impl OctreeNode {
  pub(crate) fn new(geometry: GeometryNode) -> Self {
    Self {
      geometry,
      residency: Residency::Geometry,
    }
  }

  #[inline]
  pub fn id(&self) -> NodeId {
    self.geometry.id
  }

  #[inline]
  pub fn is_tree_node(&self) -> bool {
    matches!(self.residency, Residency::Tree(_))
  }

  #[inline]
  pub fn is_geometry_node(&self) -> bool {
    matches!(self.residency, Residency::Geometry)
  }

  pub fn tree(&self) -> Option<&TreeNode> {
    match &self.residency {
      Residency::Tree(tree) => Some(tree),
      Residency::Geometry => None,
    }
  }

  pub fn tree_mut(&mut self) -> Option<&mut TreeNode> {
    match &mut self.residency {
      Residency::Tree(tree) => Some(tree),
      Residency::Geometry => None,
    }
  }
}
