//! PointCloudOctree - one streamed point-cloud model.
//!
//! Nodes live in an arena (`Vec<OctreeNode>`) addressed by [`NodeId`]; parent
//! and child links are indices. The arena only grows: hierarchy stubs are
//! appended as hierarchy files arrive and are never removed, so a `NodeId`
//! stays valid for the life of the model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{DMat4, DVec3};
use tracing::{debug, warn};

use super::node::{GeometryNode, LoadState, NodeId, OctreeNode, Residency, TreeNode};
use super::NodeKey;
use crate::constants::DEFAULT_MIN_NODE_PIXEL_SIZE;
use crate::error::{MetadataError, RenderError};
use crate::geometry::{Aabb, Sphere};
use crate::loading::{EptMetadata, NodeSource, PointSchema};
use crate::picking::PointRenderer;

// =============================================================================
// ModelId - unique identifier
// =============================================================================

/// Atomic counter for generating unique ModelIds.
static MODEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque model identifier.
///
/// Generated atomically - guaranteed unique within process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
  /// Generate a new unique ModelId.
  pub fn new() -> Self {
    Self(MODEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  /// Get the raw ID value.
  pub fn raw(&self) -> u64 {
    self.0
  }
}

impl Default for ModelId {
  fn default() -> Self {
    Self::new()
  }
}

// =============================================================================
// PointCloudOctree
// =============================================================================

/// Arena-backed octree for one model plus its per-frame visibility state.
pub struct PointCloudOctree {
  id: ModelId,
  nodes: Vec<OctreeNode>,
  key_index: HashMap<NodeKey, NodeId>,
  bounding_box: Aabb,
  spacing: f64,
  schema: Arc<PointSchema>,
  source: Arc<dyn NodeSource>,
  disposed: bool,

  /// Model-to-world transform.
  pub world_matrix: DMat4,
  /// Hidden models are skipped by the visibility pass.
  pub visible: bool,
  /// Nodes deeper than this are never shown.
  pub max_level: Option<u32>,
  /// Children projecting smaller than this (pixels) are not enqueued.
  pub min_node_pixel_size: f64,

  pub(crate) visible_nodes: Vec<NodeId>,
  pub(crate) visible_geometry: Vec<NodeId>,
  pub(crate) num_visible_points: u64,
}

impl PointCloudOctree {
  /// Create a model whose root covers `bounding_box`.
  ///
  /// The root starts unloaded with an unknown point count, so the first load
  /// fetches its hierarchy.
  pub fn new(bounding_box: Aabb, spacing: f64, schema: Arc<PointSchema>, source: Arc<dyn NodeSource>) -> Self {
    let root = GeometryNode::new(NodeId::ROOT, NodeKey::ROOT, spacing, bounding_box, None);
    let mut key_index = HashMap::new();
    key_index.insert(NodeKey::ROOT, NodeId::ROOT);

    Self {
      id: ModelId::new(),
      nodes: vec![OctreeNode::new(root)],
      key_index,
      bounding_box,
      spacing,
      schema,
      source,
      disposed: false,
      world_matrix: DMat4::IDENTITY,
      visible: true,
      max_level: None,
      min_node_pixel_size: DEFAULT_MIN_NODE_PIXEL_SIZE,
      visible_nodes: Vec::new(),
      visible_geometry: Vec::new(),
      num_visible_points: 0,
    }
  }

  /// Build a model from parsed EPT metadata.
  pub fn from_ept(metadata: &EptMetadata, source: Arc<dyn NodeSource>) -> Result<Self, MetadataError> {
    let schema = PointSchema::from_fields(&metadata.schema)?;
    Ok(Self::new(
      metadata.bounding_box()?,
      metadata.spacing()?,
      Arc::new(schema),
      source,
    ))
  }

  /// Fetch and parse `ept.json` from `source`, then build the model.
  pub fn open(source: Arc<dyn NodeSource>) -> Result<Self, MetadataError> {
    let bytes = source.fetch_metadata()?;
    let metadata = EptMetadata::from_json(&bytes)?;
    Self::from_ept(&metadata, source)
  }

  // ---------------------------------------------------------------------------
  // Accessors
  // ---------------------------------------------------------------------------

  #[inline]
  pub fn id(&self) -> ModelId {
    self.id
  }

  #[inline]
  pub fn root(&self) -> NodeId {
    NodeId::ROOT
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &OctreeNode {
    &self.nodes[id.index()]
  }

  #[inline]
  pub fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
    &mut self.nodes[id.index()]
  }

  #[inline]
  pub fn get(&self, id: NodeId) -> Option<&OctreeNode> {
    self.nodes.get(id.index())
  }

  /// Look up a node by its key.
  pub fn find(&self, key: &NodeKey) -> Option<NodeId> {
    self.key_index.get(key).copied()
  }

  /// Number of materialized nodes.
  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &OctreeNode> {
    self.nodes.iter()
  }

  #[inline]
  pub fn bounding_box(&self) -> Aabb {
    self.bounding_box
  }

  pub fn bounding_sphere(&self) -> Sphere {
    self.bounding_box.bounding_sphere()
  }

  /// Point spacing at the root level.
  #[inline]
  pub fn spacing(&self) -> f64 {
    self.spacing
  }

  pub fn schema(&self) -> &Arc<PointSchema> {
    &self.schema
  }

  pub fn source(&self) -> &Arc<dyn NodeSource> {
    &self.source
  }

  #[inline]
  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  /// Tree nodes marked visible by the last visibility pass.
  pub fn visible_nodes(&self) -> &[NodeId] {
    &self.visible_nodes
  }

  /// Geometry nodes the last pass wanted but could not show yet.
  pub fn visible_geometry(&self) -> &[NodeId] {
    &self.visible_geometry
  }

  /// Points accumulated by the last pass for this model.
  #[inline]
  pub fn num_visible_points(&self) -> u64 {
    self.num_visible_points
  }

  /// Sum of point counts of GPU-resident nodes.
  pub fn resident_points(&self) -> u64 {
    self
      .nodes
      .iter()
      .filter(|n| n.is_tree_node())
      .map(|n| n.geometry.point_count())
      .sum()
  }

  /// Ids of GPU-resident nodes.
  pub fn resident_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.nodes.iter().filter(|n| n.is_tree_node()).map(|n| n.id())
  }

  // ---------------------------------------------------------------------------
  // Structure
  // ---------------------------------------------------------------------------

  /// Attach (or update) the child of `parent` at `octant`.
  ///
  /// An existing child keeps its id; only an unknown point count is filled in.
  pub fn insert_child(&mut self, parent: NodeId, octant: u8, num_points: Option<u64>) -> NodeId {
    if let Some(existing) = self.nodes[parent.index()].geometry.children[octant as usize] {
      let child = &mut self.nodes[existing.index()].geometry;
      if child.num_points.is_none() {
        child.num_points = num_points;
      }
      return existing;
    }

    let parent_geometry = &self.nodes[parent.index()].geometry;
    let key = parent_geometry.key.child(octant);
    let bounding_box = parent_geometry.bounding_box.octant(octant);
    let spacing = parent_geometry.spacing * 0.5;

    let id = NodeId(self.nodes.len() as u32);
    let mut geometry = GeometryNode::new(id, key, spacing, bounding_box, Some(parent));
    geometry.num_points = num_points;
    self.nodes.push(OctreeNode::new(geometry));
    self.key_index.insert(key, id);
    self.nodes[parent.index()].geometry.children[octant as usize] = Some(id);
    id
  }

  /// Depth-first ids of the subtree rooted at `id` (inclusive).
  pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
      out.push(current);
      stack.extend(self.nodes[current.index()].geometry.child_ids());
    }
    out
  }

  // ---------------------------------------------------------------------------
  // Residency transitions
  // ---------------------------------------------------------------------------

  /// World transform for a resident node: model transform times cell origin.
  ///
  /// Decoded positions are stored relative to the cell's minimum corner.
  pub fn node_world_matrix(&self, id: NodeId) -> DMat4 {
    let origin: DVec3 = self.nodes[id.index()].geometry.bounding_box.min;
    self.world_matrix * DMat4::from_translation(origin)
  }

  /// Upload a loaded node's points and make it a tree node.
  ///
  /// Returns `Ok(false)` when the node is not eligible (not loaded, already
  /// resident, or model disposed).
  pub fn promote(&mut self, id: NodeId, renderer: &mut dyn PointRenderer) -> Result<bool, RenderError> {
    if self.disposed {
      return Ok(false);
    }
    let world_matrix = self.node_world_matrix(id);
    let node = &mut self.nodes[id.index()];
    if node.is_tree_node() || !node.geometry.is_loaded() {
      return Ok(false);
    }
    let Some(points) = node.geometry.points.as_ref() else {
      return Ok(false);
    };

    let buffer = renderer.upload_points(points)?;
    node.residency = Residency::Tree(TreeNode {
      buffer,
      world_matrix,
      visible: false,
    });
    Ok(true)
  }

  /// Evict `id` and every loaded descendant back to unloaded geometry.
  ///
  /// Releases GPU buffers and drops point data; child slots are untouched so
  /// the same `NodeId`s stay attached. Returns the nodes that were resident.
  pub fn demote_subtree(&mut self, id: NodeId, renderer: &mut dyn PointRenderer) -> Vec<NodeId> {
    let mut released = Vec::new();
    for current in self.subtree(id) {
      let node = &mut self.nodes[current.index()];
      if let Residency::Tree(tree) = std::mem::take(&mut node.residency) {
        renderer.release_points(tree.buffer);
        released.push(current);
      }
      if node.geometry.state == LoadState::Loaded {
        node.geometry.unload();
      }
    }
    debug!(
      model = self.id.raw(),
      root = %self.nodes[id.index()].geometry.key,
      released = released.len(),
      "Demoted subtree"
    );
    released
  }

  /// Refresh the cached transform of a resident node.
  pub fn update_tree_world_matrix(&mut self, id: NodeId) {
    let world_matrix = self.node_world_matrix(id);
    if let Some(tree) = self.nodes[id.index()].tree_mut() {
      tree.world_matrix = world_matrix;
    }
  }

  /// Clear per-pass state before a visibility pass.
  pub(crate) fn reset_visibility(&mut self) {
    for id in self.visible_nodes.drain(..) {
      if let Some(tree) = self.nodes[id.index()].tree_mut() {
        tree.visible = false;
      }
    }
    self.visible_geometry.clear();
    self.num_visible_points = 0;
  }

  /// Release every GPU buffer and drop all point data.
  ///
  /// Later load completions for this model are ignored. Returns the nodes that
  /// were resident so callers can drop their LRU entries.
  pub fn dispose(&mut self, renderer: &mut dyn PointRenderer) -> Vec<NodeId> {
    if self.disposed {
      return Vec::new();
    }
    let released = self.demote_subtree(NodeId::ROOT, renderer);
    self.visible_nodes.clear();
    self.visible_geometry.clear();
    self.num_visible_points = 0;
    self.disposed = true;
    released
  }

  /// Record the outcome of a finished load.
  pub(crate) fn mark_failed(&mut self, id: NodeId) {
    let geometry = &mut self.nodes[id.index()].geometry;
    warn!(model = self.id.raw(), node = %geometry.key, "Node marked failed");
    geometry.points = None;
    geometry.state = LoadState::Failed;
  }
}

impl std::fmt::Debug for PointCloudOctree {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PointCloudOctree")
      .field("id", &self.id)
      .field("nodes", &self.nodes.len())
      .field("bounding_box", &self.bounding_box)
      .field("spacing", &self.spacing)
      .field("disposed", &self.disposed)
      .finish()
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
