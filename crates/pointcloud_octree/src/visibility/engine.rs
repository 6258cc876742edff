//! Per-pass visibility: LOD selection, GPU promotion, load scheduling, eviction.
//!
//! # Pass
//!
//! ```text
//! for each visible model:
//!   object-space frustum  = proj · view · world
//!   object-space camera   = world⁻¹ · camera position
//!   reset per-pass state; push root (weight MAX)
//!
//! while queue not empty:
//!   pop highest weight
//!   ├─ budget exceeded (non-root)        → stop the pass
//!   ├─ level > max_level or off-frustum  → skip
//!   ├─ accumulate points
//!   ├─ geometry node, parent resident:
//!   │    loaded & promotions left        → promote to tree
//!   │    failed                          → record, skip subtree
//!   │    otherwise                       → backlog
//!   ├─ tree node                         → LRU touch, mark visible
//!   └─ push children above min pixel size
//!
//! load backlog[..max_nodes_loading]
//! LRU free_memory (visible nodes protected)
//! ```
//!
//! A tree node is only marked visible when its parent is a visible tree node,
//! so the visible set is always a connected subtree from each root. Eviction
//! of a non-visible node therefore never takes a visible descendant with it.

use std::collections::HashSet;

use glam::DVec3;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::priority::{child_weight, QueueItem};
use crate::config::StreamingConfig;
use crate::constants::OCTREE_CHILDREN;
use crate::geometry::{Camera, Frustum};
use crate::heap::BinaryHeap;
use crate::loading::{LoadOutcome, NodeLoader};
use crate::lru::Lru;
use crate::octree::{LoadState, ModelId, NodeId, PointCloudOctree};
use crate::picking::PointRenderer;

/// A node addressed across models.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeHandle {
  pub model: ModelId,
  pub node: NodeId,
}

impl NodeHandle {
  #[inline]
  pub fn new(model: ModelId, node: NodeId) -> Self {
    Self { model, node }
  }
}

/// Outcome of one visibility pass.
#[derive(Clone, Debug, Default)]
pub struct VisibilityUpdate {
  /// Tree nodes marked visible, in pop order.
  pub visible_nodes: Vec<NodeHandle>,
  pub num_visible_points: u64,
  /// A loaded node could not be promoted because of the per-pass cap.
  pub exceeded_max_loads_to_gpu: bool,
  /// A failed node was met during traversal.
  pub node_load_failed: bool,
  /// Loads started by this pass.
  pub load_requests: Vec<NodeHandle>,
  /// Nodes uploaded to the GPU by this pass.
  pub promoted: usize,
  /// Nodes released by the eviction step.
  pub evicted: Vec<NodeHandle>,
}

/// Per-model traversal inputs, in object space.
struct ModelView {
  frustum: Frustum,
  camera_position: DVec3,
}

/// Visibility engine: owns the resident-node LRU shared by every model of a
/// scene.
pub struct VisibilityEngine {
  lru: Lru<NodeHandle>,
  max_loads_to_gpu: usize,
  max_nodes_loading: usize,
}

impl VisibilityEngine {
  pub fn new(point_budget: u64, max_loads_to_gpu: usize, max_nodes_loading: usize) -> Self {
    Self {
      lru: Lru::new(point_budget),
      max_loads_to_gpu,
      max_nodes_loading,
    }
  }

  pub fn from_config(config: &StreamingConfig) -> Self {
    Self::new(config.point_budget, config.max_loads_to_gpu, config.max_nodes_loading)
  }

  #[inline]
  pub fn point_budget(&self) -> u64 {
    self.lru.point_budget()
  }

  /// Change the budget; a smaller budget evicts immediately.
  ///
  /// Nodes that are currently visible are never evicted here.
  pub fn set_point_budget(
    &mut self,
    point_budget: u64,
    octrees: &mut [PointCloudOctree],
    renderer: &mut dyn PointRenderer,
  ) -> Vec<NodeHandle> {
    if !self.lru.set_point_budget(point_budget) {
      return Vec::new();
    }
    let protected = currently_visible(octrees);
    self.free_memory(&protected, octrees, renderer)
  }

  pub fn lru(&self) -> &Lru<NodeHandle> {
    &self.lru
  }

  /// Drop LRU entries for nodes released outside a pass (model removal).
  pub fn forget(&mut self, model: ModelId, nodes: &[NodeId]) {
    for &node in nodes {
      self.lru.remove(&NodeHandle::new(model, node));
    }
  }

  pub fn max_loads_to_gpu(&self) -> usize {
    self.max_loads_to_gpu
  }

  pub fn max_nodes_loading(&self) -> usize {
    self.max_nodes_loading
  }

  /// Run one pass over `octrees`.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "visibility::update"))]
  pub fn update(
    &mut self,
    octrees: &mut [PointCloudOctree],
    camera: &Camera,
    renderer: &mut dyn PointRenderer,
    loader: &NodeLoader,
  ) -> VisibilityUpdate {
    let mut result = VisibilityUpdate::default();
    let mut queue = BinaryHeap::new(|item: &QueueItem| item.score());
    let mut views = Vec::with_capacity(octrees.len());

    let projection = camera.projection_matrix();
    let view = camera.view_matrix();
    for (model_index, octree) in octrees.iter_mut().enumerate() {
      octree.reset_visibility();
      let world_inverse = octree.world_matrix.inverse();
      views.push(ModelView {
        frustum: Frustum::from_matrix(&(projection * view * octree.world_matrix)),
        camera_position: world_inverse.transform_point3(camera.position()),
      });
      if octree.visible && !octree.is_disposed() {
        queue.push(QueueItem::root(model_index, octree.root()));
      }
    }

    let viewport = renderer.viewport();
    let half_height = 0.5 * viewport.height as f64 * viewport.pixel_ratio;
    let point_budget = self.lru.point_budget();
    let mut backlog: Vec<(usize, NodeId)> = Vec::new();

    while let Some(item) = queue.pop() {
      let octree = &mut octrees[item.model_index];
      let model_view = &views[item.model_index];
      let geometry = &octree.node(item.node).geometry;
      let num_points = geometry.point_count();

      // Roots are always shown, even with a zero budget
      if !item.is_root() && result.num_visible_points + num_points > point_budget {
        break;
      }
      if octree.max_level.is_some_and(|max| geometry.level > max)
        || !model_view.frustum.intersects_box(&geometry.bounding_box)
      {
        continue;
      }

      result.num_visible_points += num_points;
      octree.num_visible_points += num_points;

      let parent_resident = item.parent.map_or(true, |parent| octree.node(parent).is_tree_node());
      if octree.node(item.node).is_geometry_node() && parent_resident {
        let state = octree.node(item.node).geometry.state;
        if state == LoadState::Loaded && result.promoted < self.max_loads_to_gpu {
          match octree.promote(item.node, renderer) {
            Ok(true) => result.promoted += 1,
            Ok(false) => {}
            Err(err) => {
              warn!(
                model = octree.id().raw(),
                node = %octree.node(item.node).geometry.key,
                error = %err,
                "GPU upload failed"
              );
              continue;
            }
          }
        } else if state == LoadState::Failed {
          result.node_load_failed = true;
          continue;
        } else {
          if state == LoadState::Loaded {
            result.exceeded_max_loads_to_gpu = true;
          }
          backlog.push((item.model_index, item.node));
          octree.visible_geometry.push(item.node);
        }
      }

      if parent_resident && octree.node(item.node).is_tree_node() {
        self.lru.touch(NodeHandle::new(octree.id(), item.node), num_points);
        octree.update_tree_world_matrix(item.node);
        if let Some(tree) = octree.node_mut(item.node).tree_mut() {
          tree.visible = true;
        }
        octree.visible_nodes.push(item.node);
        result.visible_nodes.push(NodeHandle::new(octree.id(), item.node));
      }

      let children: SmallVec<[NodeId; OCTREE_CHILDREN]> = octree.node(item.node).geometry.child_ids().collect();
      for child in children {
        let sphere = &octree.node(child).geometry.bounding_sphere;
        let Some(weight) = child_weight(
          camera,
          model_view.camera_position,
          sphere,
          half_height,
          octree.min_node_pixel_size,
        ) else {
          continue;
        };
        queue.push(QueueItem {
          model_index: item.model_index,
          weight,
          node: child,
          parent: Some(item.node),
        });
      }
    }

    let num_to_load = self.max_nodes_loading.min(backlog.len());
    for &(model_index, node) in &backlog[..num_to_load] {
      let octree = &mut octrees[model_index];
      if loader.load(octree, node) == LoadOutcome::Started {
        result.load_requests.push(NodeHandle::new(octree.id(), node));
      }
    }

    let protected: HashSet<NodeHandle> = result.visible_nodes.iter().copied().collect();
    result.evicted = self.free_memory(&protected, octrees, renderer);

    debug!(
      visible = result.visible_nodes.len(),
      points = result.num_visible_points,
      promoted = result.promoted,
      loads = result.load_requests.len(),
      evicted = result.evicted.len(),
      "Visibility pass"
    );
    result
  }

  fn free_memory(
    &mut self,
    protected: &HashSet<NodeHandle>,
    octrees: &mut [PointCloudOctree],
    renderer: &mut dyn PointRenderer,
  ) -> Vec<NodeHandle> {
    self.lru.free_memory(
      |handle| protected.contains(handle),
      |victim| evict_subtree(octrees, renderer, victim),
    )
  }
}

/// Demote `victim` and its resident descendants, returning every released node.
fn evict_subtree(
  octrees: &mut [PointCloudOctree],
  renderer: &mut dyn PointRenderer,
  victim: NodeHandle,
) -> Vec<NodeHandle> {
  let Some(octree) = octrees.iter_mut().find(|o| o.id() == victim.model) else {
    return Vec::new();
  };
  octree
    .demote_subtree(victim.node, renderer)
    .into_iter()
    .map(|node| NodeHandle::new(victim.model, node))
    .collect()
}

fn currently_visible(octrees: &[PointCloudOctree]) -> HashSet<NodeHandle> {
  octrees
    .iter()
    .flat_map(|octree| {
      octree
        .visible_nodes()
        .iter()
        .map(move |&node| NodeHandle::new(octree.id(), node))
    })
    .collect()
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
