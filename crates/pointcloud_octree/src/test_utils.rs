//! Test utilities shared by unit tests.
//!
//! Provides a recording renderer, synthetic octrees, an in-memory EPT dataset
//! and camera helpers.

use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use glam::{DMat4, DVec3};

use crate::error::RenderError;
use crate::geometry::{Aabb, Camera, Projection};
use crate::loading::{DimensionKind, MemorySource, PointAttributes, PointSchema, SchemaField};
use crate::octree::{LoadState, NodeId, NodeKey, PointCloudOctree};
use crate::picking::{GpuBuffer, PickBatch, PixelRect, PointRenderer, RenderState, Viewport};

// =============================================================================
// Mock renderer
// =============================================================================

/// Renderer that records every call.
pub struct MockRenderer {
  pub viewport: Viewport,
  pub next_buffer: u64,
  pub uploads: Vec<GpuBuffer>,
  pub released: Vec<GpuBuffer>,
  pub fail_uploads: bool,
  pub state: RenderState,
  /// Every state passed to `set_render_state`, in order.
  pub state_history: Vec<RenderState>,
  pub pick_target_size: Option<(u32, u32)>,
  pub pick_batches: Vec<PickBatch>,
  /// Returned by `read_pixels` when its length matches the request.
  pub pick_pixels: Option<Vec<u8>>,
  pub read_rects: Vec<PixelRect>,
  pub fail_read: bool,
}

impl Default for MockRenderer {
  fn default() -> Self {
    Self {
      viewport: Viewport::new(800, 600),
      next_buffer: 1,
      uploads: Vec::new(),
      released: Vec::new(),
      fail_uploads: false,
      state: RenderState::default(),
      state_history: Vec::new(),
      pick_target_size: None,
      pick_batches: Vec::new(),
      pick_pixels: None,
      read_rects: Vec::new(),
      fail_read: false,
    }
  }
}

impl MockRenderer {
  /// Buffers uploaded and not yet released.
  pub fn live_buffers(&self) -> usize {
    self.uploads.len() - self.released.len()
  }
}

impl PointRenderer for MockRenderer {
  fn viewport(&self) -> Viewport {
    self.viewport
  }

  fn upload_points(&mut self, _points: &PointAttributes) -> Result<GpuBuffer, RenderError> {
    if self.fail_uploads {
      return Err(RenderError::Upload("out of memory".into()));
    }
    let buffer = GpuBuffer(self.next_buffer);
    self.next_buffer += 1;
    self.uploads.push(buffer);
    Ok(buffer)
  }

  fn release_points(&mut self, buffer: GpuBuffer) {
    self.released.push(buffer);
  }

  fn render_state(&self) -> RenderState {
    self.state.clone()
  }

  fn set_render_state(&mut self, state: &RenderState) {
    self.state = state.clone();
    self.state_history.push(state.clone());
  }

  fn prepare_pick_target(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
    self.pick_target_size = Some((width, height));
    Ok(())
  }

  fn render_pick_batch(&mut self, batch: &PickBatch, _camera: &Camera) -> Result<(), RenderError> {
    self.pick_batches.push(*batch);
    Ok(())
  }

  fn read_pixels(&mut self, rect: PixelRect, out: &mut [u8]) -> Result<(), RenderError> {
    self.read_rects.push(rect);
    if self.fail_read {
      return Err(RenderError::ReadPixels("context lost".into()));
    }
    if let Some(pixels) = &self.pick_pixels {
      if pixels.len() == out.len() {
        out.copy_from_slice(pixels);
      }
    }
    Ok(())
  }
}

// =============================================================================
// Schemas and payloads
// =============================================================================

/// Quantization step of [`xyz_fields`]; exact in binary.
pub const XYZ_SCALE: f64 = 0.25;

pub fn xyz_fields() -> Vec<SchemaField> {
  ["X", "Y", "Z"]
    .into_iter()
    .map(|name| SchemaField {
      name: name.to_string(),
      kind: DimensionKind::Signed,
      size: 4,
      scale: Some(XYZ_SCALE),
      offset: Some(0.0),
    })
    .collect()
}

pub fn xyz_schema() -> PointSchema {
  PointSchema::from_fields(&xyz_fields()).unwrap()
}

/// Encode positions as [`xyz_schema`] records.
pub fn encode_xyz(points: &[[f64; 3]]) -> Vec<u8> {
  let mut out = Vec::with_capacity(points.len() * 12);
  for p in points {
    for v in p {
      out.write_i32::<LittleEndian>((v / XYZ_SCALE).round() as i32).unwrap();
    }
  }
  out
}

// =============================================================================
// Synthetic octrees
// =============================================================================

pub fn test_bounds() -> Aabb {
  Aabb::new(DVec3::ZERO, DVec3::splat(100.0))
}

/// Root-only octree over [`test_bounds`] backed by an empty source.
pub fn empty_octree() -> PointCloudOctree {
  PointCloudOctree::new(
    test_bounds(),
    1.0,
    Arc::new(xyz_schema()),
    Arc::new(MemorySource::new()),
  )
}

/// Octree with every node materialized down to `depth`, each reporting
/// `points_per_node` points. Nothing is loaded.
pub fn full_octree(depth: u32, points_per_node: u64) -> PointCloudOctree {
  let mut octree = empty_octree();
  let root = octree.root();
  octree.node_mut(root).geometry.num_points = Some(points_per_node);

  let mut frontier = vec![root];
  for _ in 0..depth {
    let mut next = Vec::new();
    for parent in frontier {
      for octant in 0..8u8 {
        next.push(octree.insert_child(parent, octant, Some(points_per_node)));
      }
    }
    frontier = next;
  }
  octree
}

/// Give `id` `n` decoded points and mark it loaded (without uploading).
pub fn mark_loaded(octree: &mut PointCloudOctree, id: NodeId, n: usize) {
  let size = octree.node(id).geometry.bounding_box.size();
  let positions = (0..n)
    .map(|i| {
      let t = (i as f64 + 0.5) / n.max(1) as f64;
      (size * t).as_vec3().to_array()
    })
    .collect();
  let geometry = &mut octree.node_mut(id).geometry;
  geometry.num_points = Some(n as u64);
  geometry.points = Some(Arc::new(PointAttributes::from_positions(positions)));
  geometry.state = LoadState::Loaded;
}

/// Load and promote `id` in one step.
pub fn make_resident(octree: &mut PointCloudOctree, id: NodeId, n: usize, renderer: &mut MockRenderer) {
  mark_loaded(octree, id, n);
  octree.promote(id, renderer).unwrap();
}

/// Load and promote every node of `octree`.
pub fn make_all_resident(octree: &mut PointCloudOctree, n: usize, renderer: &mut MockRenderer) {
  let ids: Vec<NodeId> = octree.nodes().map(|node| node.id()).collect();
  for id in ids {
    make_resident(octree, id, n, renderer);
  }
}

// =============================================================================
// In-memory EPT dataset
// =============================================================================

/// `ept.json` for a 64-unit cube with a span of 64 (root spacing 1).
pub fn ept_json() -> Vec<u8> {
  let schema = serde_json::to_value(xyz_fields()).unwrap();
  serde_json::json!({
    "bounds": [0.0, 0.0, 0.0, 64.0, 64.0, 64.0],
    "points": 0,
    "span": 64,
    "dataType": "binary",
    "hierarchyType": "json",
    "schema": schema,
  })
  .to_string()
  .into_bytes()
}

/// In-memory dataset with a complete octree down to `depth`.
///
/// The root hierarchy file lists every node with `points_per_node` points and
/// each node's payload holds that many points inside its cell.
pub fn memory_dataset(depth: u32, points_per_node: usize) -> Arc<MemorySource> {
  let source = MemorySource::new();
  source.set_metadata(ept_json());

  let root_bounds = Aabb::new(DVec3::ZERO, DVec3::splat(64.0));
  let mut hierarchy = serde_json::Map::new();
  let mut frontier = vec![(NodeKey::ROOT, root_bounds)];
  for level in 0..=depth {
    let mut next = Vec::new();
    for (key, bounds) in frontier {
      hierarchy.insert(key.to_string(), serde_json::json!(points_per_node));
      let points: Vec<[f64; 3]> = (0..points_per_node)
        .map(|i| {
          let t = (i as f64 + 0.5) / points_per_node as f64;
          (bounds.min + bounds.size() * t).to_array()
        })
        .collect();
      source.insert_points(key, encode_xyz(&points));
      if level < depth {
        for octant in 0..8u8 {
          next.push((key.child(octant), bounds.octant(octant)));
        }
      }
    }
    frontier = next;
  }
  source.insert_hierarchy(
    NodeKey::ROOT,
    serde_json::Value::Object(hierarchy).to_string().into_bytes(),
  );
  Arc::new(source)
}

/// Octree opened from [`memory_dataset`].
pub fn memory_octree(depth: u32, points_per_node: usize) -> (Arc<MemorySource>, PointCloudOctree) {
  let source = memory_dataset(depth, points_per_node);
  let octree = PointCloudOctree::open(source.clone()).unwrap();
  (source, octree)
}

// =============================================================================
// Cameras
// =============================================================================

pub fn perspective() -> Projection {
  Projection::Perspective {
    fov_y_degrees: 60.0,
    aspect: 800.0 / 600.0,
    near: 0.1,
    far: 10_000.0,
  }
}

pub fn perspective_camera(eye: DVec3, target: DVec3) -> Camera {
  Camera::look_at(perspective(), eye, target, DVec3::Y)
}

/// Camera looking at the center of [`test_bounds`] from `distance` along +Z.
pub fn camera_facing_bounds(distance: f64) -> Camera {
  let center = test_bounds().center();
  perspective_camera(center + DVec3::new(0.0, 0.0, distance), center)
}

/// Camera pointing away from [`test_bounds`].
pub fn camera_facing_away() -> Camera {
  let center = test_bounds().center();
  perspective_camera(center + DVec3::new(0.0, 0.0, 500.0), center + DVec3::new(0.0, 0.0, 1000.0))
}

pub fn translation(offset: DVec3) -> DMat4 {
  DMat4::from_translation(offset)
}
