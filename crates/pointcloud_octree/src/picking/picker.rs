//! GPU ray picking against the visible, resident nodes.
//!
//! # Flow
//!
//! ```text
//! ray ──► nodes_on_ray (visible nodes whose world sphere the ray hits, ≤ 254)
//!     ──► scissored pick pass: batch i drawn with alpha = i + 1,
//!                              RGB = point index
//!     ──► read_pixels(window)
//!     ──► find_hit: closest to window center, then closest to camera
//!     ──► get_pick_point: attributes of the hit point from CPU data
//! ```
//!
//! The renderer state is captured before the pass and restored by a drop
//! guard, so it is put back on every exit path.

use glam::{DVec2, DVec3};
use tracing::error;

use super::renderer::{PickBatch, PixelRect, PointRenderer, RenderState, RenderTarget};
use crate::constants::{DEFAULT_PICK_WINDOW_SIZE, MAX_PICK_BATCHES};
use crate::error::RenderError;
use crate::geometry::{Camera, Ray};
use crate::octree::{ModelId, NodeId, PointCloudOctree};

/// Options of one pick call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickParams {
  /// Edge length of the square read-back window in device pixels.
  pub pick_window_size: u32,
  /// Ignore the material's clip boxes while picking.
  pub pick_outside_clip_region: bool,
  /// Use this device-pixel position instead of projecting the ray.
  pub pixel_position: Option<DVec2>,
}

impl Default for PickParams {
  fn default() -> Self {
    Self {
      pick_window_size: DEFAULT_PICK_WINDOW_SIZE,
      pick_outside_clip_region: false,
      pixel_position: None,
    }
  }
}

/// Raw hit decoded from the pick buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PickHit {
  pub point_index: u32,
  /// Zero-based index into the rendered batches.
  pub node_index: usize,
}

/// A node drawn in the pick pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderedNode {
  /// Index into the octree slice passed to [`pick`].
  pub model_index: usize,
  pub model: ModelId,
  pub node: NodeId,
}

/// Picked point with its attributes in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct PickPoint {
  pub model: ModelId,
  pub node: NodeId,
  pub point_index: usize,
  pub position: DVec3,
  pub normal: Option<DVec3>,
  pub color: Option<[u8; 3]>,
  pub intensity: Option<u16>,
  pub classification: Option<u8>,
  pub return_number: Option<u8>,
  pub source_id: Option<u16>,
}

/// Resident visible nodes whose world-space bounding sphere intersects `ray`.
///
/// Node indices must fit in one byte with 0 and 255 reserved, so the list is
/// truncated to [`MAX_PICK_BATCHES`].
pub fn nodes_on_ray(octrees: &[PointCloudOctree], ray: &Ray) -> Vec<RenderedNode> {
  let mut nodes = Vec::new();
  for (model_index, octree) in octrees.iter().enumerate() {
    if !octree.visible || octree.is_disposed() {
      continue;
    }
    for &id in octree.visible_nodes() {
      let node = octree.node(id);
      if !node.is_tree_node() {
        continue;
      }
      let sphere = node.geometry.bounding_sphere.apply_matrix(&octree.world_matrix);
      if ray.intersects_sphere(&sphere) {
        nodes.push(RenderedNode {
          model_index,
          model: octree.id(),
          node: id,
        });
      }
    }
  }

  if nodes.len() > MAX_PICK_BATCHES {
    error!(
      nodes = nodes.len(),
      max = MAX_PICK_BATCHES,
      "Too many nodes for pick, truncating"
    );
    nodes.truncate(MAX_PICK_BATCHES);
  }
  nodes
}

/// Scan a `window` x `window` RGBA8 buffer for the best hit.
///
/// Alpha holds the one-based node index (0 background, 255 reserved), RGB the
/// little-endian point index. A pixel wins if it is closer to the window
/// center than the current best and its point is closer to the camera.
/// `position_of(node_index, point_index)` yields the world position of a point.
pub fn find_hit<F>(pixels: &[u8], window: u32, camera_position: DVec3, position_of: F) -> Option<PickHit>
where
  F: Fn(usize, u32) -> Option<DVec3>,
{
  let window = window as usize;
  let center = (window as f64 - 1.0) / 2.0;
  let mut min_screen = f64::MAX;
  let mut min_camera = f64::MAX;
  let mut hit = None;

  for u in 0..window {
    for v in 0..window {
      let offset = u + v * window;
      let Some(pixel) = pixels.get(4 * offset..4 * offset + 4) else {
        continue;
      };
      let node_index = pixel[3];
      if node_index == 0 || node_index == 255 {
        continue;
      }
      let screen = (u as f64 - center).powi(2) + (v as f64 - center).powi(2);
      if screen >= min_screen {
        continue;
      }

      let point_index = u32::from_le_bytes([pixel[0], pixel[1], pixel[2], 0]);
      let Some(position) = position_of(node_index as usize - 1, point_index) else {
        continue;
      };
      let camera = position.distance_squared(camera_position);
      if camera < min_camera {
        hit = Some(PickHit {
          point_index,
          node_index: node_index as usize - 1,
        });
        min_screen = screen;
        min_camera = camera;
      }
    }
  }
  hit
}

/// World position of `point_index` in a rendered node.
pub fn point_position(octrees: &[PointCloudOctree], node: &RenderedNode, point_index: u32) -> Option<DVec3> {
  let octree = octrees.get(node.model_index)?;
  let entry = octree.node(node.node);
  let tree = entry.tree()?;
  let points = entry.geometry.points.as_ref()?;
  let local = points.position.get(point_index as usize)?;
  Some(tree.world_matrix.transform_point3(DVec3::new(
    local[0] as f64,
    local[1] as f64,
    local[2] as f64,
  )))
}

/// Assemble the attributes of a hit from the node's CPU-side data.
pub fn get_pick_point(octrees: &[PointCloudOctree], nodes: &[RenderedNode], hit: PickHit) -> Option<PickPoint> {
  let rendered = nodes.get(hit.node_index)?;
  let octree = octrees.get(rendered.model_index)?;
  let entry = octree.node(rendered.node);
  let tree = entry.tree()?;
  let points = entry.geometry.points.as_ref()?;
  let i = hit.point_index as usize;
  if i >= points.num_points {
    return None;
  }

  let normal = points.normal.as_ref().and_then(|n| n.get(i)).map(|n| {
    tree
      .world_matrix
      .transform_vector3(DVec3::new(n[0] as f64, n[1] as f64, n[2] as f64))
  });

  Some(PickPoint {
    model: rendered.model,
    node: rendered.node,
    point_index: i,
    position: point_position(octrees, rendered, hit.point_index)?,
    normal,
    color: points.color.as_ref().and_then(|c| c.get(i)).copied(),
    intensity: points.intensity.as_ref().and_then(|c| c.get(i)).copied(),
    classification: points.classification.as_ref().and_then(|c| c.get(i)).copied(),
    return_number: points.return_number.as_ref().and_then(|c| c.get(i)).copied(),
    source_id: points.source_id.as_ref().and_then(|c| c.get(i)).copied(),
  })
}

/// Device-pixel position of the ray, from its direction as seen by `camera`.
pub fn ray_pixel_position(camera: &Camera, ray: &Ray, width: u32, height: u32) -> DVec2 {
  let ndc = camera.project(camera.position() + ray.direction);
  DVec2::new(
    (ndc.x + 1.0) * 0.5 * width as f64,
    (ndc.y + 1.0) * 0.5 * height as f64,
  )
}

/// Restores the captured renderer state when dropped.
struct RestoreState<'a> {
  renderer: &'a mut dyn PointRenderer,
  saved: RenderState,
}

impl<'a> RestoreState<'a> {
  fn capture(renderer: &'a mut dyn PointRenderer) -> Self {
    let saved = renderer.render_state();
    Self { renderer, saved }
  }
}

impl Drop for RestoreState<'_> {
  fn drop(&mut self) {
    self.renderer.set_render_state(&self.saved);
  }
}

fn render_pick_window(
  renderer: &mut dyn PointRenderer,
  camera: &Camera,
  octrees: &[PointCloudOctree],
  nodes: &[RenderedNode],
  rect: PixelRect,
  target_size: (u32, u32),
  params: &PickParams,
) -> Result<Vec<u8>, RenderError> {
  let guard = RestoreState::capture(renderer);
  let pick_state = RenderState {
    blending: false,
    scissor: Some(rect),
    render_target: RenderTarget::Pick,
    clipping: !params.pick_outside_clip_region,
    depth_test: true,
    depth_write: true,
  };
  guard.renderer.set_render_state(&pick_state);
  guard.renderer.prepare_pick_target(target_size.0, target_size.1)?;

  for (i, rendered) in nodes.iter().enumerate() {
    let entry = octrees[rendered.model_index].node(rendered.node);
    let (Some(tree), Some(points)) = (entry.tree(), entry.geometry.points.as_ref()) else {
      continue;
    };
    let batch = PickBatch {
      buffer: tree.buffer,
      world_matrix: tree.world_matrix,
      node_index: (i + 1) as u8,
      num_points: points.num_points,
    };
    guard.renderer.render_pick_batch(&batch, camera)?;
  }

  let mut pixels = vec![0u8; rect.area() * 4];
  guard.renderer.read_pixels(rect, &mut pixels)?;
  Ok(pixels)
}

/// Pick the point under `ray`.
///
/// Returns `Ok(None)` when no visible node intersects the ray or nothing was
/// drawn in the pick window.
#[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "picker::pick"))]
pub fn pick(
  renderer: &mut dyn PointRenderer,
  camera: &Camera,
  ray: &Ray,
  octrees: &[PointCloudOctree],
  params: &PickParams,
) -> Result<Option<PickPoint>, RenderError> {
  let nodes = nodes_on_ray(octrees, ray);
  if nodes.is_empty() {
    return Ok(None);
  }

  let (width, height) = renderer.viewport().device_size();
  if width == 0 || height == 0 {
    return Ok(None);
  }
  let window = params.pick_window_size.clamp(1, width.min(height));
  let pixel = params
    .pixel_position
    .unwrap_or_else(|| ray_pixel_position(camera, ray, width, height));

  let half = (window as f64 - 1.0) / 2.0;
  let x = ((pixel.x - half).floor().max(0.0) as u32).min(width - window);
  let y = ((pixel.y - half).floor().max(0.0) as u32).min(height - window);
  let rect = PixelRect {
    x,
    y,
    width: window,
    height: window,
  };

  let pixels = render_pick_window(renderer, camera, octrees, &nodes, rect, (width, height), params)?;

  let hit = find_hit(&pixels, window, camera.position(), |node_index, point_index| {
    nodes
      .get(node_index)
      .and_then(|n| point_position(octrees, n, point_index))
  });
  Ok(hit.and_then(|hit| get_pick_point(octrees, &nodes, hit)))
}

#[cfg(test)]
#[path = "picker_test.rs"]
mod picker_test;
