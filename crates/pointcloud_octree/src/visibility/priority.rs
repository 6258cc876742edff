//! Queue items and the screen-space weight that orders them.
//!
//! ```text
//! perspective:   factor = halfHeight / (tan(fov / 2) · distance)
//! orthographic:  factor = 2 · halfHeight / (top - bottom)
//!
//! projected radius = sphere.radius · factor        (pixels)
//! weight = MAX                 if camera inside sphere
//!        = projected + 1/dist  otherwise
//! ```

use glam::DVec3;

use crate::constants::MAX_WEIGHT;
use crate::geometry::{Camera, Projection, Sphere};
use crate::octree::NodeId;

/// Candidate node of one visibility pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueueItem {
  /// Index into the octree slice of the pass.
  pub model_index: usize,
  pub weight: f64,
  pub node: NodeId,
  /// `None` for roots.
  pub parent: Option<NodeId>,
}

impl QueueItem {
  /// Root item of a model; roots always carry the maximal weight.
  pub fn root(model_index: usize, node: NodeId) -> Self {
    Self {
      model_index,
      weight: MAX_WEIGHT,
      node,
      parent: None,
    }
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.parent.is_none()
  }

  /// Heap score: the queue is a min-heap, so high weights pop first.
  #[inline]
  pub fn score(&self) -> f64 {
    1.0 / self.weight
  }
}

/// Pixels per world unit at `distance` from the camera.
///
/// `half_height` is half the viewport height in device pixels.
pub fn projection_factor(camera: &Camera, half_height: f64, distance: f64) -> f64 {
  match camera.projection {
    Projection::Perspective { fov_y_degrees, .. } => {
      let slope = (fov_y_degrees.to_radians() / 2.0).tan();
      half_height / (slope * distance)
    }
    Projection::Orthographic { top, bottom, .. } => 2.0 * half_height / (top - bottom),
  }
}

/// Projected radius in pixels of `sphere` seen from `camera_position`.
pub fn projected_radius(camera: &Camera, camera_position: DVec3, sphere: &Sphere, half_height: f64) -> f64 {
  let distance = sphere.center.distance(camera_position);
  sphere.radius * projection_factor(camera, half_height, distance)
}

/// Weight of a child node, or `None` if it projects below `min_pixel_size`.
pub fn child_weight(
  camera: &Camera,
  camera_position: DVec3,
  sphere: &Sphere,
  half_height: f64,
  min_pixel_size: f64,
) -> Option<f64> {
  let distance = sphere.center.distance(camera_position);
  let screen_radius = sphere.radius * projection_factor(camera, half_height, distance);
  if screen_radius < min_pixel_size {
    return None;
  }
  if distance < sphere.radius {
    Some(MAX_WEIGHT)
  } else {
    Some(screen_radius + 1.0 / distance)
  }
}
