//! View frustum extracted from a clip matrix.

use glam::{DMat4, DVec3, DVec4};

use super::{Aabb, Sphere};

/// Plane in Hessian normal form: `normal · p + distance = 0`.
///
/// Normals point into the frustum, so a positive signed distance is inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
  pub normal: DVec3,
  pub distance: f64,
}

impl Plane {
  /// Build a plane from raw coefficients, normalizing them.
  fn from_coefficients(v: DVec4) -> Self {
    let normal = v.truncate();
    let inv_len = 1.0 / normal.length();
    Self {
      normal: normal * inv_len,
      distance: v.w * inv_len,
    }
  }

  #[inline]
  pub fn signed_distance(&self, point: DVec3) -> f64 {
    self.normal.dot(point) + self.distance
  }
}

/// Six clipping planes: left, right, bottom, top, near, far.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
  pub planes: [Plane; 6],
}

impl Frustum {
  /// Extract frustum planes from a `projection * view * model` matrix.
  ///
  /// Uses the Gribb/Hartmann method with the GL depth range (z in [-1, 1]).
  /// Passing a matrix that includes the model transform yields an
  /// object-space frustum.
  pub fn from_matrix(clip: &DMat4) -> Self {
    let row0 = clip.row(0);
    let row1 = clip.row(1);
    let row2 = clip.row(2);
    let row3 = clip.row(3);

    Self {
      planes: [
        Plane::from_coefficients(row3 + row0),
        Plane::from_coefficients(row3 - row0),
        Plane::from_coefficients(row3 + row1),
        Plane::from_coefficients(row3 - row1),
        Plane::from_coefficients(row3 + row2),
        Plane::from_coefficients(row3 - row2),
      ],
    }
  }

  /// Conservative box test: false only if the box is fully outside a plane.
  pub fn intersects_box(&self, aabb: &Aabb) -> bool {
    self.planes.iter().all(|plane| {
      // Corner furthest along the plane normal
      let positive = DVec3::new(
        if plane.normal.x > 0.0 { aabb.max.x } else { aabb.min.x },
        if plane.normal.y > 0.0 { aabb.max.y } else { aabb.min.y },
        if plane.normal.z > 0.0 { aabb.max.z } else { aabb.min.z },
      );
      plane.signed_distance(positive) >= 0.0
    })
  }

  pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
    self
      .planes
      .iter()
      .all(|plane| plane.signed_distance(sphere.center) >= -sphere.radius)
  }

  pub fn contains_point(&self, point: DVec3) -> bool {
    self
      .planes
      .iter()
      .all(|plane| plane.signed_distance(point) >= 0.0)
  }
}
