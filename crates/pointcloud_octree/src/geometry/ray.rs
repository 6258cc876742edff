use glam::{DMat4, DVec3};

use super::Sphere;

/// Half-line used for pick queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
  pub origin: DVec3,
  /// Always normalized.
  pub direction: DVec3,
}

impl Ray {
  /// Create a ray, normalizing `direction`.
  pub fn new(origin: DVec3, direction: DVec3) -> Self {
    Self {
      origin,
      direction: direction.normalize(),
    }
  }

  #[inline]
  pub fn at(&self, t: f64) -> DVec3 {
    self.origin + self.direction * t
  }

  /// Squared distance from `point` to the closest point on the ray.
  pub fn distance_squared_to_point(&self, point: DVec3) -> f64 {
    let t = (point - self.origin).dot(self.direction);
    if t < 0.0 {
      // Behind the origin
      return self.origin.distance_squared(point);
    }
    self.at(t).distance_squared(point)
  }

  #[inline]
  pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
    self.distance_squared_to_point(sphere.center) <= sphere.radius * sphere.radius
  }

  pub fn transform(&self, matrix: &DMat4) -> Self {
    Self::new(
      matrix.transform_point3(self.origin),
      matrix.transform_vector3(self.direction),
    )
  }
}
