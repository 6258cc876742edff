//! Camera input supplied by the host every frame.

use glam::{DMat4, DVec2, DVec3};

use super::Ray;

/// Projection model of the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
  Perspective {
    /// Vertical field of view in degrees.
    fov_y_degrees: f64,
    aspect: f64,
    near: f64,
    far: f64,
  },
  Orthographic {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    near: f64,
    far: f64,
  },
}

/// Camera state: projection plus camera-to-world transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
  pub projection: Projection,
  /// Camera-to-world matrix.
  pub world: DMat4,
}

impl Camera {
  pub fn new(projection: Projection, world: DMat4) -> Self {
    Self { projection, world }
  }

  /// Camera at `eye` looking at `target`.
  pub fn look_at(projection: Projection, eye: DVec3, target: DVec3, up: DVec3) -> Self {
    Self {
      projection,
      world: DMat4::look_at_rh(eye, target, up).inverse(),
    }
  }

  /// Perspective projection matrix with GL depth range.
  pub fn projection_matrix(&self) -> DMat4 {
    match self.projection {
      Projection::Perspective {
        fov_y_degrees,
        aspect,
        near,
        far,
      } => DMat4::perspective_rh_gl(fov_y_degrees.to_radians(), aspect, near, far),
      Projection::Orthographic {
        left,
        right,
        top,
        bottom,
        near,
        far,
      } => DMat4::orthographic_rh_gl(left, right, bottom, top, near, far),
    }
  }

  /// World-to-camera matrix.
  #[inline]
  pub fn view_matrix(&self) -> DMat4 {
    self.world.inverse()
  }

  #[inline]
  pub fn view_projection(&self) -> DMat4 {
    self.projection_matrix() * self.view_matrix()
  }

  /// Camera position in world space.
  #[inline]
  pub fn position(&self) -> DVec3 {
    self.world.w_axis.truncate()
  }

  /// Viewing direction in world space (camera -Z).
  #[inline]
  pub fn forward(&self) -> DVec3 {
    -self.world.z_axis.truncate().normalize()
  }

  pub fn is_perspective(&self) -> bool {
    matches!(self.projection, Projection::Perspective { .. })
  }

  /// Project a world-space point to normalized device coordinates.
  pub fn project(&self, point: DVec3) -> DVec3 {
    self.view_projection().project_point3(point)
  }

  /// World-space ray through a point given in normalized device coordinates.
  pub fn ray_from_ndc(&self, ndc: DVec2) -> Ray {
    let inverse = self.view_projection().inverse();
    match self.projection {
      Projection::Perspective { .. } => {
        let target = inverse.project_point3(ndc.extend(0.5));
        Ray::new(self.position(), target - self.position())
      }
      Projection::Orthographic { .. } => {
        let origin = inverse.project_point3(ndc.extend(-1.0));
        Ray::new(origin, self.forward())
      }
    }
  }
}
