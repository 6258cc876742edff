//! Double-precision bounding volumes for octree cells.

use glam::{DMat4, DVec3};

/// Double-precision axis-aligned bounding box.
///
/// Point cloud coordinates are often georeferenced (large offsets), so cell
/// bounds are kept in f64 and only point positions relative to a cell origin
/// are narrowed to f32.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
	/// Minimum corner (inclusive).
	pub min: DVec3,
	/// Maximum corner (inclusive).
	pub max: DVec3,
}

impl Aabb {
	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: DVec3, max: DVec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Create a new AABB from center and half-extents.
	pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
		Self {
			min: center - half_extents,
			max: center + half_extents,
		}
	}

	/// Empty box that any point expands.
	pub fn empty() -> Self {
		Self {
			min: DVec3::splat(f64::INFINITY),
			max: DVec3::splat(f64::NEG_INFINITY),
		}
	}

	/// True when no point has been added to an [`Aabb::empty`] box.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
	}

	/// Grow the box to contain `point`.
	#[inline]
	pub fn expand_to_point(&mut self, point: DVec3) {
		self.min = self.min.min(point);
		self.max = self.max.max(point);
	}

	/// Check if this AABB overlaps with another.
	///
	/// Two AABBs overlap if they share any interior or boundary points.
	#[inline]
	pub fn overlaps(&self, other: &Aabb) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
			&& self.min.z <= other.max.z
			&& self.max.z >= other.min.z
	}

	/// Check if this AABB contains a point.
	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	/// Get the size of the AABB (max - min).
	#[inline]
	pub fn size(&self) -> DVec3 {
		self.max - self.min
	}

	/// Get the center of the AABB.
	#[inline]
	pub fn center(&self) -> DVec3 {
		(self.min + self.max) * 0.5
	}

	/// Child cell for an octant.
	///
	/// Octant bits: bit 2 = +X half, bit 1 = +Y half, bit 0 = +Z half.
	pub fn octant(&self, octant: u8) -> Aabb {
		let half = self.size() * 0.5;
		let offset = DVec3::new(
			((octant >> 2) & 1) as f64,
			((octant >> 1) & 1) as f64,
			(octant & 1) as f64,
		);
		let min = self.min + offset * half;
		Aabb {
			min,
			max: min + half,
		}
	}

	/// Smallest sphere enclosing the box.
	pub fn bounding_sphere(&self) -> Sphere {
		Sphere {
			center: self.center(),
			radius: self.size().length() * 0.5,
		}
	}

	/// Axis-aligned bounds of this box after an affine transform.
	pub fn transform(&self, matrix: &DMat4) -> Aabb {
		let mut out = Aabb::empty();
		for corner in 0..8u8 {
			let p = DVec3::new(
				if corner & 4 != 0 { self.max.x } else { self.min.x },
				if corner & 2 != 0 { self.max.y } else { self.min.y },
				if corner & 1 != 0 { self.max.z } else { self.min.z },
			);
			out.expand_to_point(matrix.transform_point3(p));
		}
		out
	}
}

/// Bounding sphere used for screen-size estimation and ray culling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
	pub center: DVec3,
	pub radius: f64,
}

impl Sphere {
	pub fn new(center: DVec3, radius: f64) -> Self {
		Self { center, radius }
	}

	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		self.center.distance_squared(point) <= self.radius * self.radius
	}

	/// Transform the center and scale the radius by the largest axis scale.
	pub fn apply_matrix(&self, matrix: &DMat4) -> Sphere {
		let scale_x = matrix.x_axis.truncate().length_squared();
		let scale_y = matrix.y_axis.truncate().length_squared();
		let scale_z = matrix.z_axis.truncate().length_squared();
		let max_scale = scale_x.max(scale_y).max(scale_z).sqrt();
		Sphere {
			center: matrix.transform_point3(self.center),
			radius: self.radius * max_scale,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_overlaps_touching() {
		// Touching at boundary should count as overlapping
		let a = Aabb::new(DVec3::ZERO, DVec3::splat(10.0));
		let b = Aabb::new(DVec3::splat(10.0), DVec3::splat(20.0));
		assert!(a.overlaps(&b));
		assert!(b.overlaps(&a));
	}

	#[test]
	fn test_overlaps_false() {
		let a = Aabb::new(DVec3::ZERO, DVec3::splat(10.0));
		let b = Aabb::new(DVec3::splat(11.0), DVec3::splat(20.0));
		assert!(!a.overlaps(&b));
	}

	#[test]
	fn test_octant_layout() {
		let aabb = Aabb::new(DVec3::ZERO, DVec3::splat(8.0));

		assert_eq!(aabb.octant(0), Aabb::new(DVec3::ZERO, DVec3::splat(4.0)));
		// bit 2 = +X
		assert_eq!(aabb.octant(4).min, DVec3::new(4.0, 0.0, 0.0));
		// bit 1 = +Y
		assert_eq!(aabb.octant(2).min, DVec3::new(0.0, 4.0, 0.0));
		// bit 0 = +Z
		assert_eq!(aabb.octant(1).min, DVec3::new(0.0, 0.0, 4.0));
		assert_eq!(aabb.octant(7).max, DVec3::splat(8.0));
	}

	#[test]
	fn test_empty_expand() {
		let mut aabb = Aabb::empty();
		assert!(aabb.is_empty());
		aabb.expand_to_point(DVec3::new(1.0, 2.0, 3.0));
		aabb.expand_to_point(DVec3::new(-1.0, 0.0, 5.0));
		assert!(!aabb.is_empty());
		assert_eq!(aabb.min, DVec3::new(-1.0, 0.0, 3.0));
		assert_eq!(aabb.max, DVec3::new(1.0, 2.0, 5.0));
	}

	#[test]
	fn test_bounding_sphere() {
		let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
		let sphere = aabb.bounding_sphere();
		assert_eq!(sphere.center, DVec3::ZERO);
		assert!((sphere.radius - 3.0_f64.sqrt()).abs() < 1e-12);
	}

	#[test]
	fn test_transform_translation() {
		let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
		let moved = aabb.transform(&DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)));
		assert_eq!(moved.min, DVec3::new(10.0, 0.0, 0.0));
		assert_eq!(moved.max, DVec3::new(11.0, 1.0, 1.0));
	}

	#[test]
	fn test_sphere_apply_matrix_scales_radius() {
		let sphere = Sphere::new(DVec3::ZERO, 1.0);
		let m = DMat4::from_scale_rotation_translation(
			DVec3::new(1.0, 3.0, 2.0),
			glam::DQuat::IDENTITY,
			DVec3::new(0.0, 0.0, 5.0),
		);
		let out = sphere.apply_matrix(&m);
		assert_eq!(out.center, DVec3::new(0.0, 0.0, 5.0));
		assert!((out.radius - 3.0).abs() < 1e-12);
	}
}
