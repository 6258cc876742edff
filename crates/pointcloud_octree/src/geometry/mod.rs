//! Spatial primitives shared by traversal and picking.
//!
//! Everything is double precision: octree bounds of georeferenced clouds do
//! not survive f32.

pub mod bounds;
pub mod camera;
pub mod frustum;
pub mod ray;

pub use bounds::{Aabb, Sphere};
pub use camera::{Camera, Projection};
pub use frustum::{Frustum, Plane};
pub use ray::Ray;
