//! pointcloud_octree - Renderer-independent octree point-cloud streaming
//!
//! Decides every frame, under a point budget, which cells of an octree-organized
//! point cloud to load, keep resident on the GPU, draw, and evict.
//!
//! # Features
//!
//! - **Visibility pass**: priority-queue traversal ordered by projected screen
//!   size, with frustum, max-level and minimum-pixel-size culling
//! - **Streaming**: hierarchy and point payloads fetched and decoded on a
//!   bounded pool of decode workers, results applied on the caller's thread
//! - **Residency**: LRU eviction of GPU buffers under the point budget
//! - **Picking**: index-encoded pick pass over the visible nodes
//!
//! # Example
//!
//! ```ignore
//! use pointcloud_octree::{FileSource, PointCloudManager, StreamingConfig};
//! use web_time::Instant;
//!
//! let mut manager = PointCloudManager::new(StreamingConfig::load(path)?)?;
//! manager.add_source(Arc::new(FileSource::new("data/lion")), Instant::now())?;
//!
//! // Every frame
//! manager.update_camera(camera, Instant::now());
//! if let Some(pass) = manager.update(&mut renderer, Instant::now()) {
//!     println!("{} nodes, {} points", pass.visible_nodes.len(), pass.num_visible_points);
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod heap;
pub mod lru;
pub mod metrics;
pub mod throttle;

pub use config::StreamingConfig;
pub use error::{ConfigError, DecodeError, FetchError, HierarchyError, LoadError, MetadataError, RenderError};
pub use geometry::{Aabb, Camera, Frustum, Projection, Ray, Sphere};

// Octree data model: arena nodes, keys, hierarchy
pub mod octree;
pub use octree::{LoadState, ModelId, NodeId, NodeKey, PointCloudOctree};

// Sources, decoding and the worker pool
pub mod loading;
pub use loading::{FileSource, LoadCounter, LoadingState, MemorySource, NodeLoader, NodeSource, WorkerPool};

// Renderer abstraction and GPU picking
pub mod picking;
pub use picking::{PickParams, PickPoint, PointRenderer};

// Per-frame visibility pass
pub mod visibility;
pub use visibility::{NodeHandle, VisibilityEngine, VisibilityUpdate};

// Scene composition root
pub mod manager;
pub use manager::PointCloudManager;

#[cfg(test)]
mod test_utils;
