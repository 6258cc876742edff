//! Octree data model.
//!
//! One [`PointCloudOctree`] per model owns an arena of [`OctreeNode`]s. A node
//! is either plain geometry (point data not on the GPU) or a tree node (point
//! data uploaded); see [`node`] for the state machine.
//!
//! # Module Structure
//!
//! - [`key`]: `NodeKey` - "D-X-Y-Z" cell address
//! - [`node`]: `GeometryNode`, `TreeNode`, `Residency`, `LoadState`
//! - [`tree`]: `PointCloudOctree` - arena, promotion/eviction, disposal
//! - [`hierarchy`]: hierarchy file parsing and stub materialization

pub mod hierarchy;
pub mod key;
pub mod node;
pub mod tree;

// Re-exports
pub use hierarchy::{parse_hierarchy, HierarchyEntry};
pub use key::NodeKey;
pub use node::{GeometryNode, LoadState, NodeId, OctreeNode, Residency, TreeNode};
pub use tree::{ModelId, PointCloudOctree};
