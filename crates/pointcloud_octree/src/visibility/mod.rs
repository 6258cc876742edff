//! Visibility pass: which nodes to show, promote, load and evict.
//!
//! - [`priority`]: `QueueItem` and the screen-space weight
//! - [`engine`]: `VisibilityEngine` - the pass itself plus the resident LRU

pub mod engine;
pub mod priority;

pub use engine::{NodeHandle, VisibilityEngine, VisibilityUpdate};
pub use priority::{child_weight, projected_radius, projection_factor, QueueItem};
