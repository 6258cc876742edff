//! Engine-wide defaults.
//!
//! These seed [`StreamingConfig`](crate::config::StreamingConfig) and are the
//! values used when a config file omits a field.

/// Default maximum number of points resident across all octrees.
pub const DEFAULT_POINT_BUDGET: u64 = 1_000_000;

/// Maximum number of loaded nodes promoted to GPU residency in one pass.
///
/// Bounds the per-frame upload cost.
pub const MAX_LOADS_TO_GPU: usize = 2;

/// Maximum number of node loads in flight at once (global ceiling).
pub const MAX_NUM_NODES_LOADING: usize = 4;

/// Children whose bounding sphere projects smaller than this many pixels
/// (radius) are never enqueued.
pub const DEFAULT_MIN_NODE_PIXEL_SIZE: f64 = 50.0;

/// Default size of the decode worker pool.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Idle decode workers are terminated after this long without work.
pub const DEFAULT_WORKER_IDLE_TIMEOUT_MS: u64 = 5_000;

/// Minimum interval between two throttled visibility passes.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 100;

/// Edge length in pixels of the square pick window.
pub const DEFAULT_PICK_WINDOW_SIZE: u32 = 15;

/// Node indices are packed one-based into the alpha byte, with 0 meaning
/// background and 255 reserved, so one pick call renders at most this many
/// node batches.
pub const MAX_PICK_BATCHES: usize = 254;

/// Weight given to octree roots and to children that contain the camera.
pub const MAX_WEIGHT: f64 = f64::MAX;

/// Number of child slots per octree node.
pub const OCTREE_CHILDREN: usize = 8;
