//! Streaming configuration.
//!
//! Every field has a default, so a partial TOML file (or none at all) is valid:
//!
//! ```toml
//! point_budget = 3_000_000
//! max_workers = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
  DEFAULT_MAX_WORKERS, DEFAULT_MIN_NODE_PIXEL_SIZE, DEFAULT_PICK_WINDOW_SIZE, DEFAULT_POINT_BUDGET,
  DEFAULT_UPDATE_INTERVAL_MS, DEFAULT_WORKER_IDLE_TIMEOUT_MS, MAX_LOADS_TO_GPU,
  MAX_NUM_NODES_LOADING,
};
use crate::error::ConfigError;

/// Tunables for visibility, loading and picking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
  /// Maximum points resident across all models.
  pub point_budget: u64,
  /// Loaded nodes promoted to GPU residency per pass.
  pub max_loads_to_gpu: usize,
  /// Node loads in flight at once.
  pub max_nodes_loading: usize,
  /// Default minimum projected radius (pixels) for new models.
  pub min_node_pixel_size: f64,
  /// Decode worker threads.
  pub max_workers: usize,
  /// Idle time before a decode worker exits.
  pub worker_idle_timeout_ms: u64,
  /// Minimum interval between throttled visibility passes.
  pub update_interval_ms: u64,
  /// Pick window edge length in pixels (odd).
  pub pick_window_size: u32,
}

impl Default for StreamingConfig {
  fn default() -> Self {
    Self {
      point_budget: DEFAULT_POINT_BUDGET,
      max_loads_to_gpu: MAX_LOADS_TO_GPU,
      max_nodes_loading: MAX_NUM_NODES_LOADING,
      min_node_pixel_size: DEFAULT_MIN_NODE_PIXEL_SIZE,
      max_workers: DEFAULT_MAX_WORKERS,
      worker_idle_timeout_ms: DEFAULT_WORKER_IDLE_TIMEOUT_MS,
      update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
      pick_window_size: DEFAULT_PICK_WINDOW_SIZE,
    }
  }
}

impl StreamingConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: StreamingConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// Reject values the engine cannot run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_workers == 0 {
      return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
    }
    if self.max_nodes_loading == 0 {
      return Err(ConfigError::Invalid(
        "max_nodes_loading must be at least 1".into(),
      ));
    }
    if self.pick_window_size == 0 || self.pick_window_size % 2 == 0 {
      return Err(ConfigError::Invalid(format!(
        "pick_window_size must be odd, got {}",
        self.pick_window_size
      )));
    }
    if self.min_node_pixel_size.is_nan() || self.min_node_pixel_size < 0.0 {
      return Err(ConfigError::Invalid(
        "min_node_pixel_size must be non-negative".into(),
      ));
    }
    Ok(())
  }

  #[inline]
  pub fn worker_idle_timeout(&self) -> Duration {
    Duration::from_millis(self.worker_idle_timeout_ms)
  }

  #[inline]
  pub fn update_interval(&self) -> Duration {
    Duration::from_millis(self.update_interval_ms)
  }
}
