//! Error types.
//!
//! Node-local failures (fetch, hierarchy, decode) never reach the visibility
//! engine as errors: the loader converts them into
//! [`LoadState::Failed`](crate::octree::LoadState::Failed) on the node.

use thiserror::Error;

/// Transport failure while fetching metadata, hierarchy or point payloads.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("resource not found: {0}")]
  NotFound(String),
  #[error("transport returned status {0}")]
  Status(u16),
  #[error("empty response for {0}")]
  EmptyResponse(String),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Malformed binary point payload.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("point buffer is empty")]
  EmptyBuffer,
  #[error("buffer of {len} bytes is not a whole number of {stride}-byte records")]
  Truncated { len: usize, stride: usize },
  #[error("schema has no {0} dimension")]
  MissingDimension(&'static str),
  #[error("dimension {name} has unsupported type {kind}/{size}")]
  UnsupportedType {
    name: String,
    kind: String,
    size: usize,
  },
}

/// Malformed hierarchy description.
#[derive(Debug, Error)]
pub enum HierarchyError {
  #[error("hierarchy is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid node key {0:?}")]
  InvalidKey(String),
}

/// Why a node load did not produce point data.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  Hierarchy(#[from] HierarchyError),
  #[error(transparent)]
  Decode(#[from] DecodeError),
  #[error("decode worker panicked")]
  WorkerPanicked,
}

/// Invalid or unsupported model metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error("metadata is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("bounds must have 6 components with min <= max")]
  InvalidBounds,
  #[error("unsupported data type {0:?}")]
  UnsupportedDataType(String),
  #[error(transparent)]
  Schema(#[from] DecodeError),
}

/// Configuration file could not be read or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("failed to parse config TOML: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Failure reported by a [`PointRenderer`](crate::picking::PointRenderer).
#[derive(Debug, Error)]
pub enum RenderError {
  #[error("failed to upload point buffer: {0}")]
  Upload(String),
  #[error("failed to read pixels: {0}")]
  ReadPixels(String),
}
