//! Where node payloads come from.
//!
//! A source is addressed by node key and is called from decode workers, so it
//! must be `Send + Sync`. Transport-level problems surface as [`FetchError`];
//! an empty body is always an error.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::FetchError;
use crate::octree::NodeKey;

/// Blocking byte source for one EPT dataset.
pub trait NodeSource: Send + Sync {
  /// Contents of `ept.json`.
  fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError>;

  /// Hierarchy document rooted at `key`.
  fn fetch_hierarchy(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError>;

  /// Binary point payload of `key`.
  fn fetch_points(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError>;
}

fn non_empty(bytes: Vec<u8>, what: impl FnOnce() -> String) -> Result<Vec<u8>, FetchError> {
  if bytes.is_empty() {
    return Err(FetchError::EmptyResponse(what()));
  }
  Ok(bytes)
}

// =============================================================================
// FileSource
// =============================================================================

/// EPT dataset on the local filesystem.
///
/// ```text
/// root/
/// ├── ept.json
/// ├── ept-hierarchy/<D-X-Y-Z>.json
/// └── ept-data/<D-X-Y-Z>.bin
/// ```
#[derive(Clone, Debug)]
pub struct FileSource {
  root: PathBuf,
}

impl FileSource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn read(&self, path: PathBuf) -> Result<Vec<u8>, FetchError> {
    let bytes = fs::read(&path).map_err(|err| match err.kind() {
      ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
      _ => FetchError::Io(err),
    })?;
    non_empty(bytes, || path.display().to_string())
  }
}

impl NodeSource for FileSource {
  fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError> {
    self.read(self.root.join("ept.json"))
  }

  fn fetch_hierarchy(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError> {
    self.read(self.root.join("ept-hierarchy").join(format!("{key}.json")))
  }

  fn fetch_points(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError> {
    self.read(self.root.join("ept-data").join(format!("{key}.bin")))
  }
}

// =============================================================================
// MemorySource
// =============================================================================

#[derive(Default)]
struct MemoryEntries {
  metadata: Option<Vec<u8>>,
  hierarchy: HashMap<NodeKey, Vec<u8>>,
  points: HashMap<NodeKey, Vec<u8>>,
  /// Keys answered with a transport status instead of data.
  failures: HashMap<NodeKey, u16>,
}

/// In-memory dataset, for embedding generated clouds.
#[derive(Default)]
pub struct MemorySource {
  entries: Mutex<MemoryEntries>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_entries<R>(&self, f: impl FnOnce(&mut MemoryEntries) -> R) -> R {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut entries)
  }

  pub fn set_metadata(&self, bytes: Vec<u8>) {
    self.with_entries(|e| e.metadata = Some(bytes));
  }

  pub fn insert_hierarchy(&self, key: NodeKey, bytes: Vec<u8>) {
    self.with_entries(|e| e.hierarchy.insert(key, bytes));
  }

  pub fn insert_points(&self, key: NodeKey, bytes: Vec<u8>) {
    self.with_entries(|e| e.points.insert(key, bytes));
  }

  /// Make every fetch for `key` fail with `status`.
  pub fn fail_with_status(&self, key: NodeKey, status: u16) {
    self.with_entries(|e| e.failures.insert(key, status));
  }

  fn lookup(&self, key: &NodeKey, pick: impl FnOnce(&MemoryEntries) -> Option<Vec<u8>>, what: &str) -> Result<Vec<u8>, FetchError> {
    let found = self.with_entries(|e| match e.failures.get(key) {
      Some(status) => Err(FetchError::Status(*status)),
      None => Ok(pick(e)),
    })?;
    let bytes = found.ok_or_else(|| FetchError::NotFound(format!("{what} {key}")))?;
    non_empty(bytes, || format!("{what} {key}"))
  }
}

impl NodeSource for MemorySource {
  fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError> {
    let bytes = self
      .with_entries(|e| e.metadata.clone())
      .ok_or_else(|| FetchError::NotFound("ept.json".to_string()))?;
    non_empty(bytes, || "ept.json".to_string())
  }

  fn fetch_hierarchy(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError> {
    self.lookup(key, |e| e.hierarchy.get(key).cloned(), "hierarchy")
  }

  fn fetch_points(&self, key: &NodeKey) -> Result<Vec<u8>, FetchError> {
    self.lookup(key, |e| e.points.get(key).cloned(), "points")
  }
}
