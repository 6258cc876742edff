//! Node loader: fetch + decode on workers, apply results on the main thread.
//!
//! # Flow
//!
//! ```text
//! Main Thread                          Decode worker
//! ┌──────────────────┐
//! │ load(node)       │ guard: state, in-flight ceiling
//! │ state = Loading  │
//! └────────┬─────────┘
//!          │ WorkerPool::execute
//!          ▼
//!                                  ┌──────────────────────┐
//!                                  │ fetch + parse        │ (only if the point
//!                                  │ hierarchy            │  count is unknown)
//!                                  ├──────────────────────┤
//!                                  │ fetch points         │
//!                                  │ decode_points        │
//!                                  └──────────┬───────────┘
//!                                             │ LoadCompletion (channel)
//! ┌──────────────────────┐                    │
//! │ apply_completions()  │◄───────────────────┘
//! │ - materialize stubs  │
//! │ - Loaded / Failed    │
//! │ - counter.finish     │
//! └──────────────────────┘
//! ```
//!
//! Workers never see the octree: jobs carry owned inputs and send owned
//! results back. Every job posts exactly one completion, even when the decode
//! panics, so a node never stays `Loading` forever.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use glam::DVec3;
use tracing::{debug, warn};
use web_time::Instant;

use super::counter::LoadCounter;
use super::decoder::{decode_points, DecodedNode};
use super::schema::PointSchema;
use super::source::NodeSource;
use super::worker_pool::WorkerPool;
use crate::config::StreamingConfig;
use crate::error::LoadError;
use crate::octree::{parse_hierarchy, HierarchyEntry, LoadState, ModelId, NodeId, NodeKey, PointCloudOctree};

/// Result of a [`NodeLoader::load`] request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
  Started,
  AlreadyLoading,
  AlreadyLoaded,
  /// The node failed before and is not retried.
  Failed,
  /// The in-flight ceiling is reached.
  AtCapacity,
  /// The model has been disposed.
  Disposed,
}

/// Owned inputs of one load job.
struct LoadJob {
  model: ModelId,
  node: NodeId,
  key: NodeKey,
  /// Cell minimum corner; decoded positions are relative to it.
  origin: DVec3,
  needs_hierarchy: bool,
  source: Arc<dyn NodeSource>,
  schema: Arc<PointSchema>,
}

/// Decoded output of a successful job.
pub struct LoadedPayload {
  pub hierarchy: Option<Vec<HierarchyEntry>>,
  pub decoded: DecodedNode,
}

/// Message posted by a worker when a job ends.
pub struct LoadCompletion {
  pub model: ModelId,
  pub node: NodeId,
  pub key: NodeKey,
  pub result: Result<LoadedPayload, LoadError>,
  pub requested_at: Instant,
}

/// What one [`NodeLoader::apply_completions`] call changed.
#[derive(Debug, Default)]
pub struct CompletionSummary {
  pub loaded: Vec<(ModelId, NodeId)>,
  pub failed: Vec<(ModelId, NodeId)>,
  /// Completions for removed or disposed models.
  pub ignored: usize,
  /// Request-to-apply latency of every applied completion.
  pub latencies: Vec<Duration>,
}

impl CompletionSummary {
  /// Number of completions that changed a node.
  pub fn applied(&self) -> usize {
    self.loaded.len() + self.failed.len()
  }

  pub fn is_empty(&self) -> bool {
    self.applied() == 0 && self.ignored == 0
  }
}

#[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "loader::run_job"))]
fn run_job(job: &LoadJob) -> Result<LoadedPayload, LoadError> {
  let hierarchy = if job.needs_hierarchy {
    #[cfg(feature = "tracing-spans")]
    let _span = tracing::info_span!("fetch_hierarchy").entered();
    let bytes = job.source.fetch_hierarchy(&job.key)?;
    Some(parse_hierarchy(&bytes)?)
  } else {
    None
  };
  let decoded = {
    #[cfg(feature = "tracing-spans")]
    let _span = tracing::info_span!("decode_points").entered();
    let bytes = job.source.fetch_points(&job.key)?;
    decode_points(&bytes, &job.schema, job.origin)?
  };
  Ok(LoadedPayload { hierarchy, decoded })
}

/// Issues node loads and applies their results.
pub struct NodeLoader {
  pool: WorkerPool,
  counter: LoadCounter,
  max_in_flight: usize,
  sender: Sender<LoadCompletion>,
  receiver: Receiver<LoadCompletion>,
}

impl NodeLoader {
  pub fn new(pool: WorkerPool, counter: LoadCounter, max_in_flight: usize) -> Self {
    let (sender, receiver) = channel::unbounded();
    Self {
      pool,
      counter,
      max_in_flight,
      sender,
      receiver,
    }
  }

  pub fn from_config(config: &StreamingConfig, counter: LoadCounter) -> Self {
    let pool = WorkerPool::new(config.max_workers, config.worker_idle_timeout());
    Self::new(pool, counter, config.max_nodes_loading)
  }

  pub fn counter(&self) -> &LoadCounter {
    &self.counter
  }

  pub fn pool(&self) -> &WorkerPool {
    &self.pool
  }

  #[inline]
  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight
  }

  pub fn set_max_in_flight(&mut self, max_in_flight: usize) {
    self.max_in_flight = max_in_flight;
  }

  /// Start loading `id` unless it is loading, loaded, failed, or the
  /// in-flight ceiling is reached.
  pub fn load(&self, octree: &mut PointCloudOctree, id: NodeId) -> LoadOutcome {
    if octree.is_disposed() {
      return LoadOutcome::Disposed;
    }
    let geometry = &octree.node(id).geometry;
    match geometry.state {
      LoadState::Loading => return LoadOutcome::AlreadyLoading,
      LoadState::Loaded => return LoadOutcome::AlreadyLoaded,
      LoadState::Failed => return LoadOutcome::Failed,
      LoadState::Unloaded => {}
    }
    if !self.counter.try_begin(self.max_in_flight) {
      return LoadOutcome::AtCapacity;
    }

    let job = LoadJob {
      model: octree.id(),
      node: id,
      key: geometry.key,
      origin: geometry.bounding_box.min,
      needs_hierarchy: geometry.needs_hierarchy(),
      source: Arc::clone(octree.source()),
      schema: Arc::clone(octree.schema()),
    };
    let key = job.key;
    octree.node_mut(id).geometry.state = LoadState::Loading;

    let sender = self.sender.clone();
    let requested_at = Instant::now();
    let submitted = self.pool.execute(Box::new(move || {
      let result = panic::catch_unwind(AssertUnwindSafe(|| run_job(&job))).unwrap_or(Err(LoadError::WorkerPanicked));
      // Receiver gone means the loader was dropped
      let _ = sender.send(LoadCompletion {
        model: job.model,
        node: job.node,
        key: job.key,
        result,
        requested_at,
      });
    }));

    if let Err(err) = submitted {
      warn!(node = %key, error = %err, "Failed to schedule node load");
      self.counter.finish(false);
      octree.mark_failed(id);
      return LoadOutcome::Failed;
    }

    debug!(model = octree.id().raw(), node = %key, "Node load started");
    LoadOutcome::Started
  }

  /// Apply every completion that has arrived, without blocking.
  pub fn apply_completions(&self, octrees: &mut [PointCloudOctree]) -> CompletionSummary {
    let mut summary = CompletionSummary::default();
    while let Ok(completion) = self.receiver.try_recv() {
      self.apply_one(octrees, completion, &mut summary);
    }
    summary
  }

  /// Wait up to `timeout` for at least one completion, then apply all that
  /// have arrived.
  pub fn apply_completions_timeout(&self, octrees: &mut [PointCloudOctree], timeout: Duration) -> CompletionSummary {
    let mut summary = CompletionSummary::default();
    match self.receiver.recv_timeout(timeout) {
      Ok(completion) => self.apply_one(octrees, completion, &mut summary),
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return summary,
    }
    while let Ok(completion) = self.receiver.try_recv() {
      self.apply_one(octrees, completion, &mut summary);
    }
    summary
  }

  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "loader::apply"))]
  fn apply_one(&self, octrees: &mut [PointCloudOctree], completion: LoadCompletion, summary: &mut CompletionSummary) {
    let LoadCompletion {
      model,
      node,
      key,
      result,
      requested_at,
    } = completion;
    let success = result.is_ok();
    self.counter.finish(success);

    let Some(octree) = octrees.iter_mut().find(|o| o.id() == model) else {
      debug!(model = model.raw(), node = %key, "Completion for removed model ignored");
      summary.ignored += 1;
      return;
    };
    if octree.is_disposed() || octree.node(node).geometry.state != LoadState::Loading {
      debug!(model = model.raw(), node = %key, "Stale completion ignored");
      summary.ignored += 1;
      return;
    }

    match result {
      Ok(payload) => {
        if let Some(entries) = payload.hierarchy {
          let applied = octree.apply_hierarchy(node, &entries);
          debug!(node = %key, entries = entries.len(), applied, "Hierarchy materialized");
        }
        let DecodedNode {
          attributes,
          tight_bounds,
          mean,
        } = payload.decoded;
        let geometry = &mut octree.node_mut(node).geometry;
        geometry.num_points = Some(attributes.num_points as u64);
        geometry.points = Some(Arc::new(attributes));
        geometry.tight_bounds = Some(tight_bounds);
        geometry.mean = Some(mean);
        geometry.state = LoadState::Loaded;
        summary.loaded.push((model, node));
      }
      Err(err) => {
        warn!(model = model.raw(), node = %key, error = %err, "Node load failed");
        octree.mark_failed(node);
        summary.failed.push((model, node));
      }
    }
    summary.latencies.push(requested_at.elapsed());
  }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod loader_test;
