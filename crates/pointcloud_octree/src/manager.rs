//! PointCloudManager - composition root of a streamed scene.
//!
//! Owns the models, the visibility engine (and its LRU), the loader with its
//! worker pool, and the injected load counter. The host drives it from its
//! frame loop:
//!
//! ```text
//! camera moved ──► update_camera(camera, now) ──► throttle.request
//!                                                    │ leading: pass due
//! every frame  ──► update(renderer, now)             ▼
//!                   ├─ apply load completions ──► completions re-request
//!                   ├─ promotions held back ──► re-request
//!                   ├─ throttle.poll (trailing run)
//!                   ├─ visibility pass if due
//!                   └─ broadcast LoadingState if it changed
//! ```
//!
//! Separate managers in one process share nothing unless they are handed the
//! same [`LoadCounter`].

use std::sync::Arc;

use crossbeam_channel::{self as channel, Receiver, Sender};
use tracing::{debug, info};
// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

use crate::config::StreamingConfig;
use crate::error::{ConfigError, MetadataError, RenderError};
use crate::geometry::{Camera, Ray};
use crate::loading::{CompletionSummary, LoadCounter, LoadingState, NodeLoader, NodeSource};
use crate::metrics::StreamingMetrics;
use crate::octree::{ModelId, PointCloudOctree};
use crate::picking::{self, PickParams, PickPoint, PointRenderer};
use crate::throttle::Throttle;
use crate::visibility::{NodeHandle, VisibilityEngine, VisibilityUpdate};

pub struct PointCloudManager {
  config: StreamingConfig,
  octrees: Vec<PointCloudOctree>,
  engine: VisibilityEngine,
  loader: NodeLoader,
  throttle: Throttle,
  /// Set by a leading throttle run, consumed by the next `update`.
  pass_due: bool,
  /// The last pass held back loaded nodes at the promotion cap.
  promotion_pending: bool,
  camera: Option<Camera>,
  subscribers: Vec<Sender<LoadingState>>,
  last_state: LoadingState,
  last_update: Option<VisibilityUpdate>,
  metrics: StreamingMetrics,
}

impl PointCloudManager {
  /// Create a manager with its own load counter.
  pub fn new(config: StreamingConfig) -> Result<Self, ConfigError> {
    Self::with_counter(config, LoadCounter::new())
  }

  /// Create a manager around an injected load counter.
  pub fn with_counter(config: StreamingConfig, counter: LoadCounter) -> Result<Self, ConfigError> {
    config.validate()?;
    let last_state = counter.state();
    Ok(Self {
      engine: VisibilityEngine::from_config(&config),
      loader: NodeLoader::from_config(&config, counter),
      throttle: Throttle::new(config.update_interval()),
      pass_due: false,
      promotion_pending: false,
      camera: None,
      subscribers: Vec::new(),
      last_state,
      last_update: None,
      metrics: StreamingMetrics::new(),
      octrees: Vec::new(),
      config,
    })
  }

  pub fn config(&self) -> &StreamingConfig {
    &self.config
  }

  // ---------------------------------------------------------------------------
  // Models
  // ---------------------------------------------------------------------------

  /// Take ownership of a model. Its minimum node pixel size is taken from
  /// the config.
  pub fn add_model(&mut self, mut octree: PointCloudOctree, now: Instant) -> ModelId {
    octree.min_node_pixel_size = self.config.min_node_pixel_size;
    let id = octree.id();
    info!(
      model = id.raw(),
      nodes = octree.len(),
      spacing = octree.spacing(),
      "Point cloud added"
    );
    self.octrees.push(octree);
    self.request_update(now);
    id
  }

  /// Open an EPT dataset from `source` and add it.
  pub fn add_source(&mut self, source: Arc<dyn NodeSource>, now: Instant) -> Result<ModelId, MetadataError> {
    let octree = PointCloudOctree::open(source)?;
    Ok(self.add_model(octree, now))
  }

  /// Dispose a model and forget its resident nodes. In-flight loads for it
  /// complete into no-ops. Returns false for an unknown id.
  pub fn remove_model(&mut self, id: ModelId, renderer: &mut dyn PointRenderer) -> bool {
    let Some(index) = self.octrees.iter().position(|o| o.id() == id) else {
      return false;
    };
    let mut octree = self.octrees.remove(index);
    let released = octree.dispose(renderer);
    self.engine.forget(id, &released);
    self.metrics.record_evicted(released.len());
    info!(model = id.raw(), released = released.len(), "Point cloud removed");
    true
  }

  pub fn models(&self) -> &[PointCloudOctree] {
    &self.octrees
  }

  pub fn model(&self, id: ModelId) -> Option<&PointCloudOctree> {
    self.octrees.iter().find(|o| o.id() == id)
  }

  pub fn model_mut(&mut self, id: ModelId) -> Option<&mut PointCloudOctree> {
    self.octrees.iter_mut().find(|o| o.id() == id)
  }

  // ---------------------------------------------------------------------------
  // Frame loop
  // ---------------------------------------------------------------------------

  /// Record a new camera and ask for a (throttled) visibility pass.
  pub fn update_camera(&mut self, camera: Camera, now: Instant) {
    self.camera = Some(camera);
    self.request_update(now);
  }

  pub fn camera(&self) -> Option<&Camera> {
    self.camera.as_ref()
  }

  fn request_update(&mut self, now: Instant) {
    if self.throttle.request(now) {
      self.pass_due = true;
    }
  }

  /// Per-frame tick: apply finished loads, then run a visibility pass if one
  /// is due. Returns the pass result when a pass ran.
  pub fn update(&mut self, renderer: &mut dyn PointRenderer, now: Instant) -> Option<VisibilityUpdate> {
    let summary = self.loader.apply_completions(&mut self.octrees);
    self.after_completions(&summary, now);
    // Loaded nodes past the promotion cap never post a completion
    if std::mem::take(&mut self.promotion_pending) {
      self.request_update(now);
    }

    if self.throttle.poll(now) {
      self.pass_due = true;
    }

    let mut result = None;
    if self.pass_due {
      if let Some(camera) = self.camera {
        self.pass_due = false;
        result = Some(self.update_point_clouds(&camera, renderer));
      }
    }
    self.publish_loading_state();
    result
  }

  fn after_completions(&mut self, summary: &CompletionSummary, now: Instant) {
    if summary.is_empty() {
      return;
    }
    self.metrics.record_completions(summary);
    if summary.applied() > 0 {
      debug!(
        loaded = summary.loaded.len(),
        failed = summary.failed.len(),
        "Load completions applied"
      );
      self.request_update(now);
    }
  }

  /// Run a visibility pass right away, bypassing the throttle.
  pub fn update_point_clouds(&mut self, camera: &Camera, renderer: &mut dyn PointRenderer) -> VisibilityUpdate {
    self.camera = Some(*camera);
    let start = Instant::now();
    let update = self.engine.update(&mut self.octrees, camera, renderer, &self.loader);
    let elapsed_us = start.elapsed().as_micros() as u64;

    self.promotion_pending = update.exceeded_max_loads_to_gpu;
    self.metrics.record_pass(&update, elapsed_us);
    let lru = self.engine.lru();
    self.metrics.record_residency(lru.len(), lru.num_points());
    self.publish_loading_state();

    self.last_update = Some(update.clone());
    update
  }

  /// Result of the most recent visibility pass.
  pub fn last_update(&self) -> Option<&VisibilityUpdate> {
    self.last_update.as_ref()
  }

  // ---------------------------------------------------------------------------
  // Budget
  // ---------------------------------------------------------------------------

  #[inline]
  pub fn point_budget(&self) -> u64 {
    self.engine.point_budget()
  }

  /// Change the point budget; shrinking it evicts non-visible nodes at once.
  pub fn set_point_budget(&mut self, point_budget: u64, renderer: &mut dyn PointRenderer) -> Vec<NodeHandle> {
    self.config.point_budget = point_budget;
    let evicted = self.engine.set_point_budget(point_budget, &mut self.octrees, renderer);
    self.metrics.record_evicted(evicted.len());
    evicted
  }

  // ---------------------------------------------------------------------------
  // Loading state
  // ---------------------------------------------------------------------------

  pub fn loading_state(&self) -> LoadingState {
    self.loader.counter().state()
  }

  pub fn counter(&self) -> &LoadCounter {
    self.loader.counter()
  }

  /// Subscribe to loading-state changes. The current state is sent right
  /// away; afterwards a state is sent whenever it changes.
  pub fn subscribe_loading_state(&mut self) -> Receiver<LoadingState> {
    // Bring existing subscribers and `last_state` up to date first
    self.publish_loading_state();
    let (sender, receiver) = channel::unbounded();
    // Cannot fail: the receiver is still alive
    let _ = sender.send(self.last_state);
    self.subscribers.push(sender);
    receiver
  }

  fn publish_loading_state(&mut self) {
    let state = self.loader.counter().state();
    if state == self.last_state {
      return;
    }
    self.last_state = state;
    self.subscribers.retain(|subscriber| subscriber.send(state).is_ok());
  }

  // ---------------------------------------------------------------------------
  // Picking
  // ---------------------------------------------------------------------------

  /// Pick parameters seeded from the config.
  pub fn default_pick_params(&self) -> PickParams {
    PickParams {
      pick_window_size: self.config.pick_window_size,
      ..Default::default()
    }
  }

  /// Pick the point under `ray` using the last camera. Returns `Ok(None)`
  /// before the first camera update.
  pub fn pick(
    &self,
    renderer: &mut dyn PointRenderer,
    ray: &Ray,
    params: &PickParams,
  ) -> Result<Option<PickPoint>, RenderError> {
    let Some(camera) = self.camera.as_ref() else {
      return Ok(None);
    };
    picking::pick(renderer, camera, ray, &self.octrees, params)
  }

  pub fn metrics(&self) -> &StreamingMetrics {
    &self.metrics
  }

  /// Dispose every model.
  pub fn dispose(&mut self, renderer: &mut dyn PointRenderer) {
    let ids: Vec<ModelId> = self.octrees.iter().map(|o| o.id()).collect();
    for id in ids {
      self.remove_model(id, renderer);
    }
  }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
