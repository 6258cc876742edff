//! Visibility pass benchmarks.
//!
//! Runs the pass over a synthetic, fully resident octree so the numbers cover
//! traversal, culling and LRU bookkeeping only (no uploads, no loads):
//! - **near**: camera close enough that most of the tree is enqueued
//! - **far**: screen-size culling keeps the pass shallow
//! - **budget_bound**: a small point budget ends the pass early

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use pointcloud_octree::{
  error::RenderError,
  loading::{DimensionKind, PointAttributes, PointSchema, SchemaField},
  picking::{GpuBuffer, PickBatch, PixelRect, RenderState, Viewport},
  Aabb, Camera, LoadCounter, LoadState, MemorySource, NodeId, NodeLoader, PointCloudOctree, PointRenderer,
  Projection, VisibilityEngine, WorkerPool,
};

// =============================================================================
// Synthetic scene
// =============================================================================

/// Renderer that hands out buffer ids and draws nothing.
#[derive(Default)]
struct NullRenderer {
  next_buffer: u64,
  state: RenderState,
}

impl PointRenderer for NullRenderer {
  fn viewport(&self) -> Viewport {
    Viewport::new(1920, 1080)
  }

  fn upload_points(&mut self, _points: &PointAttributes) -> Result<GpuBuffer, RenderError> {
    self.next_buffer += 1;
    Ok(GpuBuffer(self.next_buffer))
  }

  fn release_points(&mut self, _buffer: GpuBuffer) {}

  fn render_state(&self) -> RenderState {
    self.state.clone()
  }

  fn set_render_state(&mut self, state: &RenderState) {
    self.state = state.clone();
  }

  fn prepare_pick_target(&mut self, _width: u32, _height: u32) -> Result<(), RenderError> {
    Ok(())
  }

  fn render_pick_batch(&mut self, _batch: &PickBatch, _camera: &Camera) -> Result<(), RenderError> {
    Ok(())
  }

  fn read_pixels(&mut self, _rect: PixelRect, _out: &mut [u8]) -> Result<(), RenderError> {
    Ok(())
  }
}

fn xyz_schema() -> PointSchema {
  let fields: Vec<SchemaField> = ["X", "Y", "Z"]
    .into_iter()
    .map(|name| SchemaField {
      name: name.to_string(),
      kind: DimensionKind::Float,
      size: 4,
      scale: None,
      offset: None,
    })
    .collect();
  PointSchema::from_fields(&fields).expect("xyz schema")
}

/// Complete octree of `depth` levels below the root, every node resident with
/// `points_per_node` points.
fn resident_octree(depth: u32, points_per_node: usize, renderer: &mut NullRenderer) -> PointCloudOctree {
  let bounds = Aabb::new(DVec3::ZERO, DVec3::splat(1024.0));
  let mut octree = PointCloudOctree::new(bounds, 8.0, Arc::new(xyz_schema()), Arc::new(MemorySource::new()));

  let mut frontier = vec![octree.root()];
  for _ in 0..depth {
    let mut next = Vec::new();
    for parent in frontier {
      for octant in 0..8u8 {
        next.push(octree.insert_child(parent, octant, Some(points_per_node as u64)));
      }
    }
    frontier = next;
  }

  let ids: Vec<NodeId> = octree.nodes().map(|n| n.id()).collect();
  let positions = Arc::new(PointAttributes::from_positions(vec![[0.0; 3]; points_per_node]));
  for id in ids {
    let geometry = &mut octree.node_mut(id).geometry;
    geometry.num_points = Some(points_per_node as u64);
    geometry.points = Some(Arc::clone(&positions));
    geometry.state = LoadState::Loaded;
    octree.promote(id, renderer).expect("null upload");
  }
  octree
}

fn camera_at(distance: f64) -> Camera {
  let projection = Projection::Perspective {
    fov_y_degrees: 60.0,
    aspect: 16.0 / 9.0,
    near: 0.1,
    far: 100_000.0,
  };
  let center = DVec3::splat(512.0);
  Camera::look_at(projection, center + DVec3::new(0.0, 0.0, distance), center, DVec3::Y)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_visibility_pass(c: &mut Criterion) {
  let mut group = c.benchmark_group("visibility_pass");
  let mut renderer = NullRenderer::default();
  let mut octrees = vec![resident_octree(4, 1_000, &mut renderer)];
  let loader = NodeLoader::new(WorkerPool::new(1, Duration::from_secs(5)), LoadCounter::new(), 4);

  let scenarios = [
    ("near", 900.0, 100_000_000u64),
    ("far", 20_000.0, 100_000_000),
    ("budget_bound", 900.0, 200_000),
  ];

  for (name, distance, budget) in scenarios {
    let camera = camera_at(distance);
    let mut engine = VisibilityEngine::new(budget, usize::MAX, 4);
    group.bench_with_input(BenchmarkId::new("depth4", name), &camera, |b, camera| {
      b.iter(|| {
        let update = engine.update(&mut octrees, camera, &mut renderer, &loader);
        black_box(update.num_visible_points)
      });
    });
  }

  group.finish();
}

criterion_group! {
  name = benches;
  config = Criterion::default().sample_size(50);
  targets = bench_visibility_pass
}
criterion_main!(benches);
