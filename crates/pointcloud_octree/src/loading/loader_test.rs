use std::time::Duration;

use super::*;
use crate::octree::NodeKey;
use crate::test_utils::{full_octree, memory_octree, MockRenderer};

fn test_loader(max_in_flight: usize) -> NodeLoader {
  NodeLoader::new(
    WorkerPool::new(2, Duration::from_secs(5)),
    LoadCounter::new(),
    max_in_flight,
  )
}

/// Apply completions until `expected` have been handled or five seconds pass.
fn drain(loader: &NodeLoader, octrees: &mut [PointCloudOctree], expected: usize) -> CompletionSummary {
  let deadline = Instant::now() + Duration::from_secs(5);
  let mut total = CompletionSummary::default();
  while total.applied() + total.ignored < expected && Instant::now() < deadline {
    let summary = loader.apply_completions_timeout(octrees, Duration::from_millis(50));
    total.loaded.extend(summary.loaded);
    total.failed.extend(summary.failed);
    total.ignored += summary.ignored;
    total.latencies.extend(summary.latencies);
  }
  total
}

#[test]
fn test_root_load_materializes_hierarchy() {
  let (_source, octree) = memory_octree(1, 4);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();

  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::Started);
  assert!(octrees[0].node(root).geometry.is_loading());

  let summary = drain(&loader, &mut octrees, 1);

  assert_eq!(summary.loaded, vec![(octrees[0].id(), root)]);
  assert_eq!(summary.latencies.len(), 1);
  let geometry = &octrees[0].node(root).geometry;
  assert!(geometry.is_loaded());
  assert_eq!(geometry.num_points, Some(4));
  assert_eq!(geometry.points.as_ref().map(|p| p.num_points), Some(4));
  assert!(geometry.tight_bounds.is_some());

  // Root plus eight children, each with a known count
  assert_eq!(octrees[0].len(), 9);
  for child in octrees[0].node(root).geometry.child_ids() {
    assert_eq!(octrees[0].node(child).geometry.num_points, Some(4));
  }
}

#[test]
fn test_child_load_decodes_relative_positions() {
  let (_source, octree) = memory_octree(1, 4);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();
  loader.load(&mut octrees[0], root);
  drain(&loader, &mut octrees, 1);

  let child = octrees[0].find(&NodeKey::new(1, 1, 1, 1)).unwrap();
  assert!(!octrees[0].node(child).geometry.needs_hierarchy());
  assert_eq!(loader.load(&mut octrees[0], child), LoadOutcome::Started);
  drain(&loader, &mut octrees, 1);

  let geometry = &octrees[0].node(child).geometry;
  assert!(geometry.is_loaded());
  let points = geometry.points.as_ref().unwrap();
  for p in &points.position {
    for v in p {
      assert!((0.0..=32.0).contains(v), "position {v} not relative to cell");
    }
  }
}

#[test]
fn test_duplicate_load_is_rejected() {
  let (_source, octree) = memory_octree(0, 4);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();

  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::Started);
  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::AlreadyLoading);
  assert_eq!(loader.counter().state().items_requested, 1);

  drain(&loader, &mut octrees, 1);
  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::AlreadyLoaded);
}

#[test]
fn test_in_flight_ceiling() {
  let mut octrees = vec![full_octree(1, 4)];
  let loader = test_loader(1);
  let children: Vec<NodeId> = octrees[0].node(octrees[0].root()).geometry.child_ids().collect();
  let (first, second) = (children[0], children[1]);

  assert_eq!(loader.load(&mut octrees[0], first), LoadOutcome::Started);
  assert_eq!(loader.load(&mut octrees[0], second), LoadOutcome::AtCapacity);
  assert_eq!(octrees[0].node(second).geometry.state, LoadState::Unloaded);

  // The empty source fails the first load, which frees the slot
  let summary = drain(&loader, &mut octrees, 1);
  assert_eq!(summary.failed.len(), 1);
  assert_eq!(loader.load(&mut octrees[0], second), LoadOutcome::Started);
}

#[test]
fn test_failed_fetch_marks_node_failed() {
  let (source, octree) = memory_octree(0, 4);
  source.fail_with_status(NodeKey::ROOT, 503);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();

  loader.load(&mut octrees[0], root);
  let summary = drain(&loader, &mut octrees, 1);

  assert_eq!(summary.failed, vec![(octrees[0].id(), root)]);
  assert!(octrees[0].node(root).geometry.has_failed());
  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::Failed);

  let state = loader.counter().state();
  assert!(!state.is_loading);
  assert_eq!(state.items_requested, 1);
  assert_eq!(state.items_loaded, 1);
  assert_eq!(loader.counter().failed(), 1);
}

#[test]
fn test_completion_for_disposed_model_is_ignored() {
  let (_source, octree) = memory_octree(0, 4);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();
  let mut renderer = MockRenderer::default();

  loader.load(&mut octrees[0], root);
  octrees[0].dispose(&mut renderer);
  let summary = drain(&loader, &mut octrees, 1);

  assert_eq!(summary.ignored, 1);
  assert!(summary.loaded.is_empty());
  assert!(octrees[0].node(root).geometry.points.is_none());
  assert_eq!(loader.counter().in_flight(), 0);
  assert_eq!(loader.load(&mut octrees[0], root), LoadOutcome::Disposed);
}

#[test]
fn test_completion_for_removed_model_is_ignored() {
  let (_source, octree) = memory_octree(0, 4);
  let mut octrees = vec![octree];
  let loader = test_loader(4);
  let root = octrees[0].root();

  loader.load(&mut octrees[0], root);
  let summary = drain(&loader, &mut [], 1);

  assert_eq!(summary.ignored, 1);
  assert!(!loader.counter().state().is_loading);
  assert_eq!(loader.counter().state().items_loaded, 1);
}

#[test]
fn test_apply_without_completions_is_empty() {
  let loader = test_loader(4);
  let mut octrees = vec![full_octree(0, 1)];
  assert!(loader.apply_completions(&mut octrees).is_empty());
}
