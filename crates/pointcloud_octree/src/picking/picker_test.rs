use glam::DVec2;

use super::*;
use crate::octree::PointCloudOctree;
use crate::test_utils::{camera_facing_bounds, empty_octree, make_resident, MockRenderer};

fn pixel(point_index: u32, node_index: u8) -> [u8; 4] {
  let b = point_index.to_le_bytes();
  [b[0], b[1], b[2], node_index]
}

fn window_buffer(window: usize, pixels: &[(usize, usize, [u8; 4])]) -> Vec<u8> {
  let mut buffer = vec![0u8; window * window * 4];
  for &(u, v, rgba) in pixels {
    let offset = u + v * window;
    buffer[4 * offset..4 * offset + 4].copy_from_slice(&rgba);
  }
  buffer
}

/// Root resident and marked visible, as after a visibility pass.
fn visible_root_octree(renderer: &mut MockRenderer) -> PointCloudOctree {
  let mut octree = empty_octree();
  let root = octree.root();
  make_resident(&mut octree, root, 4, renderer);
  octree.visible_nodes.push(root);
  octree
}

// =========================================================================
// find_hit
// =========================================================================

/// One non-background pixel encoding point 15 in node 2 (one-based).
#[test]
fn test_find_hit_decodes_single_pixel() {
  let pixels = window_buffer(2, &[(1, 1, [15, 0, 0, 2])]);

  let hit = find_hit(&pixels, 2, DVec3::ZERO, |_, _| Some(DVec3::ONE));

  assert_eq!(
    hit,
    Some(PickHit {
      point_index: 15,
      node_index: 1
    })
  );
}

#[test]
fn test_find_hit_background_only() {
  let pixels = window_buffer(3, &[]);
  assert_eq!(find_hit(&pixels, 3, DVec3::ZERO, |_, _| Some(DVec3::ONE)), None);
}

/// Alpha 255 is reserved and never a hit.
#[test]
fn test_find_hit_ignores_reserved_alpha() {
  let pixels = window_buffer(3, &[(1, 1, pixel(7, 255))]);
  assert_eq!(find_hit(&pixels, 3, DVec3::ZERO, |_, _| Some(DVec3::ONE)), None);
}

/// The pixel nearest the window center wins when its point is also nearer
/// the camera.
#[test]
fn test_find_hit_prefers_window_center() {
  let pixels = window_buffer(3, &[(0, 0, pixel(1, 1)), (1, 1, pixel(2, 1))]);

  // Point 2 sits closer to the camera than point 1
  let hit = find_hit(&pixels, 3, DVec3::ZERO, |_, p| Some(DVec3::splat(10.0 - p as f64)));

  assert_eq!(hit.map(|h| h.point_index), Some(2));
}

/// A more central pixel does not replace the best hit when its point is
/// farther from the camera.
#[test]
fn test_find_hit_needs_both_closer() {
  let pixels = window_buffer(3, &[(0, 0, pixel(1, 1)), (1, 1, pixel(2, 1))]);

  // Point 1 (corner, scanned first) is nearer the camera than point 2
  let hit = find_hit(&pixels, 3, DVec3::ZERO, |_, p| Some(DVec3::splat(p as f64)));

  assert_eq!(hit.map(|h| h.point_index), Some(1));
}

/// Point indices use all 24 RGB bits.
#[test]
fn test_find_hit_wide_point_index() {
  let pixels = window_buffer(1, &[(0, 0, pixel(0x00ab_cdef, 3))]);
  let hit = find_hit(&pixels, 1, DVec3::ZERO, |_, _| Some(DVec3::ONE)).unwrap();
  assert_eq!(hit.point_index, 0x00ab_cdef);
  assert_eq!(hit.node_index, 2);
}

/// Points whose position cannot be resolved are skipped.
#[test]
fn test_find_hit_skips_unknown_points() {
  let pixels = window_buffer(1, &[(0, 0, pixel(4, 1))]);
  assert_eq!(find_hit(&pixels, 1, DVec3::ZERO, |_, _| None), None);
}

// =========================================================================
// nodes_on_ray
// =========================================================================

#[test]
fn test_nodes_on_ray_filters_by_sphere() {
  let mut renderer = MockRenderer::default();
  let octrees = vec![visible_root_octree(&mut renderer)];

  let hit_ray = Ray::new(DVec3::new(50.0, 50.0, 500.0), DVec3::NEG_Z);
  let miss_ray = Ray::new(DVec3::new(500.0, 500.0, 500.0), DVec3::NEG_Z);

  assert_eq!(nodes_on_ray(&octrees, &hit_ray).len(), 1);
  assert!(nodes_on_ray(&octrees, &miss_ray).is_empty());
}

/// Candidate batches beyond the alpha range are truncated.
#[test]
fn test_nodes_on_ray_truncates_to_alpha_range() {
  let mut renderer = MockRenderer::default();
  let octrees: Vec<PointCloudOctree> = (0..300).map(|_| visible_root_octree(&mut renderer)).collect();
  let ray = Ray::new(DVec3::new(50.0, 50.0, 500.0), DVec3::NEG_Z);

  let nodes = nodes_on_ray(&octrees, &ray);

  assert_eq!(nodes.len(), 254);
  assert_eq!(nodes[0].model_index, 0);
  assert_eq!(nodes[253].model_index, 253);

  // The last batch is drawn with alpha 254 and still decodes as a hit
  let pixels = window_buffer(1, &[(0, 0, pixel(3, nodes.len() as u8))]);
  let hit = find_hit(&pixels, 1, DVec3::ZERO, |_, _| Some(DVec3::ONE)).unwrap();
  assert_eq!(hit.node_index, MAX_PICK_BATCHES - 1);
}

#[test]
fn test_nodes_on_ray_skips_hidden_models() {
  let mut renderer = MockRenderer::default();
  let mut octrees = vec![visible_root_octree(&mut renderer)];
  octrees[0].visible = false;
  let ray = Ray::new(DVec3::new(50.0, 50.0, 500.0), DVec3::NEG_Z);
  assert!(nodes_on_ray(&octrees, &ray).is_empty());
}

// =========================================================================
// pick
// =========================================================================

#[test]
fn test_pick_returns_point_and_restores_state() {
  let mut renderer = MockRenderer::default();
  let octrees = vec![visible_root_octree(&mut renderer)];
  let camera = camera_facing_bounds(300.0);
  let ray = camera.ray_from_ndc(DVec2::ZERO);
  let params = PickParams {
    pick_window_size: 3,
    ..Default::default()
  };
  renderer.pick_pixels = Some(window_buffer(3, &[(1, 1, pixel(2, 1))]));
  let original = renderer.state.clone();

  let point = pick(&mut renderer, &camera, &ray, &octrees, &params).unwrap().unwrap();

  assert_eq!(point.point_index, 2);
  assert_eq!(point.model, octrees[0].id());
  let expected = point_position(
    &octrees,
    &RenderedNode {
      model_index: 0,
      model: octrees[0].id(),
      node: octrees[0].root(),
    },
    2,
  )
  .unwrap();
  assert_eq!(point.position, expected);

  // One batch, one-based index, scissored window around the screen center
  assert_eq!(renderer.pick_batches.len(), 1);
  assert_eq!(renderer.pick_batches[0].node_index, 1);
  assert_eq!(renderer.read_rects.len(), 1);
  let rect = renderer.read_rects[0];
  assert_eq!((rect.width, rect.height), (3, 3));
  assert!((398..=399).contains(&rect.x), "x = {}", rect.x);
  assert!((298..=299).contains(&rect.y), "y = {}", rect.y);
  assert_eq!(renderer.pick_target_size, Some((800, 600)));

  // Pick state applied, then the original restored
  let pick_state = &renderer.state_history[0];
  assert!(!pick_state.blending);
  assert_eq!(pick_state.render_target, RenderTarget::Pick);
  assert_eq!(renderer.state, original);
}

#[test]
fn test_pick_restores_state_on_failure() {
  let mut renderer = MockRenderer::default();
  let octrees = vec![visible_root_octree(&mut renderer)];
  let camera = camera_facing_bounds(300.0);
  let ray = camera.ray_from_ndc(DVec2::ZERO);
  renderer.fail_read = true;
  let original = renderer.state.clone();

  let result = pick(&mut renderer, &camera, &ray, &octrees, &PickParams::default());

  assert!(result.is_err());
  assert_eq!(renderer.state, original);
  assert_eq!(renderer.state_history.last(), Some(&original));
}

#[test]
fn test_pick_miss_renders_nothing() {
  let mut renderer = MockRenderer::default();
  let octrees = vec![visible_root_octree(&mut renderer)];
  let camera = camera_facing_bounds(300.0);
  let ray = Ray::new(DVec3::new(1000.0, 1000.0, 1000.0), DVec3::X);

  let result = pick(&mut renderer, &camera, &ray, &octrees, &PickParams::default()).unwrap();

  assert!(result.is_none());
  assert!(renderer.pick_batches.is_empty());
  assert!(renderer.state_history.is_empty());
}

/// An explicit pixel position overrides the ray projection.
#[test]
fn test_pick_uses_pixel_position() {
  let mut renderer = MockRenderer::default();
  let octrees = vec![visible_root_octree(&mut renderer)];
  let camera = camera_facing_bounds(300.0);
  let ray = camera.ray_from_ndc(DVec2::ZERO);
  let params = PickParams {
    pick_window_size: 5,
    pixel_position: Some(DVec2::new(10.0, 20.0)),
    ..Default::default()
  };

  let result = pick(&mut renderer, &camera, &ray, &octrees, &params).unwrap();

  assert!(result.is_none());
  assert_eq!(renderer.read_rects[0].x, 8);
  assert_eq!(renderer.read_rects[0].y, 18);
}
