//! Renderer abstraction consumed by the engine.
//!
//! The engine never talks to a graphics API directly. It uploads decoded
//! attributes, releases buffers on eviction, and drives the pick pass through
//! this trait. Shaders, materials and color lookup tables live behind it.

use glam::DMat4;

use crate::error::RenderError;
use crate::geometry::Camera;
use crate::loading::PointAttributes;

/// Handle to a GPU-resident point buffer, issued by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuBuffer(pub u64);

/// Drawable size in CSS pixels plus the device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
  pub width: u32,
  pub height: u32,
  pub pixel_ratio: f64,
}

impl Viewport {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      pixel_ratio: 1.0,
    }
  }

  /// Size in device pixels.
  pub fn device_size(&self) -> (u32, u32) {
    (
      (self.width as f64 * self.pixel_ratio).round() as u32,
      (self.height as f64 * self.pixel_ratio).round() as u32,
    )
  }
}

/// Pixel rectangle, origin at the bottom-left (GL convention).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl PixelRect {
  #[inline]
  pub fn area(&self) -> usize {
    self.width as usize * self.height as usize
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RenderTarget {
  #[default]
  Screen,
  /// Off-screen RGBA8 target used by picking.
  Pick,
}

/// Renderer state the pick pass changes and must restore.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
  pub blending: bool,
  /// `Some` enables the scissor test with this rectangle.
  pub scissor: Option<PixelRect>,
  pub render_target: RenderTarget,
  /// Clip boxes of the point material are honored.
  pub clipping: bool,
  pub depth_test: bool,
  pub depth_write: bool,
}

impl Default for RenderState {
  fn default() -> Self {
    Self {
      blending: true,
      scissor: None,
      render_target: RenderTarget::Screen,
      clipping: true,
      depth_test: true,
      depth_write: true,
    }
  }
}

/// One node drawn with the index-encoding pick material.
///
/// The renderer writes the point index into RGB (little-endian, 24 bits) and
/// `node_index` into alpha. Alpha 0 is background.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickBatch {
  pub buffer: GpuBuffer,
  pub world_matrix: DMat4,
  /// One-based; never 0.
  pub node_index: u8,
  pub num_points: usize,
}

/// Graphics backend used for residency and picking.
pub trait PointRenderer {
  /// Current drawable size.
  fn viewport(&self) -> Viewport;

  /// Upload decoded attributes and return a buffer handle.
  fn upload_points(&mut self, points: &PointAttributes) -> Result<GpuBuffer, RenderError>;

  /// Release a buffer returned by [`PointRenderer::upload_points`].
  fn release_points(&mut self, buffer: GpuBuffer);

  fn render_state(&self) -> RenderState;

  fn set_render_state(&mut self, state: &RenderState);

  /// Size the pick target to `width` x `height` device pixels and clear it to
  /// transparent black.
  fn prepare_pick_target(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

  /// Draw one batch into the pick target.
  fn render_pick_batch(&mut self, batch: &PickBatch, camera: &Camera) -> Result<(), RenderError>;

  /// Read RGBA8 pixels of `rect` from the current target into `out`
  /// (`rect.area() * 4` bytes, rows bottom to top).
  fn read_pixels(&mut self, rect: PixelRect, out: &mut [u8]) -> Result<(), RenderError>;
}
