//! Renderer abstraction and GPU picking.

pub mod picker;
pub mod renderer;

pub use picker::{
  find_hit, get_pick_point, nodes_on_ray, pick, point_position, ray_pixel_position, PickHit, PickParams, PickPoint,
  RenderedNode,
};
pub use renderer::{GpuBuffer, PickBatch, PixelRect, PointRenderer, RenderState, RenderTarget, Viewport};
