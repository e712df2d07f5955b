//! wgpu backend for the sensor view.
//!
//! [`WgpuContext`] is the graphics context resources upload into. Bus
//! callbacks record [`DrawCommand`]s into a shared [`DrawList`], and the
//! [`Painter`] turns them into one render pass when the driver swaps.
//!
//! # Invariants
//! - All objects are created, used and released on the thread owning the
//!   device; the context is `!Sync`.
//! - A draw command naming a released object is skipped, never a panic.
//! - Camera motion only changes uniforms; it never touches resources.

mod camera;
mod context;
mod draw;
mod painter;
mod shaders;

pub use camera::OrbitCamera;
pub use context::WgpuContext;
pub use draw::{DrawCommand, DrawList};
pub use painter::Painter;

pub fn crate_info() -> &'static str {
    "sensorview-render-wgpu v0.1.0"
}
