//! wgpu backend.
//!
//! - `context` owns the instance, device and optional presentation surface,
//!   and reconfigures the surface when the drawing buffer resizes.
//! - `pipeline` holds the full-surface quad and builds one pipeline, uniform
//!   buffer and bind group per program inside a validation error scope.
//! - `readback` renders into offscreen textures and copies them back to host
//!   memory for screenshots.
//! - `state` glues everything together behind [`crate::RenderBackend`].

mod context;
mod pipeline;
mod readback;
mod state;

pub use pipeline::GpuProgram;
pub use state::GpuBackend;
