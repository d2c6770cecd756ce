//! Renderer crate for shaderlab.
//!
//! The crate turns WebGL-style GLSL source pairs into wgpu pipelines and keeps
//! an animated preview alive while the sources are being edited. The overall
//! flow is:
//!
//! ```text
//!   editor / CLI
//!        │ ShaderSourcePair, Parameter[]
//!        ▼
//!   ShaderEngine ──▶ CompilationGuard ──▶ compile::prepare ──▶ RenderBackend::build_program
//!        │                  │
//!        │                  └─ last-known-good program
//!        ├─▶ bindings::bind ──▶ UniformState ──▶ UniformLayout::pack
//!        ├─▶ RenderLoop ◀── FrameScheduler tokens
//!        └─▶ SurfaceManager ──▶ RenderBackend::draw / capture
//! ```
//!
//! A rejected pair never replaces the active program: the engine reports the
//! diagnostic and keeps drawing the last pair that compiled. [`GpuBackend`] is
//! the wgpu implementation of [`RenderBackend`]; tests drive the same engine
//! with in-memory backends. [`run_preview`] hosts an engine in a winit window.

mod backend;
mod bindings;
mod compile;
mod engine;
mod error;
mod gpu;
mod guard;
mod runtime;
mod surface;
mod types;
mod uniforms;
mod window;

pub use backend::RenderBackend;
pub use bindings::{
    bind, is_reserved, project, SlotId, UniformMap, UniformValue, RESERVED_RESOLUTION,
    RESERVED_TIME,
};
pub use compile::{precheck, prepare, PreparedProgram};
pub use engine::{ShaderEngine, Submission};
pub use error::{CompileRejection, DrawFailure, EncodeFailure};
pub use gpu::{GpuBackend, GpuProgram};
pub use guard::{ActiveProgram, CompilationGuard, Committed};
pub use runtime::{FrameQueue, FrameScheduler, FrameToken, LoopState, RenderClock, RenderLoop};
pub use surface::{encode_png, png_data_url, DrawOutcome, SurfaceManager};
pub use types::{
    EngineConfig, GpuPowerPreference, Parameter, ParameterKind, ParameterValue, ProjectSnapshot,
    ShaderSourcePair, ShaderStageKind, VsyncMode, DEFAULT_VERTEX_SHADER,
    FALLBACK_FRAGMENT_SHADER, FALLBACK_VERTEX_SHADER, STARTER_FRAGMENT_SHADER,
};
pub use uniforms::{
    ReservedUniforms, UniformLayout, UniformLayoutBuilder, UniformMember, UniformState,
    UniformType,
};
pub use window::{run_preview, PreviewOptions};
