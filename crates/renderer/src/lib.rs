//! Live fragment-shader renderer.
//!
//! Callers hand the engine WGSL text (anything from a one-line snippet to a
//! complete program), and it draws that program over a full-screen quad
//! once per frame, feeding it a fixed set of uniforms plus one texture:
//!
//! ```text
//!   set_fragment_source ──▶ compose ──▶ GpuBackend::compile_program ──▶ PipelineManager
//!                                                                            │
//!   render(target) ──▶ clock ─▶ FrameUniforms ─▶ UniformStore bytes ─┐       │
//!                                         TextureCache / fallback ───┼───────┴─▶ submit_frame
//! ```
//!
//! The GPU is reached only through [`GpuBackend`]; [`WgpuBackend`] is the
//! shipped implementation. Uniform names visible to snippets are
//! `u_resolution`, `u_time`, `u_mouse` and `u_date`, along with `uv`,
//! `frag_coord`, `u_texture` and `u_sampler`.

mod backend;
mod clock;
mod compose;
mod engine;
mod error;
mod frame;
mod gpu;
mod pipeline;
mod textures;
mod types;
mod uniforms;
mod validate;

pub use backend::{FrameSubmission, GpuBackend};
pub use clock::VirtualClock;
pub use compose::{
    check_uniform_name, classify, compose_program, strip_vertex_output, uniform_struct,
    ComposedProgram, SourceShape,
    DEFAULT_VERTEX_SOURCE, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT, VERTEX_OUTPUT_DECL,
};
pub use engine::{FrameOutcome, ShaderEngine, SkipReason};
pub use error::{CompilationError, PresentError, TextureError, UniformError};
pub use frame::{date_components, FrameUniforms};
pub use gpu::{WgpuBackend, WgpuOptions, WgpuPipeline, WgpuSurface, WgpuTexture};
pub use pipeline::{CompiledProgram, ErrorCallback, PipelineManager, PipelineState};
pub use textures::{TextureCache, TextureLoad};
pub use types::{
    Color, EngineOptions, GpuPowerPreference, PixelFormat, TextureBinding, TextureDescriptor,
};
pub use uniforms::{
    Uniform, UniformDecl, UniformSlot, UniformStore, UniformType, UniformValue, FIELD_ALIGNMENT,
    U_DATE, U_MOUSE, U_RESOLUTION, U_TIME,
};
pub use validate::validate_program;
