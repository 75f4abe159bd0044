//! The render driver and the thread-safe surface callers talk to.
//!
//! Every method takes `&self`; share the engine through an `Arc` between the
//! thread that owns the surface and whatever thread edits sources, loads
//! textures, or drives input. Each piece of mutable state sits behind its own
//! lock, and [`ShaderEngine::render`] never holds one across a compile or a
//! texture decode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{FrameSubmission, GpuBackend};
use crate::clock::VirtualClock;
use crate::compose::{check_uniform_name, compose_program, ComposedProgram};
use crate::error::{CompilationError, PresentError, TextureError, UniformError};
use crate::frame::FrameUniforms;
use crate::pipeline::{PipelineManager, PipelineState};
use crate::textures::TextureCache;
use crate::types::{Color, EngineOptions, PixelFormat, TextureBinding, TextureDescriptor};
use crate::uniforms::{UniformStore, UniformType, UniformValue, U_DATE, U_MOUSE, U_RESOLUTION, U_TIME};

const FALLBACK_TEXTURE_LABEL: &str = "fallback white";
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// What one call to [`ShaderEngine::render`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// One draw call was submitted and presented.
    Drawn {
        generation: u64,
        /// Cache key of the bound texture; `None` when the fallback was bound.
        texture: Option<String>,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoPipeline,
    EmptySurface,
    Present(PresentError),
}

#[derive(Default)]
struct SourceState {
    fragment: Option<String>,
    vertex: Option<String>,
}

struct InputState {
    pointer: [f32; 2],
    background: Color,
    binding: TextureBinding,
}

struct FrameStats {
    frames_since_report: u32,
    last_report: Instant,
    frame_count: u64,
}

impl FrameStats {
    fn new(now: Instant) -> Self {
        Self {
            frames_since_report: 0,
            last_report: now,
            frame_count: 0,
        }
    }

    /// Counts a drawn frame; returns the frame rate once per interval.
    fn record(&mut self, now: Instant) -> Option<f32> {
        self.frame_count += 1;
        self.frames_since_report += 1;
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < STATS_INTERVAL {
            return None;
        }
        let fps = self.frames_since_report as f32 / elapsed.as_secs_f32();
        self.frames_since_report = 0;
        self.last_report = now;
        Some(fps)
    }
}

struct FrameState {
    uniform_bytes: Vec<u8>,
    stats: FrameStats,
}

pub struct ShaderEngine<B: GpuBackend> {
    backend: Arc<B>,
    pipelines: PipelineManager<B>,
    textures: TextureCache<B>,
    fallback: B::Texture,
    clock: Mutex<VirtualClock>,
    uniforms: Mutex<UniformStore>,
    sources: Mutex<SourceState>,
    input: Mutex<InputState>,
    frame: Mutex<FrameState>,
}

impl<B: GpuBackend> ShaderEngine<B> {
    /// Fails only if the backend cannot allocate the 1x1 fallback texture.
    pub fn new(backend: Arc<B>, options: EngineOptions) -> Result<Self, TextureError> {
        let fallback = backend.create_texture(
            &TextureDescriptor::new(FALLBACK_TEXTURE_LABEL, 1, 1, PixelFormat::Rgba8Unorm),
            Some(&[255, 255, 255, 255]),
        )?;

        let now = Instant::now();
        let mut clock = VirtualClock::starting_at(now);
        if options.start_paused {
            clock.pause_at(now);
        }

        Ok(Self {
            pipelines: PipelineManager::new(Arc::clone(&backend)),
            textures: TextureCache::new(Arc::clone(&backend)),
            backend,
            fallback,
            clock: Mutex::new(clock),
            uniforms: Mutex::new(UniformStore::with_builtins()),
            sources: Mutex::new(SourceState::default()),
            input: Mutex::new(InputState {
                pointer: [0.0, 0.0],
                background: options.background,
                binding: options.texture_binding,
            }),
            frame: Mutex::new(FrameState {
                uniform_bytes: Vec::new(),
                stats: FrameStats::new(now),
            }),
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Replaces the fragment source and recompiles synchronously.
    ///
    /// On failure the previously bound pipeline keeps rendering.
    pub fn set_fragment_source(&self, source: impl Into<String>) -> Result<(), CompilationError> {
        let mut sources = self.sources.lock();
        sources.fragment = Some(source.into());
        self.compile_locked(&sources)
    }

    /// Replaces (or with `None`, clears) the custom vertex stage. Recompiles
    /// only when a fragment source has been set.
    pub fn set_vertex_source(&self, source: Option<String>) -> Result<(), CompilationError> {
        let mut sources = self.sources.lock();
        sources.vertex = source;
        self.compile_locked(&sources)
    }

    /// Program the current sources compose to, if a fragment source is set.
    pub fn composed_program(&self) -> Option<ComposedProgram> {
        let sources = self.sources.lock();
        self.compose(&sources)
    }

    /// Registers the callback run once per failed compile. It runs while
    /// the source lock is held, so it must not call `set_fragment_source`,
    /// `set_vertex_source`, `set_uniform` or `composed_program`.
    pub fn on_compilation_error<F>(&self, callback: F)
    where
        F: Fn(&CompilationError) + Send + Sync + 'static,
    {
        self.pipelines.on_compilation_error(callback);
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipelines.state()
    }

    pub fn last_error(&self) -> Option<CompilationError> {
        self.pipelines.last_error()
    }

    /// Sets a custom uniform. A new name or a changed type alters the
    /// `Uniforms` layout, so the current source is recompiled.
    ///
    /// Names must be WGSL identifiers that neither the generated entry point
    /// nor the per-frame built-ins use; refused names leave the store as it
    /// was.
    pub fn set_uniform(
        &self,
        name: impl Into<String>,
        value: UniformValue,
        ty: UniformType,
    ) -> Result<(), UniformError> {
        let name = name.into();
        if [U_DATE, U_MOUSE, U_RESOLUTION, U_TIME].contains(&name.as_str()) {
            return Err(UniformError::Reserved(name));
        }
        check_uniform_name(&name)?;
        let layout_changed = {
            let mut uniforms = self.uniforms.lock();
            let previous = uniforms.get(&name).map(|uniform| uniform.ty);
            uniforms.set(name, value, ty);
            previous != Some(ty)
        };
        if !layout_changed {
            return Ok(());
        }
        let sources = self.sources.lock();
        Ok(self.compile_locked(&sources)?)
    }

    /// Changes the value of an existing uniform; false if `name` is unknown.
    pub fn update_uniform(&self, name: &str, value: UniformValue) -> bool {
        self.uniforms.lock().update(name, value)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.lock().get(name).map(|uniform| uniform.value)
    }

    pub fn play(&self) {
        self.clock.lock().play();
    }

    pub fn pause(&self) {
        self.clock.lock().pause();
    }

    pub fn toggle(&self) {
        self.clock.lock().toggle();
    }

    pub fn reset(&self) {
        self.clock.lock().reset();
    }

    pub fn is_paused(&self) -> bool {
        self.clock.lock().is_paused()
    }

    /// Shader time as of the last rendered frame.
    pub fn current_time(&self) -> Duration {
        self.clock.lock().current()
    }

    pub fn textures(&self) -> &TextureCache<B> {
        &self.textures
    }

    pub fn set_texture(&self, texture: B::Texture, key: impl Into<String>) {
        self.textures.set_texture(texture, key);
    }

    pub fn set_bound_texture(&self, binding: TextureBinding) {
        self.input.lock().binding = binding;
    }

    /// Pointer position in surface pixels, same origin as `u_resolution`.
    pub fn set_pointer_position(&self, position: [f32; 2]) {
        self.input.lock().pointer = position;
    }

    pub fn set_background_color(&self, color: Color) {
        self.input.lock().background = color;
    }

    pub fn render(&self, target: &mut B::Target) -> FrameOutcome {
        self.render_at(target, Instant::now())
    }

    /// Renders one frame with the clock advanced to `now`.
    pub fn render_at(&self, target: &mut B::Target, now: Instant) -> FrameOutcome {
        let time = {
            let mut clock = self.clock.lock();
            clock.update_at(now);
            clock.current()
        };

        let size = self.backend.drawable_size(target);
        if size.0 == 0 || size.1 == 0 {
            debug!(width = size.0, height = size.1, "skipping frame for empty surface");
            return FrameOutcome::Skipped(SkipReason::EmptySurface);
        }

        let (pointer, background, binding) = {
            let input = self.input.lock();
            (input.pointer, input.background, input.binding.clone())
        };

        let mut frame = self.frame.lock();
        {
            let mut uniforms = self.uniforms.lock();
            FrameUniforms::capture(size, time, pointer, &Local::now()).apply(&mut uniforms);
            uniforms.serialize_into(&mut frame.uniform_bytes);
            uniforms.clear_dirty();
        }

        let Some(program) = self.pipelines.current() else {
            return FrameOutcome::Skipped(SkipReason::NoPipeline);
        };

        let (bound_key, texture) = match self.select_texture(&binding) {
            Some((key, texture)) => (Some(key), texture),
            None => (None, self.fallback.clone()),
        };

        let submitted = self.backend.submit_frame(
            target,
            FrameSubmission {
                pipeline: program.pipeline(),
                uniforms: &frame.uniform_bytes,
                texture: &texture,
                clear_color: background,
            },
        );
        if let Err(err) = submitted {
            warn!(error = %err, "frame not presented");
            return FrameOutcome::Skipped(SkipReason::Present(err));
        }

        if let Some(fps) = frame.stats.record(now) {
            debug!(
                fps = fps.round(),
                frame_count = frame.stats.frame_count,
                time = time.as_secs_f32(),
                generation = program.generation(),
                "render stats"
            );
        }

        FrameOutcome::Drawn {
            generation: program.generation(),
            texture: bound_key,
        }
    }

    fn select_texture(&self, binding: &TextureBinding) -> Option<(String, B::Texture)> {
        if let TextureBinding::Key(key) = binding {
            if let Some(texture) = self.textures.get(key) {
                return Some((key.clone(), texture));
            }
        }
        self.textures.first()
    }

    fn compose(&self, sources: &SourceState) -> Option<ComposedProgram> {
        let fragment = sources.fragment.as_deref()?;
        let declarations = self.uniforms.lock().declarations();
        Some(compose_program(
            fragment,
            sources.vertex.as_deref(),
            &declarations,
        ))
    }

    /// Holding the source lock across the compile keeps concurrent
    /// submissions from binding out of order.
    fn compile_locked(&self, sources: &SourceState) -> Result<(), CompilationError> {
        match self.compose(sources) {
            Some(program) => self.pipelines.compile(&program).map(|_| ()),
            None => Ok(()),
        }
    }
}
