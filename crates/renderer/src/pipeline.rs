use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::GpuBackend;
use crate::compose::{ComposedProgram, SourceShape};
use crate::error::CompilationError;

pub type ErrorCallback = Arc<dyn Fn(&CompilationError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uncompiled,
    Compiling,
    Ready,
    Failed,
}

/// A pipeline that compiled successfully. Never mutated; a new source
/// produces a new value.
pub struct CompiledProgram<P> {
    pipeline: P,
    shape: SourceShape,
    generation: u64,
}

impl<P> CompiledProgram<P> {
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn shape(&self) -> SourceShape {
        self.shape
    }

    /// Starts at 1 and increases with every successful compile.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Status {
    state: PipelineState,
    last_error: Option<CompilationError>,
}

/// Owns the bound pipeline and swaps it atomically on successful compiles.
///
/// Readers clone the current `Arc` and render with it for the whole frame,
/// so a concurrent swap is never observed halfway.
pub struct PipelineManager<B: GpuBackend> {
    backend: Arc<B>,
    current: RwLock<Option<Arc<CompiledProgram<B::Pipeline>>>>,
    status: Mutex<Status>,
    on_error: RwLock<Option<ErrorCallback>>,
    generation: AtomicU64,
}

impl<B: GpuBackend> PipelineManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            current: RwLock::new(None),
            status: Mutex::new(Status {
                state: PipelineState::Uncompiled,
                last_error: None,
            }),
            on_error: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Replaces the failure callback. It runs on whichever thread submitted
    /// the failing source, after every manager lock is released.
    pub fn on_compilation_error<F>(&self, callback: F)
    where
        F: Fn(&CompilationError) + Send + Sync + 'static,
    {
        *self.on_error.write() = Some(Arc::new(callback));
    }

    pub fn state(&self) -> PipelineState {
        self.status.lock().state
    }

    pub fn last_error(&self) -> Option<CompilationError> {
        self.status.lock().last_error.clone()
    }

    pub fn current(&self) -> Option<Arc<CompiledProgram<B::Pipeline>>> {
        self.current.read().clone()
    }

    /// Compiles `program` and, on success, makes it the bound pipeline.
    ///
    /// On failure the previous pipeline stays bound, the state becomes
    /// `Failed`, and the error callback runs once before the error is
    /// returned.
    pub fn compile(&self, program: &ComposedProgram) -> Result<u64, CompilationError> {
        self.status.lock().state = PipelineState::Compiling;
        let started = Instant::now();

        match self.backend.compile_program(program) {
            Ok(pipeline) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let compiled = Arc::new(CompiledProgram {
                    pipeline,
                    shape: program.shape(),
                    generation,
                });
                *self.current.write() = Some(compiled);
                {
                    let mut status = self.status.lock();
                    status.state = PipelineState::Ready;
                    status.last_error = None;
                }
                info!(
                    generation,
                    shape = %program.shape(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "shader pipeline ready"
                );
                Ok(generation)
            }
            Err(err) => {
                {
                    let mut status = self.status.lock();
                    status.state = PipelineState::Failed;
                    status.last_error = Some(err.clone());
                }
                let keeping = self.current.read().as_ref().map(|compiled| compiled.generation);
                warn!(
                    shape = %program.shape(),
                    keeping = ?keeping,
                    "shader compilation failed:\n{}",
                    err.diagnostic
                );
                let callback = self.on_error.read().clone();
                if let Some(callback) = callback {
                    callback(&err);
                }
                Err(err)
            }
        }
    }
}
