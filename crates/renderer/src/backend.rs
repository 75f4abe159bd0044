//! Seam between the engine and whatever actually talks to the GPU.

use crate::compose::ComposedProgram;
use crate::error::{CompilationError, PresentError, TextureError};
use crate::types::{Color, TextureDescriptor};

/// GPU device, queue and presentation collaborator.
///
/// Implementations are shared across threads: texture loads call
/// [`GpuBackend::create_texture`] from worker threads while the render
/// thread submits frames.
pub trait GpuBackend: Send + Sync + 'static {
    /// Linked pipeline built from one composed program.
    type Pipeline: Send + Sync + 'static;
    /// Cheap handle to an uploaded texture.
    type Texture: Clone + Send + Sync + 'static;
    /// Presentable surface the frame is drawn into.
    type Target;

    fn compile_program(&self, program: &ComposedProgram)
        -> Result<Self::Pipeline, CompilationError>;

    /// Allocates a 2D texture, uploading `data` when given. `data` must be
    /// tightly packed rows of `desc.format`.
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Self::Texture, TextureError>;

    /// Current pixel size of `target`; `(0, 0)` while minimised.
    fn drawable_size(&self, target: &Self::Target) -> (u32, u32);

    /// Clears, draws the full-screen quad once with the given bindings, and
    /// presents.
    fn submit_frame(
        &self,
        target: &mut Self::Target,
        frame: FrameSubmission<'_, Self>,
    ) -> Result<(), PresentError>;
}

/// Everything one draw call binds.
pub struct FrameSubmission<'a, B: GpuBackend + ?Sized> {
    pub pipeline: &'a B::Pipeline,
    pub uniforms: &'a [u8],
    pub texture: &'a B::Texture,
    pub clear_color: Color,
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::validate::validate_program;

    const MAX_DIMENSION: u32 = 8192;

    #[derive(Debug)]
    pub(crate) struct MockPipeline {
        pub id: u64,
        pub source: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct MockTexture {
        pub id: u64,
        pub desc: TextureDescriptor,
        pub data: Option<Arc<Vec<u8>>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct RecordedFrame {
        pub pipeline: u64,
        pub uniforms: Vec<u8>,
        pub texture: MockTexture,
        pub clear_color: Color,
    }

    pub(crate) struct MockTarget {
        pub size: (u32, u32),
        pub fail_next_present: Option<PresentError>,
    }

    impl MockTarget {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                fail_next_present: None,
            }
        }
    }

    /// Records every call; compiling runs the real WGSL validation.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        next_id: AtomicU64,
        compiles: AtomicU64,
        frames: Mutex<Vec<RecordedFrame>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn frames(&self) -> Vec<RecordedFrame> {
            self.frames.lock().clone()
        }

        pub fn compile_count(&self) -> u64 {
            self.compiles.load(Ordering::SeqCst)
        }

        fn allocate_id(&self) -> u64 {
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    impl GpuBackend for MockBackend {
        type Pipeline = MockPipeline;
        type Texture = MockTexture;
        type Target = MockTarget;

        fn compile_program(
            &self,
            program: &ComposedProgram,
        ) -> Result<Self::Pipeline, CompilationError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            validate_program(program)?;
            Ok(MockPipeline {
                id: self.allocate_id(),
                source: program.source().to_string(),
            })
        }

        fn create_texture(
            &self,
            desc: &TextureDescriptor,
            data: Option<&[u8]>,
        ) -> Result<Self::Texture, TextureError> {
            if desc.width == 0
                || desc.height == 0
                || desc.width > MAX_DIMENSION
                || desc.height > MAX_DIMENSION
            {
                return Err(TextureError::Allocation {
                    width: desc.width,
                    height: desc.height,
                    reason: format!("dimensions must be within 1..={MAX_DIMENSION}"),
                });
            }
            Ok(MockTexture {
                id: self.allocate_id(),
                desc: desc.clone(),
                data: data.map(|bytes| Arc::new(bytes.to_vec())),
            })
        }

        fn drawable_size(&self, target: &Self::Target) -> (u32, u32) {
            target.size
        }

        fn submit_frame(
            &self,
            target: &mut Self::Target,
            frame: FrameSubmission<'_, Self>,
        ) -> Result<(), PresentError> {
            if let Some(err) = target.fail_next_present.take() {
                return Err(err);
            }
            self.frames.lock().push(RecordedFrame {
                pipeline: frame.pipeline.id,
                uniforms: frame.uniforms.to_vec(),
                texture: frame.texture.clone(),
                clear_color: frame.clear_color,
            });
            Ok(())
        }
    }
}
