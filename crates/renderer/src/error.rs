use std::path::PathBuf;

use thiserror::Error;

/// Compiler rejected a composed program.
///
/// `diagnostic` is the toolchain output verbatim (naga renders it with
/// source spans), so it can be shown to whoever wrote the shader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shader compilation failed: {diagnostic}")]
pub struct CompilationError {
    pub diagnostic: String,
}

impl CompilationError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// A custom uniform refused before it reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformError {
    #[error("`{0}` is not a valid WGSL identifier")]
    InvalidName(String),
    #[error("`{0}` is reserved; the generated entry point or the engine already uses it")]
    Reserved(String),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to read texture at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode texture: {0}")]
    Decode(#[from] image::ImageError),

    #[error("cannot allocate {width}x{height} texture: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("pixel data is {actual} bytes, expected {expected}")]
    InvalidData { expected: usize, actual: usize },

    #[error("texture load worker exited before reporting a result")]
    WorkerLost,
}

/// Presentation failures reported by a backend for a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentError {
    #[error("surface lost; reconfigured for the next frame")]
    Lost,
    #[error("surface outdated; reconfigured for the next frame")]
    Outdated,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("out of memory while acquiring the surface texture")]
    OutOfMemory,
    #[error("surface error: {0}")]
    Other(String),
}
