use serde::{Deserialize, Serialize};

use crate::error::TextureError;

/// Linear RGBA colour used to clear the surface before the quad is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<[f64; 4]> for Color {
    fn from(value: [f64; 4]) -> Self {
        Self::rgba(value[0], value[1], value[2], value[3])
    }
}

/// Texel formats the texture cache can allocate.
///
/// Every variant is filterable so it can be bound to the engine's single
/// filtering sampler without a layout change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rg8Unorm => 2,
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb | PixelFormat::Bgra8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }
}

/// Shape of a texture the backend is asked to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl TextureDescriptor {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
        }
    }

    /// Byte length of a tightly packed upload for this descriptor; `None`
    /// when it does not fit in `usize`.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel() as usize)
    }

    /// [`TextureDescriptor::byte_len`], with overflow reported as an
    /// allocation failure.
    pub fn upload_len(&self) -> Result<usize, TextureError> {
        self.byte_len().ok_or_else(|| TextureError::Allocation {
            width: self.width,
            height: self.height,
            reason: format!("{:?} upload size overflows", self.format),
        })
    }
}

/// Which cached texture the render driver binds to the fragment stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextureBinding {
    /// Bind the earliest inserted key still present in the cache.
    #[default]
    FirstInserted,
    /// Bind this key when present, otherwise fall back to `FirstInserted`.
    Key(String),
}

/// Adapter selection hint for the wgpu backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Start-up options for [`crate::ShaderEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Start with the virtual clock frozen at zero.
    pub start_paused: bool,
    /// Clear colour behind the quad.
    pub background: Color,
    /// Texture selection policy for unit 0.
    pub texture_binding: TextureBinding,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            start_paused: false,
            background: Color::BLACK,
            texture_binding: TextureBinding::FirstInserted,
        }
    }
}
