use crate::error::TextureError;
use crate::types::{PixelFormat, TextureDescriptor};

/// Uploaded texture plus the view bound to the fragment stage.
#[derive(Debug, Clone)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub(crate) fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

pub(crate) fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    max_dimension: u32,
    desc: &TextureDescriptor,
    data: Option<&[u8]>,
) -> Result<WgpuTexture, TextureError> {
    if desc.width == 0 || desc.height == 0 {
        return Err(TextureError::Allocation {
            width: desc.width,
            height: desc.height,
            reason: "texture dimensions must be non-zero".into(),
        });
    }
    if desc.width > max_dimension || desc.height > max_dimension {
        return Err(TextureError::Allocation {
            width: desc.width,
            height: desc.height,
            reason: format!("GPU max texture dimension is {max_dimension}"),
        });
    }
    let expected = desc.upload_len()?;
    if let Some(data) = data {
        if data.len() != expected {
            return Err(TextureError::InvalidData {
                expected,
                actual: data.len(),
            });
        }
    }

    let size = wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: 1,
    };

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&desc.label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(desc.format),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(TextureError::Allocation {
            width: desc.width,
            height: desc.height,
            reason: error.to_string(),
        });
    }

    if let Some(data) = data {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            size,
        );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(WgpuTexture { texture, view })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_formats_match_their_wgpu_block_size() {
        for format in [
            PixelFormat::R8Unorm,
            PixelFormat::Rg8Unorm,
            PixelFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm,
            PixelFormat::Rgba16Float,
        ] {
            let wgpu_format = texture_format(format);
            assert_eq!(
                wgpu_format.block_copy_size(None),
                Some(format.bytes_per_pixel()),
                "{format:?}"
            );
            assert!(wgpu_format
                .sample_type(None, None)
                .is_some_and(|ty| matches!(ty, wgpu::TextureSampleType::Float { filterable: true })));
        }
    }
}
