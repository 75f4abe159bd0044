//! `wgpu` implementation of [`GpuBackend`].
//!
//! - `context` brings up instance, adapter, device and the window surface.
//! - `pipeline` owns the fixed bind group layout, the quad, and pipeline
//!   construction for composed programs.
//! - `textures` maps pixel formats and uploads texels.
//!
//! Programs are validated with naga first so compile failures carry source
//! spans; the wgpu calls themselves run inside error scopes.

mod context;
mod pipeline;
mod textures;

use std::borrow::Cow;

use anyhow::Result;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::{FrameSubmission, GpuBackend};
use crate::compose::ComposedProgram;
use crate::error::{CompilationError, PresentError, TextureError};
use crate::types::{GpuPowerPreference, TextureDescriptor};
use crate::validate::validate_program;

use context::GpuContext;
use pipeline::PipelineLayouts;

pub use textures::WgpuTexture;

/// Start-up knobs for [`WgpuBackend::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuOptions {
    pub power: GpuPowerPreference,
    pub vsync: bool,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            power: GpuPowerPreference::High,
            vsync: true,
        }
    }
}

pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
}

/// Window surface the backend presents into.
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    size: (u32, u32),
}

impl WgpuSurface {
    /// Tracks the new window size; zero-sized surfaces are remembered but not
    /// configured, which makes the engine skip frames until restored.
    pub fn resize(&mut self, backend: &WgpuBackend, width: u32, height: u32) {
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&backend.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn reconfigure(&self, device: &wgpu::Device) {
        if self.size.0 > 0 && self.size.1 > 0 {
            self.surface.configure(device, &self.config);
        }
    }
}

struct UniformBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    layouts: PipelineLayouts,
    quad: wgpu::Buffer,
    sampler: wgpu::Sampler,
    uniforms: Mutex<UniformBuffer>,
    max_texture_dimension: u32,
    adapter_name: String,
}

impl WgpuBackend {
    /// Creates the device and a surface for `window`, sized `size` pixels.
    pub fn new<W>(window: W, size: (u32, u32), options: WgpuOptions) -> Result<(Self, WgpuSurface)>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let GpuContext {
            device,
            queue,
            surface,
            config,
            adapter_info,
            max_texture_dimension,
        } = GpuContext::new(window, size, &options)?;

        let layouts = PipelineLayouts::new(&device);
        let quad = pipeline::create_quad_buffer(&device);
        let sampler = pipeline::create_sampler(&device);
        let uniforms = Mutex::new(UniformBuffer {
            buffer: create_uniform_buffer(&device, UNIFORM_MIN_CAPACITY),
            capacity: UNIFORM_MIN_CAPACITY,
        });

        let surface_format = config.format;
        let target = WgpuSurface {
            surface,
            size: (config.width, config.height),
            config,
        };
        let backend = Self {
            device,
            queue,
            surface_format,
            layouts,
            quad,
            sampler,
            uniforms,
            max_texture_dimension,
            adapter_name: adapter_info.name,
        };
        Ok((backend, target))
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn write_uniforms(&self, bytes: &[u8]) -> wgpu::Buffer {
        let mut uniforms = self.uniforms.lock();
        let needed = (bytes.len() as u64).max(UNIFORM_MIN_CAPACITY);
        if needed > uniforms.capacity {
            let capacity = needed.next_power_of_two();
            tracing::debug!(capacity, "growing uniform buffer");
            uniforms.buffer = create_uniform_buffer(&self.device, capacity);
            uniforms.capacity = capacity;
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&uniforms.buffer, 0, bytes);
        }
        uniforms.buffer.clone()
    }
}

const UNIFORM_MIN_CAPACITY: u64 = 256;

fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniform buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl GpuBackend for WgpuBackend {
    type Pipeline = WgpuPipeline;
    type Texture = WgpuTexture;
    type Target = WgpuSurface;

    fn compile_program(&self, program: &ComposedProgram) -> Result<WgpuPipeline, CompilationError> {
        validate_program(program)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("composed program"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(program.source())),
            });
        let pipeline =
            pipeline::create_render_pipeline(&self.device, &self.layouts, &module, self.surface_format);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(CompilationError::new(error.to_string()));
        }
        Ok(WgpuPipeline { pipeline })
    }

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<WgpuTexture, TextureError> {
        textures::create_texture(&self.device, &self.queue, self.max_texture_dimension, desc, data)
    }

    fn drawable_size(&self, target: &WgpuSurface) -> (u32, u32) {
        target.size
    }

    fn submit_frame(
        &self,
        target: &mut WgpuSurface,
        frame: FrameSubmission<'_, Self>,
    ) -> Result<(), PresentError> {
        let surface_texture = match target.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost) => {
                target.reconfigure(&self.device);
                return Err(PresentError::Lost);
            }
            Err(wgpu::SurfaceError::Outdated) => {
                target.reconfigure(&self.device);
                return Err(PresentError::Outdated);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(PresentError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(PresentError::OutOfMemory),
            Err(other) => return Err(PresentError::Other(other.to_string())),
        };

        let uniform_buffer = self.write_uniforms(frame.uniforms);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &self.layouts.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(frame.texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        {
            let clear = frame.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.r,
                            g: clear.g,
                            b: clear.b,
                            a: clear.a,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&frame.pipeline.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad.slice(..));
            render_pass.draw(0..pipeline::QUAD_VERTEX_COUNT, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}
