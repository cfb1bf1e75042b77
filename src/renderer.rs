//! wgpu implementation of `RenderDevice`.
//!
//! One render pass per draw call, all recorded into the frame's encoder and
//! submitted by `end_frame`. The first pass of a frame clears to black.

use glam::Mat4;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, CommandEncoder, Device, DeviceDescriptor, Instance,
    Queue, RenderPipeline, Sampler, Surface, SurfaceConfiguration, SurfaceTexture, TextureUsages,
    TextureView,
};

use crate::error::GpuError;
use crate::gpu::{DistortionUniforms, QuadVertex, RenderDevice, Viewport};
use crate::settings::Eye;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniforms {
    mvp: [[f32; 4]; 4],
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    bind_group: BindGroup,
}

impl WgpuTexture {
    pub fn size(&self) -> (u32, u32) {
        let size = self.texture.size();
        (size.width, size.height)
    }
}

pub struct WgpuProgram {
    pipeline: RenderPipeline,
    camera_buffer: Buffer,
    camera_bind_group: BindGroup,
}

pub struct WgpuVertexBuffer {
    buffer: Buffer,
}

pub struct WgpuDistortionPipeline {
    pipeline: RenderPipeline,
    eye_buffers: [Buffer; 2],
    eye_bind_groups: [BindGroup; 2],
}

struct FrameInFlight {
    output: SurfaceTexture,
    view: TextureView,
    encoder: CommandEncoder,
    cleared: bool,
}

pub struct WgpuDevice {
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    sampler: Sampler,
    texture_layout: BindGroupLayout,
    uniform_layout: BindGroupLayout,
    frame: Option<FrameInFlight>,
}

impl WgpuDevice {
    /// Instance restricted to the backends the player ships on.
    pub fn create_instance() -> Instance {
        Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        })
    }

    /// Picks an adapter for `surface`, opens a device and configures the
    /// surface at `width` x `height`.
    pub async fn new(
        instance: &Instance,
        surface: Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        info!("WgpuDevice: adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor::default(), None)
            .await
            .map_err(|e| GpuError::Device(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = *caps
            .formats
            .first()
            .ok_or_else(|| GpuError::Surface("surface reports no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        info!("WgpuDevice: surface configured {}x{} {:?}", config.width, config.height, format);
        Ok(Self {
            surface,
            device,
            queue,
            config,
            sampler,
            texture_layout,
            uniform_layout,
            frame: None,
        })
    }

    fn build_pipeline(
        &self,
        label: &str,
        source: &'static str,
        vertex_buffers: &[wgpu::VertexBufferLayout<'_>],
    ) -> Result<RenderPipeline, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&self.texture_layout, &self.uniform_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(GpuError::Shader(format!("{}: {}", label, e))),
            None => Ok(pipeline),
        }
    }

    fn uniform_bind_group(&self, label: &str, buffer: &Buffer) -> BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Starts a pass on the current frame, clearing only on the first one.
    fn begin_pass<'f>(frame: &'f mut FrameInFlight, label: &str) -> wgpu::RenderPass<'f> {
        let load = if frame.cleared {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        };
        frame.cleared = true;
        frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}

fn usable(viewport: &Viewport) -> bool {
    viewport.width >= 1.0 && viewport.height >= 1.0
}

impl RenderDevice for WgpuDevice {
    type Texture = WgpuTexture;
    type Program = WgpuProgram;
    type VertexBuffer = WgpuVertexBuffer;
    type DistortionPipeline = WgpuDistortionPipeline;

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            debug!("WgpuDevice: surface resized to {}x{}", width, height);
        }
    }

    fn create_program(&mut self) -> Result<WgpuProgram, GpuError> {
        let layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2],
        };
        let pipeline = self.build_pipeline("Quad Pipeline", include_str!("shaders/quad.wgsl"), &[layout])?;

        let camera_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::bytes_of(&CameraUniforms {
                mvp: Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = self.uniform_bind_group("Camera Bind Group", &camera_buffer);
        Ok(WgpuProgram {
            pipeline,
            camera_buffer,
            camera_bind_group,
        })
    }

    fn create_vertex_buffer(&mut self, vertices: &[QuadVertex]) -> Result<WgpuVertexBuffer, GpuError> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(WgpuVertexBuffer { buffer })
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<WgpuTexture, GpuError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(GpuError::Device(format!(
                "texture size {}x{} outside 1..={}",
                width, height, limit
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Video Bind Group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });
        Ok(WgpuTexture { texture, bind_group })
    }

    fn write_texture(&mut self, texture: &WgpuTexture, rgba: &[u8], width: u32, height: u32) {
        let needed = (width as usize) * (height as usize) * 4;
        if rgba.len() < needed || texture.size() != (width, height) {
            warn!(
                "WgpuDevice: skipping upload of {} bytes into {:?} texture as {}x{}",
                rgba.len(),
                texture.size(),
                width,
                height
            );
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba[..needed],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }

    fn create_distortion_pipeline(&mut self) -> Result<WgpuDistortionPipeline, GpuError> {
        let pipeline = self.build_pipeline(
            "Distortion Pipeline",
            include_str!("shaders/distortion.wgsl"),
            &[],
        )?;
        let eye_buffers = Eye::BOTH.map(|eye| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(match eye {
                    Eye::Left => "Left Distortion Buffer",
                    Eye::Right => "Right Distortion Buffer",
                }),
                size: std::mem::size_of::<DistortionUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let eye_bind_groups = [
            self.uniform_bind_group("Left Distortion Bind Group", &eye_buffers[0]),
            self.uniform_bind_group("Right Distortion Bind Group", &eye_buffers[1]),
        ];
        Ok(WgpuDistortionPipeline {
            pipeline,
            eye_buffers,
            eye_bind_groups,
        })
    }

    fn begin_frame(&mut self) -> bool {
        if self.frame.is_some() {
            warn!("WgpuDevice: begin_frame with a frame already open, dropping it");
            self.frame = None;
        }
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                debug!("WgpuDevice: no surface texture ({}), reconfiguring", e);
                self.surface.configure(&self.device, &self.config);
                return false;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.frame = Some(FrameInFlight {
            output,
            view,
            encoder,
            cleared: false,
        });
        true
    }

    fn draw_quads(
        &mut self,
        program: &WgpuProgram,
        vertices: &WgpuVertexBuffer,
        vertex_count: u32,
        texture: &WgpuTexture,
        mvp: &Mat4,
        viewport: Viewport,
    ) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if !usable(&viewport) {
            return;
        }
        self.queue.write_buffer(
            &program.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniforms { mvp: mvp.to_cols_array_2d() }),
        );

        let mut pass = Self::begin_pass(frame, "Quad Pass");
        pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &texture.bind_group, &[]);
        pass.set_bind_group(1, &program.camera_bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.buffer.slice(..));
        pass.draw(0..vertex_count, 0..1);
    }

    fn draw_distorted_eye(
        &mut self,
        pipeline: &WgpuDistortionPipeline,
        texture: &WgpuTexture,
        eye: Eye,
        uniforms: &DistortionUniforms,
        viewport: Viewport,
    ) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if !usable(&viewport) {
            return;
        }
        let index = eye.index();
        self.queue
            .write_buffer(&pipeline.eye_buffers[index], 0, bytemuck::bytes_of(uniforms));

        let mut pass = Self::begin_pass(frame, "Distortion Pass");
        pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &texture.bind_group, &[]);
        pass.set_bind_group(1, &pipeline.eye_bind_groups[index], &[]);
        pass.draw(0..6, 0..1);
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.queue.submit(std::iter::once(frame.encoder.finish()));
            frame.output.present();
        }
    }
}
