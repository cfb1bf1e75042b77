//! GPU seam used by the texture, quad and distortion stages.
//!
//! `WgpuDevice` (in `renderer`) is the production implementation. Resources
//! are associated types that release themselves on drop, so owning a handle
//! is the same as owning the GPU object.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::GpuError;
use crate::settings::Eye;

/// One vertex of the split-screen quads.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Per-eye parameters for the barrel distortion pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DistortionUniforms {
    pub k1: f32,
    pub k2: f32,
    /// Shrinks the distorted image so the lens edge stays inside the viewport.
    pub scale: f32,
    /// Horizontal shift of the lens center, in normalized eye coordinates.
    pub lens_center_offset: f32,
    /// Where this eye's half starts in the composite texture (0.0 or 0.5).
    pub uv_offset_x: f32,
    pub uv_scale_x: f32,
    pub padding: [f32; 2],
}

/// Pixel rectangle on the display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Left or right half of a `width` x `height` screen.
    pub fn eye(eye: Eye, width: u32, height: u32) -> Self {
        let half = (width / 2) as f32;
        let x = match eye {
            Eye::Left => 0.0,
            Eye::Right => half,
        };
        Self {
            x,
            y: 0.0,
            width: half,
            height: height as f32,
        }
    }
}

pub trait RenderDevice {
    type Texture: 'static;
    type Program: 'static;
    type VertexBuffer: 'static;
    type DistortionPipeline: 'static;

    fn surface_size(&self) -> (u32, u32);
    fn resize_surface(&mut self, width: u32, height: u32);

    /// Compiles the textured-quad shader program.
    fn create_program(&mut self) -> Result<Self::Program, GpuError>;
    fn create_vertex_buffer(&mut self, vertices: &[QuadVertex]) -> Result<Self::VertexBuffer, GpuError>;
    /// Allocates an RGBA8 texture of exactly `width` x `height`.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<Self::Texture, GpuError>;
    /// Overwrites the full extent of `texture`; no reallocation.
    fn write_texture(&mut self, texture: &Self::Texture, rgba: &[u8], width: u32, height: u32);
    fn create_distortion_pipeline(&mut self) -> Result<Self::DistortionPipeline, GpuError>;

    /// Acquires the next display image. Returns `false` when the surface is
    /// not ready; the caller skips the frame.
    fn begin_frame(&mut self) -> bool;
    fn draw_quads(
        &mut self,
        program: &Self::Program,
        vertices: &Self::VertexBuffer,
        vertex_count: u32,
        texture: &Self::Texture,
        mvp: &Mat4,
        viewport: Viewport,
    );
    fn draw_distorted_eye(
        &mut self,
        pipeline: &Self::DistortionPipeline,
        texture: &Self::Texture,
        eye: Eye,
        uniforms: &DistortionUniforms,
        viewport: Viewport,
    );
    /// Submits the recorded work and presents.
    fn end_frame(&mut self);
}
