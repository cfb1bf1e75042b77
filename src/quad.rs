//! Flat split-screen drawing: two textured quads, one per eye.

use glam::Mat4;
use log::debug;

use crate::error::GpuError;
use crate::gpu::{QuadVertex, RenderDevice, Viewport};

const fn v(x: f32, y: f32, u: f32, t: f32) -> QuadVertex {
    QuadVertex {
        position: [x, y, 0.0],
        tex_coord: [u, t],
    }
}

/// Left quad covers clip x in [-1, 0] and samples u in [0, 0.5]; the right
/// quad covers [0, 1] and samples [0.5, 1]. Texture v runs top to bottom.
pub const QUAD_VERTICES: [QuadVertex; 12] = [
    // left eye
    v(-1.0, -1.0, 0.0, 1.0),
    v(0.0, -1.0, 0.5, 1.0),
    v(-1.0, 1.0, 0.0, 0.0),
    v(-1.0, 1.0, 0.0, 0.0),
    v(0.0, -1.0, 0.5, 1.0),
    v(0.0, 1.0, 0.5, 0.0),
    // right eye
    v(0.0, -1.0, 0.5, 1.0),
    v(1.0, -1.0, 1.0, 1.0),
    v(0.0, 1.0, 0.5, 0.0),
    v(0.0, 1.0, 0.5, 0.0),
    v(1.0, -1.0, 1.0, 1.0),
    v(1.0, 1.0, 1.0, 0.0),
];

pub struct QuadRenderer<D: RenderDevice> {
    program: Option<D::Program>,
    vertices: Option<D::VertexBuffer>,
    // Head pose is not applied in the static 180 degree view
    mvp: Mat4,
}

impl<D: RenderDevice> QuadRenderer<D> {
    pub fn new() -> Self {
        Self {
            program: None,
            vertices: None,
            mvp: Mat4::IDENTITY,
        }
    }

    /// Compiles the program and uploads the static geometry.
    pub fn initialize(&mut self, device: &mut D) -> Result<(), GpuError> {
        self.program = Some(device.create_program()?);
        self.vertices = Some(device.create_vertex_buffer(&QUAD_VERTICES)?);
        debug!("QuadRenderer: program and {} vertices ready", QUAD_VERTICES.len());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some() && self.vertices.is_some()
    }

    pub fn mvp(&self) -> Mat4 {
        self.mvp
    }

    /// One draw call covering both eyes. Does nothing until initialized.
    pub fn draw(&self, device: &mut D, texture: &D::Texture, screen_width: u32, screen_height: u32) {
        if let (Some(program), Some(vertices)) = (&self.program, &self.vertices) {
            device.draw_quads(
                program,
                vertices,
                QUAD_VERTICES.len() as u32,
                texture,
                &self.mvp,
                Viewport::full(screen_width, screen_height),
            );
        }
    }

    pub fn release_vertices(&mut self) {
        self.vertices = None;
    }

    pub fn release_program(&mut self) {
        self.program = None;
    }
}

impl<D: RenderDevice> Default for QuadRenderer<D> {
    fn default() -> Self {
        Self::new()
    }
}
