//! Recording fakes for the GPU and the VR SDK.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use glam::{Mat4, Quat, Vec3};
use stereo_player::error::GpuError;
use stereo_player::gpu::{DistortionUniforms, QuadVertex, RenderDevice, Viewport};
use stereo_player::vr::{
    DistortionRenderer, FieldOfView, HeadPose, HeadTracker, LensDistortion, LensParams, VrSdk,
};
use stereo_player::Eye;

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub texture: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Shared event log. Every fake writes one line per call or drop.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<String>>>,
    uploads: Rc<RefCell<Vec<Upload>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.uploads.borrow_mut().clear();
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }

    pub fn drops(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.starts_with("drop "))
            .cloned()
            .collect()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.borrow().clone()
    }

    fn record_upload(&self, upload: Upload) {
        self.uploads.borrow_mut().push(upload);
    }
}

pub struct FakeTexture {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    recorder: Recorder,
}

impl Drop for FakeTexture {
    fn drop(&mut self) {
        self.recorder.push(format!("drop texture {}", self.id));
    }
}

pub struct FakeProgram {
    recorder: Recorder,
}

impl Drop for FakeProgram {
    fn drop(&mut self) {
        self.recorder.push("drop program");
    }
}

pub struct FakeVertexBuffer {
    pub vertices: Vec<QuadVertex>,
    recorder: Recorder,
}

impl Drop for FakeVertexBuffer {
    fn drop(&mut self) {
        self.recorder.push("drop buffer");
    }
}

pub struct FakePipeline {
    recorder: Recorder,
}

impl Drop for FakePipeline {
    fn drop(&mut self) {
        self.recorder.push("drop distortion pipeline");
    }
}

pub struct FakeDevice {
    recorder: Recorder,
    size: (u32, u32),
    next_texture: u32,
    pub fail_program: bool,
    pub frame_ready: bool,
}

impl FakeDevice {
    pub fn new(recorder: &Recorder, width: u32, height: u32) -> Self {
        Self {
            recorder: recorder.clone(),
            size: (width, height),
            next_texture: 0,
            fail_program: false,
            frame_ready: true,
        }
    }
}

impl RenderDevice for FakeDevice {
    type Texture = FakeTexture;
    type Program = FakeProgram;
    type VertexBuffer = FakeVertexBuffer;
    type DistortionPipeline = FakePipeline;

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.recorder.push(format!("resize {}x{}", width, height));
    }

    fn create_program(&mut self) -> Result<FakeProgram, GpuError> {
        if self.fail_program {
            self.recorder.push("create program failed");
            return Err(GpuError::Shader("quad: bad shader".into()));
        }
        self.recorder.push("create program");
        Ok(FakeProgram {
            recorder: self.recorder.clone(),
        })
    }

    fn create_vertex_buffer(&mut self, vertices: &[QuadVertex]) -> Result<FakeVertexBuffer, GpuError> {
        self.recorder.push(format!("create buffer {}", vertices.len()));
        Ok(FakeVertexBuffer {
            vertices: vertices.to_vec(),
            recorder: self.recorder.clone(),
        })
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<FakeTexture, GpuError> {
        self.next_texture += 1;
        self.recorder
            .push(format!("create texture {} {}x{}", self.next_texture, width, height));
        Ok(FakeTexture {
            id: self.next_texture,
            width,
            height,
            recorder: self.recorder.clone(),
        })
    }

    fn write_texture(&mut self, texture: &FakeTexture, rgba: &[u8], width: u32, height: u32) {
        assert_eq!((texture.width, texture.height), (width, height), "sub-region must match");
        assert_eq!(rgba.len(), (width * height * 4) as usize);
        self.recorder.push(format!("write texture {}", texture.id));
        self.recorder.record_upload(Upload {
            texture: texture.id,
            width,
            height,
            data: rgba.to_vec(),
        });
    }

    fn create_distortion_pipeline(&mut self) -> Result<FakePipeline, GpuError> {
        self.recorder.push("create distortion pipeline");
        Ok(FakePipeline {
            recorder: self.recorder.clone(),
        })
    }

    fn begin_frame(&mut self) -> bool {
        self.recorder.push("begin frame");
        self.frame_ready
    }

    fn draw_quads(
        &mut self,
        _program: &FakeProgram,
        _vertices: &FakeVertexBuffer,
        vertex_count: u32,
        texture: &FakeTexture,
        mvp: &Mat4,
        _viewport: Viewport,
    ) {
        assert_eq!(*mvp, Mat4::IDENTITY);
        self.recorder
            .push(format!("draw quads {} texture {}", vertex_count, texture.id));
    }

    fn draw_distorted_eye(
        &mut self,
        _pipeline: &FakePipeline,
        _texture: &FakeTexture,
        eye: Eye,
        _uniforms: &DistortionUniforms,
        viewport: Viewport,
    ) {
        self.recorder.push(format!(
            "draw distorted {:?} at {} width {}",
            eye, viewport.x, viewport.width
        ));
    }

    fn end_frame(&mut self) {
        self.recorder.push("end frame");
    }
}

pub struct FakeTracker {
    recorder: Recorder,
}

impl HeadTracker for FakeTracker {
    fn pose(&mut self, timestamp: Duration) -> HeadPose {
        self.recorder.push("pose");
        HeadPose {
            position: Vec3::ZERO,
            orientation: Quat::from_rotation_y(timestamp.as_secs_f32()),
        }
    }

    fn pause(&mut self) {
        self.recorder.push("pause tracker");
    }

    fn resume(&mut self) {
        self.recorder.push("resume tracker");
    }
}

impl Drop for FakeTracker {
    fn drop(&mut self) {
        self.recorder.push("drop tracker");
    }
}

pub struct FakeLens {
    params: LensParams,
    recorder: Recorder,
}

impl LensDistortion for FakeLens {
    fn field_of_view(&self, eye: Eye) -> FieldOfView {
        self.params.eye(eye)
    }

    fn eye_mesh(&self, eye: Eye) -> DistortionUniforms {
        DistortionUniforms {
            k1: 0.0,
            k2: 0.0,
            scale: 1.0,
            lens_center_offset: 0.0,
            uv_offset_x: if eye == Eye::Left { 0.0 } else { 0.5 },
            uv_scale_x: 0.5,
            padding: [0.0; 2],
        }
    }
}

impl Drop for FakeLens {
    fn drop(&mut self) {
        self.recorder.push("drop lens");
    }
}

pub struct FakeRenderer {
    recorder: Recorder,
}

impl DistortionRenderer<FakeDevice> for FakeRenderer {
    fn set_mesh(&mut self, eye: Eye, _mesh: DistortionUniforms) {
        self.recorder.push(format!("set mesh {:?}", eye));
    }

    fn render_eye(&mut self, _device: &mut FakeDevice, texture: &FakeTexture, eye: Eye, viewport: Viewport) {
        self.recorder.push(format!(
            "render eye {:?} texture {} at {}",
            eye, texture.id, viewport.x
        ));
    }
}

impl Drop for FakeRenderer {
    fn drop(&mut self) {
        self.recorder.push("drop renderer");
    }
}

pub struct FakeSdk {
    recorder: Recorder,
    pub tracker_available: bool,
    pub lens_available: bool,
    pub renderer_available: bool,
}

impl FakeSdk {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            tracker_available: true,
            lens_available: true,
            renderer_available: true,
        }
    }

    pub fn without_lens(mut self) -> Self {
        self.lens_available = false;
        self
    }
}

impl VrSdk<FakeDevice> for FakeSdk {
    fn create_head_tracker(&mut self) -> Option<Box<dyn HeadTracker>> {
        self.recorder.push("create tracker");
        if !self.tracker_available {
            return None;
        }
        Some(Box::new(FakeTracker {
            recorder: self.recorder.clone(),
        }))
    }

    fn create_lens_distortion(&mut self, params: &LensParams) -> Option<Box<dyn LensDistortion>> {
        self.recorder.push(format!(
            "create lens {}x{}",
            params.screen_width, params.screen_height
        ));
        if !self.lens_available {
            return None;
        }
        Some(Box::new(FakeLens {
            params: *params,
            recorder: self.recorder.clone(),
        }))
    }

    fn create_distortion_renderer(&mut self, _device: &mut FakeDevice) -> Option<Box<dyn DistortionRenderer<FakeDevice>>> {
        self.recorder.push("create renderer");
        if !self.renderer_available {
            return None;
        }
        Some(Box::new(FakeRenderer {
            recorder: self.recorder.clone(),
        }))
    }
}

/// Milliseconds since start, as the render loop's clock.
pub fn at_ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
