//! VR SDK seam: head tracking, lens distortion and the distortion renderer.
//!
//! Every SDK object is optional. A factory that returns `None` disables the
//! feature for the surface lifetime instead of failing the player. Destroying
//! an object is dropping its box.

use std::f32::consts::PI;
use std::marker::PhantomData;
use std::time::Duration;
use glam::{EulerRot, Quat, Vec3};
use log::{debug, info, warn};

use crate::gpu::{DistortionUniforms, RenderDevice, Viewport};
use crate::settings::Eye;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Angular extent of one eye's view, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub horizontal: f32,
    pub vertical: f32,
}

impl FieldOfView {
    pub fn uniform(radians: f32) -> Self {
        Self {
            horizontal: radians,
            vertical: radians,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensParams {
    pub left_eye: FieldOfView,
    pub right_eye: FieldOfView,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl LensParams {
    /// Same field of view for both eyes on both axes.
    pub fn symmetric(fov_radians: f32, screen_width: u32, screen_height: u32) -> Self {
        let fov = FieldOfView::uniform(fov_radians);
        Self {
            left_eye: fov,
            right_eye: fov,
            screen_width,
            screen_height,
        }
    }

    pub fn eye(&self, eye: Eye) -> FieldOfView {
        match eye {
            Eye::Left => self.left_eye,
            Eye::Right => self.right_eye,
        }
    }
}

pub trait HeadTracker {
    /// Pose at `timestamp`, measured from player start.
    fn pose(&mut self, timestamp: Duration) -> HeadPose;
    fn pause(&mut self);
    fn resume(&mut self);
}

pub trait LensDistortion {
    fn field_of_view(&self, eye: Eye) -> FieldOfView;
    /// Distortion mesh for `eye`, in the form the renderer consumes.
    fn eye_mesh(&self, eye: Eye) -> DistortionUniforms;
}

pub trait DistortionRenderer<D: RenderDevice> {
    fn set_mesh(&mut self, eye: Eye, mesh: DistortionUniforms);
    /// Draws `eye`'s half of `texture` into `viewport` through its mesh.
    fn render_eye(&mut self, device: &mut D, texture: &D::Texture, eye: Eye, viewport: Viewport);
}

/// Factory for the SDK objects the distortion stage owns.
pub trait VrSdk<D: RenderDevice> {
    fn create_head_tracker(&mut self) -> Option<Box<dyn HeadTracker>>;
    fn create_lens_distortion(&mut self, params: &LensParams) -> Option<Box<dyn LensDistortion>>;
    fn create_distortion_renderer(&mut self, device: &mut D) -> Option<Box<dyn DistortionRenderer<D>>>;
}

/// Gentle breathing and sway, used when no rotation sensor is available.
pub struct SimulatedHeadTracker {
    paused: bool,
    last: HeadPose,
}

impl SimulatedHeadTracker {
    pub fn new() -> Self {
        Self {
            paused: false,
            last: HeadPose::default(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for SimulatedHeadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadTracker for SimulatedHeadTracker {
    fn pose(&mut self, timestamp: Duration) -> HeadPose {
        if self.paused {
            return self.last;
        }
        let t = timestamp.as_secs_f32();
        let breathing = (t * 0.5).sin() * 0.01;
        let sway = (t * 0.3).sin() * 0.005;
        self.last = HeadPose {
            position: Vec3::ZERO,
            orientation: Quat::from_euler(EulerRot::YXZ, 0.0, breathing, sway),
        };
        self.last
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }
}

/// Polynomial barrel distortion, `r' = r * (1 + k1 r^2 + k2 r^4)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BarrelLensDistortion {
    params: LensParams,
    k1: f32,
    k2: f32,
}

impl BarrelLensDistortion {
    pub const K1: f32 = 0.25;
    pub const K2: f32 = 0.15;

    /// Returns `None` for a field of view outside (0, pi] on any axis.
    pub fn new(params: LensParams) -> Option<Self> {
        let valid = |a: f32| a.is_finite() && a > 0.0 && a <= PI + f32::EPSILON;
        let fovs = [params.left_eye, params.right_eye];
        if !fovs.iter().all(|f| valid(f.horizontal) && valid(f.vertical)) {
            warn!("BarrelLensDistortion: rejecting field of view {:?}", fovs);
            return None;
        }
        Some(Self {
            params,
            k1: Self::K1,
            k2: Self::K2,
        })
    }

    /// Shrinks the image so that the edge (r = 1) lands back on the edge.
    pub fn fill_scale(&self) -> f32 {
        1.0 / (1.0 + self.k1 + self.k2)
    }
}

impl LensDistortion for BarrelLensDistortion {
    fn field_of_view(&self, eye: Eye) -> FieldOfView {
        self.params.eye(eye)
    }

    fn eye_mesh(&self, eye: Eye) -> DistortionUniforms {
        DistortionUniforms {
            k1: self.k1,
            k2: self.k2,
            scale: self.fill_scale(),
            lens_center_offset: 0.0,
            uv_offset_x: match eye {
                Eye::Left => 0.0,
                Eye::Right => 0.5,
            },
            uv_scale_x: 0.5,
            padding: [0.0; 2],
        }
    }
}

/// Renders each eye through the device's distortion pipeline.
pub struct MeshDistortionRenderer<D: RenderDevice> {
    pipeline: D::DistortionPipeline,
    meshes: [Option<DistortionUniforms>; 2],
}

impl<D: RenderDevice> MeshDistortionRenderer<D> {
    pub fn new(pipeline: D::DistortionPipeline) -> Self {
        Self {
            pipeline,
            meshes: [None; 2],
        }
    }
}

impl<D: RenderDevice> DistortionRenderer<D> for MeshDistortionRenderer<D> {
    fn set_mesh(&mut self, eye: Eye, mesh: DistortionUniforms) {
        self.meshes[eye.index()] = Some(mesh);
    }

    fn render_eye(&mut self, device: &mut D, texture: &D::Texture, eye: Eye, viewport: Viewport) {
        match &self.meshes[eye.index()] {
            Some(mesh) => device.draw_distorted_eye(&self.pipeline, texture, eye, mesh, viewport),
            None => debug!("MeshDistortionRenderer: no mesh for {:?}, skipping", eye),
        }
    }
}

/// The SDK shipped with the player.
pub struct BuiltinSdk<D> {
    _device: PhantomData<fn(&mut D)>,
}

impl<D> BuiltinSdk<D> {
    pub fn new() -> Self {
        Self { _device: PhantomData }
    }
}

impl<D> Default for BuiltinSdk<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: RenderDevice + 'static> VrSdk<D> for BuiltinSdk<D> {
    fn create_head_tracker(&mut self) -> Option<Box<dyn HeadTracker>> {
        #[cfg(target_os = "android")]
        {
            let sensor = crate::sensors::SensorHeadTracker::new();
            if sensor.is_available() {
                info!("BuiltinSdk: using rotation sensor for head tracking");
                return Some(Box::new(sensor));
            }
        }
        info!("BuiltinSdk: no rotation sensor, using simulated motion");
        Some(Box::new(SimulatedHeadTracker::new()))
    }

    fn create_lens_distortion(&mut self, params: &LensParams) -> Option<Box<dyn LensDistortion>> {
        BarrelLensDistortion::new(*params).map(|lens| Box::new(lens) as Box<dyn LensDistortion>)
    }

    fn create_distortion_renderer(&mut self, device: &mut D) -> Option<Box<dyn DistortionRenderer<D>>> {
        match device.create_distortion_pipeline() {
            Ok(pipeline) => Some(Box::new(MeshDistortionRenderer::<D>::new(pipeline))),
            Err(e) => {
                warn!("BuiltinSdk: distortion pipeline unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hemisphere_is_accepted() {
        let lens = BarrelLensDistortion::new(LensParams::symmetric(PI, 1920, 1080));
        assert!(lens.is_some());
    }

    #[test]
    fn out_of_range_fov_is_rejected() {
        assert!(BarrelLensDistortion::new(LensParams::symmetric(0.0, 1920, 1080)).is_none());
        assert!(BarrelLensDistortion::new(LensParams::symmetric(4.0, 1920, 1080)).is_none());
        assert!(BarrelLensDistortion::new(LensParams::symmetric(f32::NAN, 1920, 1080)).is_none());
    }

    #[test]
    fn meshes_address_each_half_of_the_composite() {
        let lens = BarrelLensDistortion::new(LensParams::symmetric(PI, 1920, 1080)).unwrap();
        let left = lens.eye_mesh(Eye::Left);
        let right = lens.eye_mesh(Eye::Right);
        assert_eq!(left.uv_offset_x, 0.0);
        assert_eq!(right.uv_offset_x, 0.5);
        assert_eq!(left.uv_scale_x, 0.5);
        assert_eq!(left.k1, BarrelLensDistortion::K1);
    }

    #[test]
    fn fill_scale_brings_the_edge_back() {
        let lens = BarrelLensDistortion::new(LensParams::symmetric(PI, 100, 100)).unwrap();
        let s = lens.fill_scale();
        let r = 1.0f32;
        let distorted = r * (1.0 + BarrelLensDistortion::K1 * r * r + BarrelLensDistortion::K2 * r.powi(4));
        assert!((distorted * s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn simulated_tracker_moves_and_freezes_when_paused() {
        let mut tracker = SimulatedHeadTracker::new();
        let a = tracker.pose(Duration::from_secs(1));
        let b = tracker.pose(Duration::from_secs(2));
        assert_ne!(a.orientation, b.orientation);

        tracker.pause();
        assert!(tracker.is_paused());
        let frozen = tracker.pose(Duration::from_secs(5));
        assert_eq!(frozen, b);

        tracker.resume();
        assert_ne!(tracker.pose(Duration::from_secs(5)), b);
    }
}
