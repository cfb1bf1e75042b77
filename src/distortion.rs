//! Surface lifecycle and the choice between flat and lens-corrected output.
//!
//! `DistortionStage` owns every GPU and SDK object the player creates. It
//! moves through `StagePhase` in response to host signals and is the only
//! place that issues draw calls.

use std::time::Duration;
use log::{debug, error, info, warn};

use crate::config::BackendPreference;
use crate::effects::StereoComposite;
use crate::error::PlayerResult;
use crate::gpu::{RenderDevice, Viewport};
use crate::quad::QuadRenderer;
use crate::settings::Eye;
use crate::texture::{TextureHandle, TextureStage};
use crate::vr::{DistortionRenderer, HeadPose, HeadTracker, LensDistortion, LensParams, VrSdk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    /// No surface yet, or the last one was lost.
    Uninitialized,
    /// GPU objects exist; nothing has been presented on this surface.
    SurfaceReady,
    Rendering,
    /// Distortion objects are being rebuilt for new screen dimensions.
    Reinitializing,
    /// Torn down. Every later signal is ignored.
    Destroyed,
}

/// Lens distortion and distortion renderer, acquired together for one set of
/// screen dimensions.
pub struct DistortionContext<D: RenderDevice> {
    params: LensParams,
    lens: Option<Box<dyn LensDistortion>>,
    renderer: Option<Box<dyn DistortionRenderer<D>>>,
}

impl<D: RenderDevice> DistortionContext<D> {
    fn new(
        params: LensParams,
        lens: Box<dyn LensDistortion>,
        mut renderer: Box<dyn DistortionRenderer<D>>,
    ) -> Self {
        for eye in Eye::BOTH {
            renderer.set_mesh(eye, lens.eye_mesh(eye));
        }
        Self {
            params,
            lens: Some(lens),
            renderer: Some(renderer),
        }
    }

    pub fn params(&self) -> &LensParams {
        &self.params
    }

    fn render_eye(&mut self, device: &mut D, texture: &D::Texture, eye: Eye, viewport: Viewport) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render_eye(device, texture, eye, viewport);
        }
    }
}

impl<D: RenderDevice> Drop for DistortionContext<D> {
    fn drop(&mut self) {
        // Lens first, then the renderer that was built around it
        self.lens.take();
        self.renderer.take();
    }
}

pub enum RenderBackend<D: RenderDevice> {
    FlatSplitScreen,
    DistortionCorrected(DistortionContext<D>),
}

impl<D: RenderDevice> RenderBackend<D> {
    pub fn is_distortion_corrected(&self) -> bool {
        matches!(self, RenderBackend::DistortionCorrected(_))
    }
}

/// Fixed parameters the stage is built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageOptions {
    pub backend: BackendPreference,
    pub fov_radians: f32,
    pub placeholder_size: u32,
}

pub struct DistortionStage<D: RenderDevice, S: VrSdk<D>> {
    sdk: S,
    options: StageOptions,
    phase: StagePhase,
    paused: bool,
    screen: (u32, u32),
    device: Option<D>,
    /// Surface handed over while paused, built on resume.
    deferred_device: Option<D>,
    /// Screen dimensions changed while paused.
    rebuild_pending: bool,
    texture: TextureStage<D>,
    quad: QuadRenderer<D>,
    tracker: Option<Box<dyn HeadTracker>>,
    backend: RenderBackend<D>,
    last_pose: Option<HeadPose>,
}

impl<D: RenderDevice, S: VrSdk<D>> DistortionStage<D, S> {
    pub fn new(sdk: S, options: StageOptions) -> Self {
        Self {
            sdk,
            options,
            phase: StagePhase::Uninitialized,
            paused: false,
            screen: (0, 0),
            device: None,
            deferred_device: None,
            rebuild_pending: false,
            texture: TextureStage::new(options.placeholder_size),
            quad: QuadRenderer::new(),
            tracker: None,
            backend: RenderBackend::FlatSplitScreen,
            last_pose: None,
        }
    }

    pub fn phase(&self) -> StagePhase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn backend(&self) -> &RenderBackend<D> {
        &self.backend
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    pub fn texture_handle(&self) -> Option<TextureHandle> {
        self.texture.handle()
    }

    pub fn has_head_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn last_pose(&self) -> Option<HeadPose> {
        self.last_pose
    }

    /// Whether a draw tick would do any work right now.
    pub fn can_draw(&self) -> bool {
        !self.paused
            && self.device.is_some()
            && matches!(self.phase, StagePhase::SurfaceReady | StagePhase::Rendering)
    }

    /// Builds every GPU object for a new surface.
    ///
    /// On a repeated call the previous objects are released first. The head
    /// tracker is created once and kept. A failure leaves the stage
    /// `Uninitialized` with nothing allocated. While paused the device is
    /// held untouched and the build runs on `resume`.
    pub fn surface_created(&mut self, device: D) -> PlayerResult<()> {
        if self.phase == StagePhase::Destroyed {
            warn!("DistortionStage: surface created after destroy, ignoring");
            return Ok(());
        }
        if self.paused {
            info!("DistortionStage: surface created while paused, setup deferred to resume");
            self.deferred_device = Some(device);
            return Ok(());
        }
        self.build_surface(device)
    }

    fn build_surface(&mut self, mut device: D) -> PlayerResult<()> {
        self.rebuild_pending = false;
        if self.device.is_some() {
            info!("DistortionStage: surface recreated, releasing previous objects");
            self.release_surface_objects();
        }

        if self.screen.0 > 0 && self.screen.1 > 0 {
            device.resize_surface(self.screen.0, self.screen.1);
        } else {
            self.screen = device.surface_size();
        }

        if let Err(e) = self.quad.initialize(&mut device) {
            error!("DistortionStage: quad setup failed: {}", e);
            self.quad.release_vertices();
            self.quad.release_program();
            self.phase = StagePhase::Uninitialized;
            return Err(e.into());
        }
        if let Err(e) = self.texture.initialize(&mut device) {
            error!("DistortionStage: texture setup failed: {}", e);
            self.quad.release_vertices();
            self.quad.release_program();
            self.phase = StagePhase::Uninitialized;
            return Err(e.into());
        }

        if self.tracker.is_none() {
            self.tracker = self.sdk.create_head_tracker();
            if self.tracker.is_none() {
                warn!("DistortionStage: no head tracker, pose queries disabled");
            }
        }

        self.backend = self.probe_backend(&mut device);
        self.device = Some(device);
        self.phase = StagePhase::SurfaceReady;
        info!(
            "DistortionStage: surface ready at {}x{} ({})",
            self.screen.0,
            self.screen.1,
            self.backend_name()
        );
        Ok(())
    }

    /// Records new screen dimensions and rebuilds the distortion objects
    /// against them. The head tracker is untouched. While paused only the
    /// dimensions are recorded; the rebuild runs on `resume`.
    pub fn set_screen_params(&mut self, width: u32, height: u32) {
        if self.phase == StagePhase::Destroyed {
            return;
        }
        self.screen = (width, height);
        if self.device.is_none() {
            debug!("DistortionStage: recorded {}x{} before surface creation", width, height);
            return;
        }
        if self.paused {
            debug!("DistortionStage: recorded {}x{} while paused", width, height);
            self.rebuild_pending = true;
            return;
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.rebuild_pending = false;
        let (width, height) = self.screen;

        let resume_phase = match self.phase {
            StagePhase::Rendering => StagePhase::Rendering,
            _ => StagePhase::SurfaceReady,
        };
        self.phase = StagePhase::Reinitializing;
        self.backend = RenderBackend::FlatSplitScreen;

        let mut backend = RenderBackend::FlatSplitScreen;
        if let Some(mut device) = self.device.take() {
            device.resize_surface(width, height);
            backend = self.probe_backend(&mut device);
            self.device = Some(device);
        }
        self.backend = backend;
        self.phase = resume_phase;
        info!(
            "DistortionStage: rebuilt for {}x{} ({})",
            width,
            height,
            self.backend_name()
        );
    }

    pub fn pause(&mut self) {
        if self.phase == StagePhase::Destroyed || self.paused {
            return;
        }
        self.paused = true;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.pause();
        }
        info!("DistortionStage: paused");
    }

    pub fn resume(&mut self) {
        if self.phase == StagePhase::Destroyed || !self.paused {
            return;
        }
        self.paused = false;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.resume();
        }
        info!("DistortionStage: resumed");

        if let Some(device) = self.deferred_device.take() {
            if let Err(e) = self.build_surface(device) {
                error!("DistortionStage: deferred surface setup failed: {}", e);
            }
        } else if self.rebuild_pending {
            self.rebuild();
        }
    }

    /// Fetches the current head pose. The static view does not apply it.
    pub fn query_pose(&mut self, elapsed: Duration) -> Option<HeadPose> {
        if self.paused {
            return None;
        }
        let pose = self.tracker.as_mut().map(|t| t.pose(elapsed));
        if pose.is_some() {
            self.last_pose = pose;
        }
        pose
    }

    /// Uploads this tick's texture contents and presents.
    ///
    /// Returns `true` if a frame was presented.
    pub fn render(&mut self, composite: Option<&StereoComposite>, elapsed: Duration) -> bool {
        if !self.can_draw() {
            return false;
        }
        let Some(device) = self.device.as_mut() else {
            return false;
        };

        if let Err(e) = self.texture.update(device, composite, elapsed.as_secs_f32()) {
            error!("DistortionStage: texture upload failed: {}", e);
            return false;
        }
        let Some(texture) = self.texture.texture() else {
            return false;
        };
        if !device.begin_frame() {
            debug!("DistortionStage: surface not ready, skipping frame");
            return false;
        }

        let (width, height) = self.screen;
        match &mut self.backend {
            RenderBackend::DistortionCorrected(context) => {
                for eye in Eye::BOTH {
                    context.render_eye(device, texture, eye, Viewport::eye(eye, width, height));
                }
            }
            RenderBackend::FlatSplitScreen => self.quad.draw(device, texture, width, height),
        }
        device.end_frame();

        if self.phase == StagePhase::SurfaceReady {
            self.phase = StagePhase::Rendering;
            info!("DistortionStage: first frame presented");
        }
        true
    }

    /// Releases the GPU objects of a lost surface. The tracker survives so
    /// a recreated surface picks up where it left off.
    pub fn surface_lost(&mut self) {
        if self.phase == StagePhase::Destroyed {
            return;
        }
        self.release_surface_objects();
        self.phase = StagePhase::Uninitialized;
        info!("DistortionStage: surface lost");
    }

    /// Tears everything down in order: texture, vertex buffer, program,
    /// head tracker, lens distortion, distortion renderer. Safe to call
    /// repeatedly.
    pub fn destroy(&mut self) {
        if self.phase == StagePhase::Destroyed {
            return;
        }
        self.texture.release();
        self.quad.release_vertices();
        self.quad.release_program();
        self.tracker = None;
        self.backend = RenderBackend::FlatSplitScreen;
        self.device = None;
        self.deferred_device = None;
        self.phase = StagePhase::Destroyed;
        info!("DistortionStage: destroyed");
    }

    fn release_surface_objects(&mut self) {
        self.texture.release();
        self.quad.release_vertices();
        self.quad.release_program();
        self.backend = RenderBackend::FlatSplitScreen;
        self.device = None;
        self.deferred_device = None;
        self.rebuild_pending = false;
    }

    fn probe_backend(&mut self, device: &mut D) -> RenderBackend<D> {
        if self.options.backend == BackendPreference::Flat {
            info!("DistortionStage: flat split screen requested");
            return RenderBackend::FlatSplitScreen;
        }

        let params = LensParams::symmetric(self.options.fov_radians, self.screen.0, self.screen.1);
        let context = self.sdk.create_lens_distortion(&params).and_then(|lens| {
            self.sdk
                .create_distortion_renderer(device)
                .map(|renderer| DistortionContext::new(params, lens, renderer))
        });

        match context {
            Some(context) => RenderBackend::DistortionCorrected(context),
            None => {
                if self.options.backend == BackendPreference::Distortion {
                    warn!("DistortionStage: distortion requested but unavailable, drawing flat");
                } else {
                    info!("DistortionStage: no distortion backend, drawing flat");
                }
                RenderBackend::FlatSplitScreen
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        match self.backend {
            RenderBackend::FlatSplitScreen => "flat",
            RenderBackend::DistortionCorrected(_) => "distortion corrected",
        }
    }
}

impl<D: RenderDevice, S: VrSdk<D>> Drop for DistortionStage<D, S> {
    fn drop(&mut self) {
        self.destroy();
    }
}
