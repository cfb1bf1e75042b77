//! The player context the host drives, one method per host signal.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use log::{debug, info};

use crate::config::PlayerConfig;
use crate::distortion::{DistortionStage, StageOptions, StagePhase};
use crate::effects::EffectProcessor;
use crate::error::PlayerResult;
use crate::frame::FrameSource;
use crate::gpu::RenderDevice;
use crate::settings::{EffectSettings, EffectSettingsStore};
use crate::texture::TextureHandle;
use crate::vr::VrSdk;

/// The handles other threads write into. Cloning shares them.
#[derive(Clone, Default)]
pub struct PlayerInputs {
    pub frames: FrameSource,
    pub settings: EffectSettingsStore,
    video_uri: Arc<Mutex<Option<String>>>,
}

impl PlayerInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the URI as given. The player never opens it.
    pub fn set_video_uri(&self, uri: impl Into<String>) {
        let uri = uri.into();
        info!("PlayerInputs: video uri set to {}", uri);
        if let Ok(mut slot) = self.video_uri.lock() {
            *slot = Some(uri);
        }
    }

    pub fn video_uri(&self) -> Option<String> {
        self.video_uri.lock().ok().and_then(|slot| slot.clone())
    }
}

pub struct StereoPlayerApp<D: RenderDevice, S: VrSdk<D>> {
    config: PlayerConfig,
    inputs: PlayerInputs,
    processor: Box<dyn EffectProcessor>,
    stage: DistortionStage<D, S>,
    started: Instant,
    frames_presented: u64,
}

impl<D: RenderDevice, S: VrSdk<D>> StereoPlayerApp<D, S> {
    pub fn new(config: PlayerConfig, sdk: S) -> Self {
        Self::with_inputs(config, sdk, PlayerInputs::new())
    }

    /// Builds the player around existing input handles. The configured
    /// effect settings replace whatever the store held.
    pub fn with_inputs(config: PlayerConfig, sdk: S, inputs: PlayerInputs) -> Self {
        inputs.settings.set(config.effects);
        let processor = config.build_processor();
        let options = StageOptions {
            backend: config.backend,
            fov_radians: config.fov_radians(),
            placeholder_size: config.placeholder_size,
        };
        info!(
            "StereoPlayerApp: {} processor, {:?} backend, {} degree fov",
            processor.name(),
            config.backend,
            config.fov_degrees
        );
        Self {
            config,
            inputs,
            processor,
            stage: DistortionStage::new(sdk, options),
            started: Instant::now(),
            frames_presented: 0,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn inputs(&self) -> &PlayerInputs {
        &self.inputs
    }

    pub fn frame_source(&self) -> &FrameSource {
        &self.inputs.frames
    }

    pub fn stage(&self) -> &DistortionStage<D, S> {
        &self.stage
    }

    pub fn phase(&self) -> StagePhase {
        self.stage.phase()
    }

    pub fn texture_handle(&self) -> Option<TextureHandle> {
        self.stage.texture_handle()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn on_surface_created(&mut self, device: D) -> PlayerResult<()> {
        self.stage.surface_created(device)
    }

    /// One render tick on the wall clock.
    pub fn on_draw_frame(&mut self) -> bool {
        let elapsed = self.started.elapsed();
        self.draw_frame_at(elapsed)
    }

    /// One render tick at `elapsed` since start: pose, effects, upload,
    /// present. Returns `true` if a frame was presented.
    pub fn draw_frame_at(&mut self, elapsed: Duration) -> bool {
        if !self.stage.can_draw() {
            return false;
        }

        let _pose = self.stage.query_pose(elapsed);

        let composite = self.inputs.frames.take_latest().map(|frame| {
            let settings = self.inputs.settings.snapshot();
            self.processor.process(&frame, &settings)
        });

        let presented = self.stage.render(composite.as_ref(), elapsed);
        if presented {
            self.frames_presented += 1;
            if self.frames_presented % 600 == 0 {
                debug!("StereoPlayerApp: {} frames presented", self.frames_presented);
            }
        }
        presented
    }

    pub fn on_pause(&mut self) {
        self.stage.pause();
    }

    pub fn on_resume(&mut self) {
        self.stage.resume();
    }

    pub fn set_screen_params(&mut self, width: u32, height: u32) {
        info!("StereoPlayerApp: screen params {}x{}", width, height);
        self.stage.set_screen_params(width, height);
    }

    pub fn set_video_uri(&self, uri: impl Into<String>) {
        self.inputs.set_video_uri(uri);
    }

    pub fn video_uri(&self) -> Option<String> {
        self.inputs.video_uri()
    }

    /// Replaces the effect settings wholesale; the next tick picks them up.
    pub fn set_effect_settings(&self, settings: EffectSettings) {
        self.inputs.settings.set(settings);
    }

    pub fn effect_settings(&self) -> EffectSettings {
        self.inputs.settings.snapshot()
    }

    /// Reserved for a future interaction; playback control lives in the host.
    pub fn on_trigger_event(&mut self) {
        info!("StereoPlayerApp: trigger event");
    }

    pub fn on_surface_lost(&mut self) {
        self.stage.surface_lost();
    }

    pub fn on_destroy(&mut self) {
        self.stage.destroy();
    }
}
