//! Stereo Player - per-eye effects and lens-aware presentation for a
//! head-mounted display.
//!
//! Decoded frames arrive on a `FrameSource`, are split into a side-by-side
//! composite with independent effects per eye, uploaded to a single GPU
//! texture and drawn either through a barrel-distortion pass or as a flat
//! split screen. `StereoPlayerApp` is the context the host drives.

pub mod app;
pub mod config;
pub mod distortion;
pub mod effects;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod quad;
pub mod renderer;
pub mod settings;
pub mod texture;
pub mod vr;

#[cfg(target_os = "android")]
mod host;
#[cfg(target_os = "android")]
mod sensors;
#[cfg(target_os = "android")]
pub mod video;

pub use app::{PlayerInputs, StereoPlayerApp};
pub use config::{BackendPreference, PlayerConfig, ProcessorKind};
pub use distortion::{DistortionStage, RenderBackend, StagePhase};
pub use effects::{EffectProcessor, PassThrough, PixelPipeline, StereoComposite, StereoLayout};
pub use error::{GpuError, PlayerError, PlayerResult};
pub use frame::{FrameSource, PixelFormat, VideoFrame};
pub use gpu::RenderDevice;
pub use renderer::WgpuDevice;
pub use settings::{EffectSettings, EffectSettingsStore, Eye, EyeSettings};
pub use texture::TextureHandle;
pub use vr::{BuiltinSdk, HeadPose, VrSdk};
