//! Player configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::effects::{EffectProcessor, PassThrough, PixelPipeline, StereoLayout};
use crate::error::PlayerResult;
use crate::settings::EffectSettings;

/// Which render backend the capability probe may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Distortion-corrected when the SDK provides it, flat otherwise.
    #[default]
    Auto,
    /// Always draw the flat split quad.
    Flat,
    /// Like `Auto`, but falling back to flat is logged as a warning.
    Distortion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    #[default]
    Pipeline,
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub backend: BackendPreference,
    pub processor: ProcessorKind,
    pub stereo_layout: StereoLayout,
    /// Per-eye field of view on both axes.
    pub fov_degrees: f32,
    /// Side length of the placeholder pattern shown while no video arrives.
    pub placeholder_size: u32,
    pub log_level: String,
    /// Settings in effect until the UI sends its own.
    pub effects: EffectSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            processor: ProcessorKind::Pipeline,
            stereo_layout: StereoLayout::SideBySide,
            fov_degrees: 180.0,
            placeholder_size: 512,
            log_level: "info".to_string(),
            effects: EffectSettings::default(),
        }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(text: &str) -> PlayerResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> PlayerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Unknown level names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn fov_radians(&self) -> f32 {
        self.fov_degrees.to_radians()
    }

    pub fn build_processor(&self) -> Box<dyn EffectProcessor> {
        match self.processor {
            ProcessorKind::Pipeline => Box::new(PixelPipeline::new(self.stereo_layout)),
            ProcessorKind::Passthrough => Box::new(PassThrough::new(self.stereo_layout)),
        }
    }
}
