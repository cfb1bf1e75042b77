//! Per-eye effect settings and the store the UI writes into.

use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};

/// Which half of the stereo composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Effect parameters for one eye. Values are unclamped; the processor clamps
/// pixel output, not the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeSettings {
    pub enabled: bool,
    pub contrast: f32,
    pub red_tint: f32,
    pub green_tint: f32,
    pub fog_intensity: f32,
    /// Horizontal stretch; each unit is 20 pixels.
    pub directional: f32,
}

impl EyeSettings {
    /// Pixels of directional stretch this eye asks for.
    pub fn stretch_pixels(&self) -> i32 {
        (self.directional * 20.0).round() as i32
    }

    /// True when no stage of the pipeline would touch the pixels.
    pub fn is_identity(&self) -> bool {
        !self.enabled
            || (self.contrast == 1.0
                && self.red_tint == 0.0
                && self.green_tint == 0.0
                && self.fog_intensity <= 0.0
                && self.stretch_pixels() == 0)
    }
}

impl Default for EyeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            contrast: 1.0,
            red_tint: 0.0,
            green_tint: 0.0,
            fog_intensity: 0.0,
            directional: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub left: EyeSettings,
    pub right: EyeSettings,
}

impl EffectSettings {
    pub fn eye(&self, eye: Eye) -> &EyeSettings {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    pub fn eye_mut(&mut self, eye: Eye) -> &mut EyeSettings {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }
}

/// Shared settings cell. The UI replaces the whole struct; the render tick
/// copies the whole struct, so a reader never sees half of an update.
#[derive(Clone, Default)]
pub struct EffectSettingsStore {
    inner: Arc<Mutex<EffectSettings>>,
}

impl EffectSettingsStore {
    pub fn new(initial: EffectSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, settings: EffectSettings) {
        if let Ok(mut current) = self.inner.lock() {
            *current = settings;
        }
    }

    pub fn snapshot(&self) -> EffectSettings {
        self.inner.lock().map(|s| *s).unwrap_or_default()
    }
}
