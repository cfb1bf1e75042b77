//! The single GPU texture the player samples from, plus the animated
//! placeholder shown while no video is arriving.

use std::f32::consts::PI;
use log::{debug, info};

use crate::effects::StereoComposite;
use crate::error::GpuError;
use crate::frame::to_rgba8;
use crate::gpu::RenderDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
}

/// Describes the texture currently owned by a `TextureStage`.
///
/// `generation` changes every time the GPU object is reallocated, so two
/// equal handles always refer to the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub generation: u64,
}

/// Fills `out` with a `size` x `size` RGBA test pattern at time `seconds`.
///
/// Each pixel depends only on its angle and distance from the center and on
/// the time, so the pattern spins and ripples as `seconds` advances.
pub fn placeholder_pattern(size: u32, seconds: f32, out: &mut Vec<u8>) {
    let len = (size as usize) * (size as usize) * 4;
    out.clear();
    out.reserve(len);

    let center = size as f32 / 2.0;
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let angle = dy.atan2(dx);
            let dist = (dx * dx + dy * dy).sqrt() / center.max(1.0);

            let r = 0.5 + 0.5 * (angle * 6.0 + seconds * 2.0).sin();
            let g = 0.5 + 0.5 * (dist * 4.0 * PI - seconds * 3.0).sin();
            let b = 0.5 + 0.5 * (angle * 3.0 + dist * 2.0 * PI + seconds).cos();
            out.extend_from_slice(&[to_byte(r), to_byte(g), to_byte(b), 255]);
        }
    }
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Owns the player's texture object and keeps it sized to whatever was last
/// uploaded.
pub struct TextureStage<D: RenderDevice> {
    texture: Option<D::Texture>,
    handle: Option<TextureHandle>,
    generations: u64,
    placeholder_size: u32,
    scratch: Vec<u8>,
    showing_video: bool,
}

impl<D: RenderDevice> TextureStage<D> {
    pub fn new(placeholder_size: u32) -> Self {
        Self {
            texture: None,
            handle: None,
            generations: 0,
            placeholder_size: placeholder_size.max(1),
            scratch: Vec::new(),
            showing_video: false,
        }
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn texture(&self) -> Option<&D::Texture> {
        self.texture.as_ref()
    }

    /// True once a real frame has been uploaded, until an empty frame or a
    /// release puts the placeholder back.
    pub fn is_showing_video(&self) -> bool {
        self.showing_video
    }

    /// Allocates the initial placeholder-sized texture.
    pub fn initialize(&mut self, device: &mut D) -> Result<TextureHandle, GpuError> {
        self.showing_video = false;
        self.ensure_size(device, self.placeholder_size, self.placeholder_size)
    }

    /// Uploads this tick's contents.
    ///
    /// `composite` is the processed frame if one was pending. With no new
    /// frame the texture keeps the last video frame, or animates the
    /// placeholder if there has not been one.
    pub fn update(
        &mut self,
        device: &mut D,
        composite: Option<&StereoComposite>,
        seconds: f32,
    ) -> Result<(), GpuError> {
        match composite {
            Some(c) if !c.is_empty() => self.upload_composite(device, c),
            Some(_) => {
                debug!("TextureStage: empty frame, back to placeholder");
                self.showing_video = false;
                self.upload_placeholder(device, seconds)
            }
            None if self.showing_video => Ok(()),
            None => self.upload_placeholder(device, seconds),
        }
    }

    pub fn upload_composite(&mut self, device: &mut D, composite: &StereoComposite) -> Result<(), GpuError> {
        let handle = self.ensure_size(device, composite.width, composite.height)?;
        let rgba = to_rgba8(&composite.data, composite.format);
        if let Some(texture) = &self.texture {
            device.write_texture(texture, &rgba, handle.width, handle.height);
        }
        self.showing_video = true;
        Ok(())
    }

    pub fn upload_placeholder(&mut self, device: &mut D, seconds: f32) -> Result<(), GpuError> {
        let size = self.placeholder_size;
        let handle = self.ensure_size(device, size, size)?;
        placeholder_pattern(size, seconds, &mut self.scratch);
        if let Some(texture) = &self.texture {
            device.write_texture(texture, &self.scratch, handle.width, handle.height);
        }
        Ok(())
    }

    /// Drops the GPU object. The generation counter survives, so the next
    /// allocation gets a fresh generation.
    pub fn release(&mut self) {
        if self.texture.take().is_some() {
            debug!("TextureStage: released texture");
        }
        self.handle = None;
        self.showing_video = false;
    }

    fn ensure_size(&mut self, device: &mut D, width: u32, height: u32) -> Result<TextureHandle, GpuError> {
        if let (Some(handle), Some(_)) = (self.handle, &self.texture) {
            if handle.width == width && handle.height == height {
                return Ok(handle);
            }
        }

        // Free the old object before asking for a new one
        self.texture = None;
        self.handle = None;

        let texture = device.create_texture(width, height)?;
        self.generations += 1;
        let handle = TextureHandle {
            width,
            height,
            format: TextureFormat::Rgba8,
            generation: self.generations,
        };
        info!(
            "TextureStage: allocated {}x{} texture (generation {})",
            width, height, handle.generation
        );
        self.texture = Some(texture);
        self.handle = Some(handle);
        Ok(handle)
    }
}
