//! Frame hand-off between the external decoder and the render loop.
//!
//! The decoder pushes from its own thread; the render loop takes the newest
//! frame once per tick. There is no queue: a frame that is overwritten before
//! the next tick is simply dropped.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use log::{debug, warn};

use crate::error::{PlayerError, PlayerResult};

/// Pixel layout of an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA (4 bytes per pixel).
    Rgba8,
    /// 8-bit BGRA, as most hardware decoders emit it.
    Bgra8,
    /// 8-bit RGB (3 bytes per pixel, no alpha).
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// Byte offsets of the red, green and blue channels within one pixel.
    pub fn rgb_offsets(&self) -> [usize; 3] {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => [0, 1, 2],
            PixelFormat::Bgra8 => [2, 1, 0],
        }
    }

    pub fn alpha_offset(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(3),
            PixelFormat::Rgb8 => None,
        }
    }
}

/// A decoded video frame, owned by the core after `push_frame` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Left eye in the first half of the columns, right eye in the rest.
    /// A mono frame (`false`) feeds its full width to both eyes.
    pub side_by_side: bool,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            side_by_side: true,
        }
    }

    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
        (width as usize) * (height as usize) * format.bytes_per_pixel()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

/// Converts a packed buffer of `format` pixels into tightly packed RGBA8.
/// RGBA input is borrowed as is.
pub fn to_rgba8(data: &[u8], format: PixelFormat) -> Cow<'_, [u8]> {
    match format {
        PixelFormat::Rgba8 => Cow::Borrowed(data),
        PixelFormat::Bgra8 => Cow::Owned(
            data.chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0], px[3]])
                .collect(),
        ),
        PixelFormat::Rgb8 => Cow::Owned(
            data.chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
        ),
    }
}

struct FrameSlot {
    frame: Mutex<Option<VideoFrame>>,
    available: AtomicBool,
    pushed: AtomicU64,
}

/// Latest-wins frame slot shared between the decoder and the render loop.
///
/// Cloning is cheap; every clone refers to the same slot.
#[derive(Clone)]
pub struct FrameSource {
    slot: Arc<FrameSlot>,
}

impl FrameSource {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(FrameSlot {
                frame: Mutex::new(None),
                available: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
            }),
        }
    }

    /// Copies `data` into the slot, replacing any frame not yet consumed.
    ///
    /// The caller keeps ownership of `data`; nothing here holds on to it after
    /// returning. An empty buffer is accepted and makes the next tick fall
    /// back to the placeholder.
    pub fn push_frame(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        side_by_side: bool,
    ) -> PlayerResult<()> {
        let expected = VideoFrame::expected_len(width, height, format);
        if !data.is_empty() && data.len() != expected {
            warn!(
                "FrameSource: rejecting {}x{} frame ({} bytes, expected {})",
                width,
                height,
                data.len(),
                expected
            );
            return Err(PlayerError::InvalidFrame {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }

        self.fill_slot(data.len(), width, height, format, side_by_side, |buf| {
            buf.copy_from_slice(data);
            Ok(())
        })
    }

    /// Like `push_frame`, but `fill` writes the pixels straight into the
    /// slot's buffer, which is sized to the expected length for `format`.
    ///
    /// If `fill` fails the slot is emptied, since its buffer may be partly
    /// overwritten.
    pub fn push_frame_with<F>(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        side_by_side: bool,
        fill: F,
    ) -> PlayerResult<()>
    where
        F: FnOnce(&mut [u8]) -> PlayerResult<()>,
    {
        let len = VideoFrame::expected_len(width, height, format);
        self.fill_slot(len, width, height, format, side_by_side, fill)
    }

    fn fill_slot<F>(
        &self,
        len: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
        side_by_side: bool,
        fill: F,
    ) -> PlayerResult<()>
    where
        F: FnOnce(&mut [u8]) -> PlayerResult<()>,
    {
        let mut slot = self
            .slot
            .frame
            .lock()
            .map_err(|_| PlayerError::FrameSource("frame slot poisoned".into()))?;
        // Reuse the allocation of a frame that was never consumed
        let frame = slot.get_or_insert_with(|| VideoFrame::new(Vec::new(), 0, 0, format));
        frame.data.clear();
        frame.data.resize(len, 0);
        if let Err(e) = fill(&mut frame.data) {
            *slot = None;
            self.slot.available.store(false, Ordering::Release);
            return Err(e);
        }
        frame.width = width;
        frame.height = height;
        frame.format = format;
        frame.side_by_side = side_by_side;
        self.slot.available.store(true, Ordering::Release);
        drop(slot);

        self.slot.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pushes a side-by-side RGBA frame.
    pub fn push_rgba(&self, data: &[u8], width: u32, height: u32) -> PlayerResult<()> {
        self.push_frame(data, width, height, PixelFormat::Rgba8, true)
    }

    /// Cheap check used before taking the lock.
    pub fn is_available(&self) -> bool {
        self.slot.available.load(Ordering::Acquire)
    }

    /// Takes the newest frame and clears the availability flag.
    ///
    /// Returns `None` when nothing was pushed since the last call.
    pub fn take_latest(&self) -> Option<VideoFrame> {
        if !self.is_available() {
            return None;
        }
        let mut slot = self.slot.frame.lock().ok()?;
        if !self.slot.available.swap(false, Ordering::AcqRel) {
            return None;
        }
        let frame = slot.take();
        if let Some(ref f) = frame {
            debug!("FrameSource: took {}x{} frame", f.width, f.height);
        }
        frame
    }

    /// Total number of frames pushed, including ones overwritten unseen.
    pub fn frames_pushed(&self) -> u64 {
        self.slot.pushed.load(Ordering::Relaxed)
    }
}

impl Default for FrameSource {
    fn default() -> Self {
        Self::new()
    }
}
