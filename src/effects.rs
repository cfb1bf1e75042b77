//! Per-eye effect processing.
//!
//! A side-by-side frame is split into its two halves; each half runs through
//! contrast, tint, fog and directional stretch using that eye's settings, and
//! the results are written back into a composite of the same size.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgba, Rgba32FImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::frame::{PixelFormat, VideoFrame};
use crate::settings::{EffectSettings, Eye, EyeSettings};

/// Tint strength per unit of `red_tint` / `green_tint`.
const TINT_SCALE: f32 = 0.3;
/// Gaussian sigma for the fog blur; matches a 15x15 kernel.
const FOG_SIGMA: f32 = 2.6;

/// Output of the processor: same dimensions and format as the input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoComposite {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl StereoComposite {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    /// RGBA value at a pixel, regardless of the stored channel order.
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * bpp;
        let [r, g, b] = self.format.rgb_offsets();
        let a = self.format.alpha_offset().map(|o| self.data[i + o]).unwrap_or(255);
        Some([self.data[i + r], self.data[i + g], self.data[i + b], a])
    }
}

/// How the two eye views are laid out in the incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoLayout {
    /// Left eye in the first half of the columns, right eye in the rest.
    #[default]
    SideBySide,
    /// The left half feeds both eyes.
    MirroredLeft,
}

/// Column span of one eye, in source and destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EyeSpan {
    src_x: u32,
    src_width: u32,
    dst_x: u32,
    dst_width: u32,
}

fn eye_span(frame: &VideoFrame, layout: StereoLayout, eye: Eye) -> EyeSpan {
    let half = frame.width / 2;
    let (dst_x, dst_width) = match eye {
        Eye::Left => (0, half),
        Eye::Right => (half, frame.width - half),
    };
    let (src_x, src_width) = if !frame.side_by_side {
        (0, frame.width)
    } else {
        match layout {
            StereoLayout::SideBySide => (dst_x, dst_width),
            StereoLayout::MirroredLeft => (0, half),
        }
    };
    EyeSpan {
        src_x,
        src_width,
        dst_x,
        dst_width,
    }
}

/// Turns a frame and a settings snapshot into a stereo composite.
pub trait EffectProcessor: Send {
    fn process(&self, frame: &VideoFrame, settings: &EffectSettings) -> StereoComposite;

    fn name(&self) -> &'static str;
}

/// Full per-eye pixel pipeline.
#[derive(Debug, Clone, Default)]
pub struct PixelPipeline {
    layout: StereoLayout,
}

impl PixelPipeline {
    pub fn new(layout: StereoLayout) -> Self {
        Self { layout }
    }
}

impl EffectProcessor for PixelPipeline {
    fn process(&self, frame: &VideoFrame, settings: &EffectSettings) -> StereoComposite {
        let mut out = empty_composite(frame);
        if frame.is_empty() {
            return out;
        }

        for eye in Eye::BOTH {
            let span = eye_span(frame, self.layout, eye);
            let eye_settings = settings.eye(eye);
            if span.src_width == 0 || span.dst_width == 0 {
                continue;
            }

            if eye_settings.is_identity() && span.src_width == span.dst_width {
                copy_columns(frame, &mut out.data, span);
                continue;
            }

            let mut image = extract(frame, span);
            if image.width() != span.dst_width {
                image = imageops::resize(&image, span.dst_width, frame.height, FilterType::Triangle);
            }
            if eye_settings.enabled {
                image = apply_effects(image, eye_settings);
            }
            write_back(&image, &mut out.data, frame.width, frame.format, span.dst_x);
        }
        out
    }

    fn name(&self) -> &'static str {
        "pixel-pipeline"
    }
}

/// Copies each eye through unchanged; only the stereo layout is applied.
#[derive(Debug, Clone, Default)]
pub struct PassThrough {
    layout: StereoLayout,
}

impl PassThrough {
    pub fn new(layout: StereoLayout) -> Self {
        Self { layout }
    }
}

impl EffectProcessor for PassThrough {
    fn process(&self, frame: &VideoFrame, _settings: &EffectSettings) -> StereoComposite {
        let mut out = empty_composite(frame);
        if frame.is_empty() {
            return out;
        }
        for eye in Eye::BOTH {
            let span = eye_span(frame, self.layout, eye);
            if span.src_width == 0 || span.dst_width == 0 {
                continue;
            }
            if span.src_width == span.dst_width {
                copy_columns(frame, &mut out.data, span);
            } else {
                let image = extract(frame, span);
                let resized = imageops::resize(&image, span.dst_width, frame.height, FilterType::Triangle);
                write_back(&resized, &mut out.data, frame.width, frame.format, span.dst_x);
            }
        }
        out
    }

    fn name(&self) -> &'static str {
        "pass-through"
    }
}

fn empty_composite(frame: &VideoFrame) -> StereoComposite {
    let len = if frame.is_empty() {
        0
    } else {
        VideoFrame::expected_len(frame.width, frame.height, frame.format)
    };
    StereoComposite {
        data: vec![0u8; len],
        width: frame.width,
        height: frame.height,
        format: frame.format,
    }
}

/// Runs the enabled stages in order: contrast, tint, fog, stretch.
pub fn apply_effects(mut image: Rgba32FImage, settings: &EyeSettings) -> Rgba32FImage {
    if image.width() == 0 || image.height() == 0 {
        return image;
    }

    if settings.contrast != 1.0 {
        apply_contrast(&mut image, settings.contrast);
    }
    if settings.red_tint != 0.0 || settings.green_tint != 0.0 {
        apply_tint(&mut image, settings.red_tint, settings.green_tint);
    }
    if settings.fog_intensity > 0.0 {
        apply_fog(&mut image, settings.fog_intensity);
    }
    let stretch = settings.stretch_pixels();
    if stretch != 0 {
        image = apply_stretch(&image, stretch);
    }
    image
}

fn apply_contrast(image: &mut Rgba32FImage, contrast: f32) {
    for px in image.pixels_mut() {
        for c in &mut px.0[..3] {
            *c = (*c * contrast).clamp(0.0, 1.0);
        }
    }
}

fn apply_tint(image: &mut Rgba32FImage, red_tint: f32, green_tint: f32) {
    let red = red_tint * TINT_SCALE;
    let green = green_tint * TINT_SCALE;
    for px in image.pixels_mut() {
        px.0[0] = (px.0[0] + red).clamp(0.0, 1.0);
        px.0[1] = (px.0[1] + green).clamp(0.0, 1.0);
        px.0[2] = px.0[2].clamp(0.0, 1.0);
    }
}

fn apply_fog(image: &mut Rgba32FImage, intensity: f32) {
    let luma: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            Luma([0.299 * r + 0.587 * g + 0.114 * b])
        });
    let fog = imageops::blur(&luma, FOG_SIGMA);

    let keep = 1.0 - intensity;
    for (x, y, px) in image.enumerate_pixels_mut() {
        let f = fog.get_pixel(x, y).0[0];
        for c in &mut px.0[..3] {
            *c = (keep * *c + intensity * f).clamp(0.0, 1.0);
        }
    }
}

/// Stretches by `|pixels|` columns and crops back to the original width.
/// Positive keeps the left edge anchored (content moves right); negative
/// keeps the right edge anchored (content moves left).
///
/// Only the visible window of the stretched row is sampled, with linear
/// interpolation, so the cost stays `width * height` for any amount.
fn apply_stretch(image: &Rgba32FImage, pixels: i32) -> Rgba32FImage {
    let width = image.width();
    let extra = pixels.unsigned_abs() as f64;
    let scale = width as f64 / (width as f64 + extra);
    let x0 = if pixels > 0 { 0.0 } else { extra };
    let last = (width - 1) as f64;

    ImageBuffer::from_fn(width, image.height(), |x, y| {
        let src = ((x as f64 + x0 + 0.5) * scale - 0.5).clamp(0.0, last);
        let left = src.floor() as u32;
        let right = (left + 1).min(width - 1);
        let t = (src - left as f64) as f32;
        let a = image.get_pixel(left, y).0;
        let b = image.get_pixel(right, y).0;
        Rgba(std::array::from_fn(|c| a[c] + (b[c] - a[c]) * t))
    })
}

fn extract(frame: &VideoFrame, span: EyeSpan) -> Rgba32FImage {
    let bpp = frame.format.bytes_per_pixel();
    let [r, g, b] = frame.format.rgb_offsets();
    let alpha = frame.format.alpha_offset();
    let stride = frame.width as usize;

    ImageBuffer::from_fn(span.src_width, frame.height, |x, y| {
        let i = ((y as usize) * stride + (span.src_x + x) as usize) * bpp;
        let px = &frame.data[i..i + bpp];
        Rgba([
            px[r] as f32 / 255.0,
            px[g] as f32 / 255.0,
            px[b] as f32 / 255.0,
            alpha.map(|a| px[a] as f32 / 255.0).unwrap_or(1.0),
        ])
    })
}

fn write_back(image: &Rgba32FImage, out: &mut [u8], frame_width: u32, format: PixelFormat, dst_x: u32) {
    let bpp = format.bytes_per_pixel();
    let [r, g, b] = format.rgb_offsets();
    let alpha = format.alpha_offset();
    let stride = frame_width as usize;

    for (x, y, px) in image.enumerate_pixels() {
        let i = ((y as usize) * stride + (dst_x + x) as usize) * bpp;
        out[i + r] = quantize(px.0[0]);
        out[i + g] = quantize(px.0[1]);
        out[i + b] = quantize(px.0[2]);
        if let Some(a) = alpha {
            out[i + a] = quantize(px.0[3]);
        }
    }
}

fn copy_columns(frame: &VideoFrame, out: &mut [u8], span: EyeSpan) {
    let bpp = frame.format.bytes_per_pixel();
    let stride = frame.width as usize * bpp;
    let row_bytes = span.dst_width as usize * bpp;
    for y in 0..frame.height as usize {
        let src = y * stride + span.src_x as usize * bpp;
        let dst = y * stride + span.dst_x as usize * bpp;
        out[dst..dst + row_bytes].copy_from_slice(&frame.data[src..src + row_bytes]);
    }
    debug!("effects: copied {} columns unchanged", span.dst_width);
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> VideoFrame {
        let data = rgba.repeat((width * height) as usize);
        VideoFrame::new(data, width, height, PixelFormat::Rgba8)
    }

    fn gradient_frame(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8, 255]);
            }
        }
        VideoFrame::new(data, width, height, PixelFormat::Rgba8)
    }

    fn left_only(eye: EyeSettings) -> EffectSettings {
        EffectSettings {
            left: eye,
            right: EyeSettings::default(),
        }
    }

    #[test]
    fn contrast_scenario_left_enabled_right_disabled() {
        let frame = VideoFrame::new(
            vec![100, 100, 100, 255, 50, 50, 50, 255],
            2,
            1,
            PixelFormat::Rgba8,
        );
        let settings = EffectSettings {
            left: EyeSettings {
                contrast: 2.0,
                ..Default::default()
            },
            right: EyeSettings {
                enabled: false,
                ..Default::default()
            },
        };

        let out = PixelPipeline::default().process(&frame, &settings);
        assert_eq!(out.rgba_at(0, 0), Some([200, 200, 200, 255]));
        assert_eq!(out.rgba_at(1, 0), Some([50, 50, 50, 255]));
    }

    #[test]
    fn default_settings_are_identity() {
        let frame = gradient_frame(33, 9);
        let out = PixelPipeline::default().process(&frame, &EffectSettings::default());
        assert_eq!(out.data, frame.data);
        assert_eq!((out.width, out.height), (33, 9));
    }

    #[test]
    fn disabled_eye_is_bit_identical() {
        let frame = gradient_frame(40, 6);
        let busy = EyeSettings {
            enabled: false,
            contrast: 3.0,
            red_tint: 1.0,
            green_tint: -1.0,
            fog_intensity: 0.8,
            directional: 1.0,
        };
        let settings = EffectSettings {
            left: busy,
            right: EyeSettings {
                contrast: 0.5,
                ..Default::default()
            },
        };
        let out = PixelPipeline::default().process(&frame, &settings);

        for y in 0..6 {
            for x in 0..20 {
                let i = ((y * 40 + x) * 4) as usize;
                assert_eq!(&out.data[i..i + 4], &frame.data[i..i + 4]);
            }
        }
        // Right half was processed
        assert_eq!(out.rgba_at(30, 3).unwrap()[0], 105);
    }

    #[test]
    fn extreme_settings_saturate_instead_of_wrapping() {
        let frame = solid_frame(8, 4, [120, 200, 30, 255]);
        let hot = EyeSettings {
            contrast: 10.0,
            red_tint: 50.0,
            green_tint: 50.0,
            ..Default::default()
        };
        let cold = EyeSettings {
            contrast: -4.0,
            red_tint: -50.0,
            fog_intensity: 7.0,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &EffectSettings { left: hot, right: cold });
        assert_eq!(out.rgba_at(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.rgba_at(7, 3), Some([0, 0, 0, 255]));
    }

    #[test]
    fn out_of_range_settings_always_quantize() {
        let frame = gradient_frame(24, 5);
        let contrasts = [f32::MIN, -3.0, 0.0, 1.0, 2.5, 1.0e6, f32::INFINITY, f32::NAN];
        let tints = [-1.0e6, -2.0, 0.0, 0.7, 40.0, f32::NAN];
        let fogs = [-5.0, 0.0, 0.5, 1.0, 9.0, f32::NAN];
        let directionals = [-1.0e9, -3.3, 0.0, 0.75, 1.0e7, f32::NAN];

        let mut runs = 0;
        for (i, &contrast) in contrasts.iter().enumerate() {
            for (j, &tint) in tints.iter().enumerate() {
                let fog = fogs[(i + j) % fogs.len()];
                let directional = directionals[(i * 3 + j) % directionals.len()];
                let eye = EyeSettings {
                    contrast,
                    red_tint: tint,
                    green_tint: -tint,
                    fog_intensity: fog,
                    directional,
                    ..Default::default()
                };
                let mirrored = EyeSettings {
                    directional: -directional,
                    ..eye
                };
                let out = PixelPipeline::default()
                    .process(&frame, &EffectSettings { left: eye, right: mirrored });
                assert_eq!(out.data.len(), frame.data.len(), "settings {eye:?}");
                // Alpha is never touched
                assert!(out.data.chunks_exact(4).all(|px| px[3] == 255), "settings {eye:?}");
                runs += 1;
            }
        }
        assert_eq!(runs, contrasts.len() * tints.len());
    }

    #[test]
    fn tint_adds_scaled_offsets() {
        let frame = solid_frame(2, 1, [100, 100, 100, 255]);
        let eye = EyeSettings {
            red_tint: 0.5,
            green_tint: -0.5,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert_eq!(out.rgba_at(0, 0), Some([138, 62, 100, 255]));
    }

    #[test]
    fn tint_respects_bgra_channel_order() {
        let frame = VideoFrame::new(vec![100, 100, 100, 255, 0, 0, 0, 255], 2, 1, PixelFormat::Bgra8);
        let eye = EyeSettings {
            red_tint: 0.5,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        // Red lives at byte 2 in BGRA
        assert_eq!(&out.data[0..4], &[100, 100, 138, 255]);
    }

    #[test]
    fn fog_pulls_colour_towards_blurred_luma() {
        let frame = solid_frame(64, 32, [255, 0, 0, 255]);
        let eye = EyeSettings {
            fog_intensity: 0.5,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        let [r, g, b, a] = out.rgba_at(16, 16).unwrap();
        assert!((r as i32 - 166).abs() <= 1, "r = {r}");
        assert!((g as i32 - 38).abs() <= 1, "g = {g}");
        assert!((b as i32 - 38).abs() <= 1, "b = {b}");
        assert_eq!(a, 255);
    }

    #[test]
    fn full_fog_turns_half_grey() {
        let frame = gradient_frame(30, 20);
        let eye = EyeSettings {
            fog_intensity: 1.0,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        for x in 0..15 {
            let [r, g, b, _] = out.rgba_at(x, 10).unwrap();
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1);
        }
    }

    fn marker_frame() -> VideoFrame {
        // 80 wide, so each half is 40; a white column at x = 20 in the left half
        let mut frame = solid_frame(80, 2, [0, 0, 0, 255]);
        for y in 0..2usize {
            let i = (y * 80 + 20) * 4;
            frame.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
        }
        frame
    }

    fn peak_column(out: &StereoComposite) -> u32 {
        (0..40).max_by_key(|&x| out.rgba_at(x, 0).unwrap()[0]).unwrap()
    }

    #[test]
    fn positive_directional_shifts_right() {
        let frame = marker_frame();
        let eye = EyeSettings {
            directional: 0.5,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert_eq!((out.width, out.height), (80, 2));
        let peak = peak_column(&out);
        assert!((24..=26).contains(&peak), "peak at {peak}");
    }

    #[test]
    fn negative_directional_shifts_left() {
        let frame = marker_frame();
        let eye = EyeSettings {
            directional: -0.5,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert_eq!((out.width, out.height), (80, 2));
        let peak = peak_column(&out);
        assert!((14..=16).contains(&peak), "peak at {peak}");
    }

    #[test]
    fn huge_directional_stays_within_the_frame() {
        let frame = marker_frame();
        let settings = EffectSettings {
            left: EyeSettings {
                directional: 10_000.0,
                ..Default::default()
            },
            right: EyeSettings {
                directional: -1.0e9,
                ..Default::default()
            },
        };
        let out = PixelPipeline::default().process(&frame, &settings);
        assert_eq!((out.width, out.height), (80, 2));
        assert_eq!(out.data.len(), frame.data.len());
        // Left edge of the left half fills its whole eye
        assert_eq!(out.rgba_at(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.rgba_at(39, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn huge_directional_magnifies_the_anchored_edge() {
        let mut frame = solid_frame(8, 1, [0, 0, 0, 255]);
        frame.data[0..4].copy_from_slice(&[250, 0, 0, 255]);
        frame.data[28..32].copy_from_slice(&[0, 0, 250, 255]);
        let eye = |directional| EyeSettings {
            directional,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(
            &frame,
            &EffectSettings {
                left: eye(5_000.0),
                right: eye(-5_000.0),
            },
        );
        for x in 0..4 {
            assert_eq!(out.rgba_at(x, 0), Some([250, 0, 0, 255]), "left column {x}");
        }
        for x in 4..8 {
            assert_eq!(out.rgba_at(x, 0), Some([0, 0, 250, 255]), "right column {x}");
        }
    }

    #[test]
    fn sub_pixel_directional_is_a_no_op() {
        let frame = marker_frame();
        let eye = EyeSettings {
            directional: 0.02,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert_eq!(out.data, frame.data);
    }

    #[test]
    fn empty_frame_gives_empty_output() {
        let frame = VideoFrame::new(Vec::new(), 0, 0, PixelFormat::Rgba8);
        let eye = EyeSettings {
            contrast: 2.0,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert!(out.is_empty());
    }

    #[test]
    fn one_column_frame_skips_the_empty_left_half() {
        let frame = solid_frame(1, 3, [10, 20, 30, 255]);
        let eye = EyeSettings {
            contrast: 2.0,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &EffectSettings { left: eye, right: eye });
        assert_eq!(out.rgba_at(0, 1), Some([20, 40, 60, 255]));
    }

    #[test]
    fn mirrored_layout_feeds_left_half_to_both_eyes() {
        let mut frame = solid_frame(4, 1, [0, 0, 0, 255]);
        frame.data[0..8].copy_from_slice(&[1, 2, 3, 255, 4, 5, 6, 255]);
        let out = PassThrough::new(StereoLayout::MirroredLeft).process(&frame, &EffectSettings::default());
        assert_eq!(out.rgba_at(2, 0), Some([1, 2, 3, 255]));
        assert_eq!(out.rgba_at(3, 0), Some([4, 5, 6, 255]));
    }

    #[test]
    fn pass_through_ignores_effects() {
        let frame = gradient_frame(16, 4);
        let eye = EyeSettings {
            contrast: 4.0,
            fog_intensity: 1.0,
            ..Default::default()
        };
        let out = PassThrough::default().process(&frame, &EffectSettings { left: eye, right: eye });
        assert_eq!(out.data, frame.data);
    }

    #[test]
    fn mono_frame_is_squeezed_into_each_eye() {
        let mut frame = solid_frame(8, 2, [200, 100, 50, 255]);
        frame.side_by_side = false;
        let out = PixelPipeline::default().process(&frame, &EffectSettings::default());
        assert_eq!((out.width, out.height), (8, 2));
        assert_eq!(out.rgba_at(1, 0), Some([200, 100, 50, 255]));
        assert_eq!(out.rgba_at(6, 1), Some([200, 100, 50, 255]));
    }

    #[test]
    fn rgb_frames_keep_their_format() {
        let frame = VideoFrame::new(vec![100, 100, 100, 50, 50, 50], 2, 1, PixelFormat::Rgb8);
        let eye = EyeSettings {
            contrast: 2.0,
            ..Default::default()
        };
        let out = PixelPipeline::default().process(&frame, &left_only(eye));
        assert_eq!(out.format, PixelFormat::Rgb8);
        assert_eq!(out.data, vec![200, 200, 200, 50, 50, 50]);
    }
}
