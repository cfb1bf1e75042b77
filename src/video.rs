//! JNI entry points the Java side of the activity calls into.
//!
//! These run on Java threads, so they only touch the thread-safe input
//! handles. The render loop picks the data up on its next tick.

use jni::objects::{JByteArray, JObject, JString};
use jni::sys::{jboolean, jbyte, jfloat, jint, JNI_TRUE};
use jni::JNIEnv;
use lazy_static::lazy_static;
use log::{error, info, warn};

use crate::app::PlayerInputs;
use crate::error::PlayerError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::settings::{EffectSettings, EyeSettings};

lazy_static! {
    static ref INPUTS: PlayerInputs = PlayerInputs::new();
}

/// Handles shared between the JNI exports and the player.
pub fn inputs() -> PlayerInputs {
    INPUTS.clone()
}

fn pixel_format(code: jint) -> Option<PixelFormat> {
    match code {
        0 => Some(PixelFormat::Rgba8),
        1 => Some(PixelFormat::Bgra8),
        2 => Some(PixelFormat::Rgb8),
        _ => None,
    }
}

fn eye_settings(
    enabled: jboolean,
    contrast: jfloat,
    red_tint: jfloat,
    green_tint: jfloat,
    fog_intensity: jfloat,
    directional: jfloat,
) -> EyeSettings {
    EyeSettings {
        enabled: enabled == JNI_TRUE,
        contrast,
        red_tint,
        green_tint,
        fog_intensity,
        directional,
    }
}

/// `void nativePushFrame(byte[] data, int width, int height, int format, boolean sideBySide)`
#[no_mangle]
pub extern "C" fn Java_com_stereoplayer_StereoPlayerActivity_nativePushFrame(
    env: JNIEnv,
    _this: JObject,
    data: JByteArray,
    width: jint,
    height: jint,
    format: jint,
    side_by_side: jboolean,
) {
    let Some(format) = pixel_format(format) else {
        warn!("JNI: unknown pixel format code {}", format);
        return;
    };
    if width < 0 || height < 0 {
        warn!("JNI: negative frame size {}x{}", width, height);
        return;
    }
    let (width, height) = (width as u32, height as u32);
    let result = match env.get_array_length(&data) {
        Ok(0) => INPUTS
            .frames
            .push_frame(&[], width, height, format, side_by_side == JNI_TRUE),
        Ok(len) => {
            let expected = VideoFrame::expected_len(width, height, format);
            if len as usize != expected {
                warn!(
                    "JNI: {}x{} frame has {} bytes, expected {}",
                    width, height, len, expected
                );
                return;
            }
            // Copied straight into the slot; the Java array may be reused
            // once we return
            INPUTS
                .frames
                .push_frame_with(width, height, format, side_by_side == JNI_TRUE, |buf| {
                    env.get_byte_array_region(&data, 0, bytemuck::cast_slice_mut::<u8, jbyte>(buf))
                        .map_err(|e| PlayerError::FrameSource(format!("{:?}", e)))
                })
        }
        Err(e) => {
            error!("JNI: failed to read frame length: {:?}", e);
            return;
        }
    };
    if let Err(e) = result {
        warn!("JNI: {}", e);
    }
}

#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn Java_com_stereoplayer_StereoPlayerActivity_nativeSetEffectSettings(
    _env: JNIEnv,
    _this: JObject,
    left_enabled: jboolean,
    left_contrast: jfloat,
    left_red_tint: jfloat,
    left_green_tint: jfloat,
    left_fog_intensity: jfloat,
    left_directional: jfloat,
    right_enabled: jboolean,
    right_contrast: jfloat,
    right_red_tint: jfloat,
    right_green_tint: jfloat,
    right_fog_intensity: jfloat,
    right_directional: jfloat,
) {
    let settings = EffectSettings {
        left: eye_settings(
            left_enabled,
            left_contrast,
            left_red_tint,
            left_green_tint,
            left_fog_intensity,
            left_directional,
        ),
        right: eye_settings(
            right_enabled,
            right_contrast,
            right_red_tint,
            right_green_tint,
            right_fog_intensity,
            right_directional,
        ),
    };
    INPUTS.settings.set(settings);
    info!("JNI: effect settings updated");
}

#[no_mangle]
pub extern "C" fn Java_com_stereoplayer_StereoPlayerActivity_nativeSetVideoUri(
    mut env: JNIEnv,
    _this: JObject,
    uri: JString,
) {
    match env.get_string(&uri) {
        Ok(uri) => INPUTS.set_video_uri(String::from(uri)),
        Err(e) => error!("JNI: could not read video uri: {:?}", e),
    }
}
