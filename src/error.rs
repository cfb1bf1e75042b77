//! Error types for the player core.
//!
//! Most failures in the render path degrade silently (placeholder frame,
//! flat fallback). These types cover the places where a caller needs to know:
//! GPU resource creation, malformed frames and config loading.

use crate::frame::PixelFormat;

pub type PlayerResult<T> = Result<T, PlayerError>;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("surface error: {0}")]
    Surface(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("shader error: {0}")]
    Shader(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("gpu error: {0}")]
    Gpu(#[from] GpuError),

    #[error("invalid frame: {width}x{height} {format:?} needs {expected} bytes, got {actual}")]
    InvalidFrame {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("frame source error: {0}")]
    FrameSource(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
