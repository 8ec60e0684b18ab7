//! Error types for the media receiver

use thiserror::Error;

use crate::module::StreamHandle;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Buffer underrun: requested {requested} samples, {available} available")]
    BufferUnderrun { requested: usize, available: usize },

    #[error("Invalid buffer capacity {requested}: {live} samples are live")]
    InvalidCapacity { requested: usize, live: usize },

    #[error("Malformed audio frame: {0}")]
    MalformedFrame(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Format converter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported pixel format: {0:#010x}")]
    UnsupportedFourCc(u32),

    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel data too short: expected {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },
}

/// Transport / receiver errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Frame {0} is not outstanding on this receiver")]
    UnknownFrame(u64),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

/// Stream lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Unknown stream handle {0} (never issued or already released)")]
    UnknownHandle(StreamHandle),

    #[error("Failed to spawn acquisition thread: {0}")]
    SpawnFailed(String),

    #[error("Invalid surface size: {width}x{height}")]
    InvalidSurface { width: u32, height: u32 },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
