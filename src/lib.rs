//! # Media Receiver
//!
//! Receive a network media stream (video, audio and metadata frames) and turn
//! it into a presentable surface plus a continuous audio stream for a
//! real-time device callback.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        MediaModule (module)                              │
//! │   capture_stream / release_stream / set_volume / get_volume / update     │
//! └───────────────┬──────────────────────────────────────────────────────────┘
//!                 │ one StreamController per handle (session::controller)
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  ACQUISITION THREAD (session::acquisition)                               │
//! │  ┌──────────────┐    ┌────────────────────┐                              │
//! │  │  Transport   │───▶│ Receiver::capture  │ (bounded timeout)            │
//! │  │  try_create  │    └─────────┬──────────┘                              │
//! │  └──────────────┘              │ classify                                │
//! │        ┌───────────────┬───────┴───────┬────────────────┐                │
//! │        ▼               ▼               ▼                ▼                │
//! │     Video           Audio          Metadata       Error / Status         │
//! │        │        ┌──────┴───────┐       │                │                │
//! │        │        │ AudioBridge  │       │                │                │
//! │        │        │ fill (remix, │       │                │                │
//! │        │        │ ring buffer) │       │                │                │
//! │        │        └──────┬───────┘       │                │                │
//! └────────┼───────────────┼───────────────┼────────────────┼────────────────┘
//!          ▼               ▼               ▼                ▼
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │      bounded per-type queues (session::dispatch), FIFO per type  │
//!   └──────────────────────────────┬───────────────────────────────────┘
//!                                  │ drained once per tick
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  PRESENTATION CONTEXT (session::present)                                 │
//! │  decode (codec::convert) ─▶ release frame ─▶ Surface copy                │
//! │  audio / metadata / status: observe, then release                        │
//! └──────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  AUDIO DEVICE THREAD (audio::sink)                                       │
//! │  AudioSink ─▶ AudioBridge::handle_audio_filter_read                      │
//! │               prefill gate ─▶ ring buffer pop ─▶ zero-fill on underrun   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod module;
pub mod network;
pub mod session;

pub use error::{Error, Result};
pub use module::{MediaModule, StreamHandle};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Initial audio ring buffer capacity (in samples)
    pub const RING_BUFFER_CAPACITY: usize = 32 * 1024;

    /// Upper bound on a single capture call
    pub const CAPTURE_TIMEOUT_MS: u64 = 5000;

    /// Wait between attempts while a source is unavailable
    pub const RECONNECT_BACKOFF_MS: u64 = 100;

    /// Device quanta buffered before audio playback (re)starts
    pub const MIN_BUFFER_AHEAD_FRAMES: usize = 4;

    /// Slots per frame type between the acquisition thread and presentation
    pub const DISPATCH_QUEUE_CAPACITY: usize = 64;
}
