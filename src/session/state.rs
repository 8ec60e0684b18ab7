//! Session connection state and stream health

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::audio::bridge::BridgeStats;

/// Connection state of a receiver session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Not started, or torn down
    Unconnected,
    /// Acquisition running, nothing captured yet
    Connecting,
    /// At least one successful capture since the last fault
    Connected,
    /// The transport reported an error; cleared by the next successful capture
    Faulted,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Faulted,
            _ => SessionState::Unconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Unconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Faulted => 3,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// [`SessionState`] shared between the acquisition thread and callers
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionState::Unconnected.as_u8()))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Unconnected/any -> Connecting
    pub fn begin_connect(&self) {
        self.0.store(SessionState::Connecting.as_u8(), Ordering::Release);
    }

    /// Connecting or Faulted -> Connected. Returns true if the state changed.
    pub fn mark_connected(&self) -> bool {
        let connected = SessionState::Connected.as_u8();
        [SessionState::Connecting, SessionState::Faulted]
            .into_iter()
            .any(|from| {
                self.0
                    .compare_exchange(from.as_u8(), connected, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
    }

    /// Any -> Faulted. Returns the previous state.
    pub fn mark_faulted(&self) -> SessionState {
        SessionState::from_u8(self.0.swap(SessionState::Faulted.as_u8(), Ordering::AcqRel))
    }

    /// Any -> Unconnected
    pub fn reset(&self) {
        self.0.store(SessionState::Unconnected.as_u8(), Ordering::Release);
    }
}

impl Default for AtomicSessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters for one stream, updated from both the acquisition
/// thread and the presentation context
#[derive(Debug, Default)]
pub struct HealthCounters {
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    metadata_frames: AtomicU64,
    capture_errors: AtomicU64,
    status_changes: AtomicU64,
    dropped_frames: AtomicU64,
    last_status_at: Mutex<Option<DateTime<Utc>>>,
    last_metadata: Mutex<Option<String>>,
}

impl HealthCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_video(&self) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio(&self) {
        self.audio_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metadata(&self, metadata: String) {
        self.metadata_frames.fetch_add(1, Ordering::Relaxed);
        *self.last_metadata.lock() = Some(metadata);
    }

    /// Metadata attached to a video frame; not counted as a metadata frame
    pub fn set_last_metadata(&self, metadata: String) {
        *self.last_metadata.lock() = Some(metadata);
    }

    pub fn record_capture_error(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self) {
        self.status_changes.fetch_add(1, Ordering::Relaxed);
        *self.last_status_at.lock() = Some(Utc::now());
    }

    /// A frame released on the acquisition thread because its queue was full
    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, state: SessionState, audio: BridgeStats) -> StreamHealth {
        StreamHealth {
            state,
            video_frames: self.video_frames.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            metadata_frames: self.metadata_frames.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            last_status_at: *self.last_status_at.lock(),
            last_metadata: self.last_metadata.lock().clone(),
            audio,
        }
    }
}

/// Point-in-time view of a stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamHealth {
    pub state: SessionState,
    pub video_frames: u64,
    pub audio_frames: u64,
    pub metadata_frames: u64,
    pub capture_errors: u64,
    pub status_changes: u64,
    pub dropped_frames: u64,
    pub last_status_at: Option<DateTime<Utc>>,
    pub last_metadata: Option<String>,
    pub audio: BridgeStats,
}
