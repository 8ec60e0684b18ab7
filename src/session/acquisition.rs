//! Background acquisition loop
//!
//! One named thread per active stream. Each iteration checks for
//! cancellation, honours a pending restart, lazily (re)creates the receiver
//! and converter, then blocks in `capture` for at most the capture timeout.
//!
//! Audio is pushed into the bridge on this thread before its release
//! notification is queued; video, metadata and status events go to the
//! presentation context through the dispatch queues. Whatever happens, the
//! receiver, converter and bridge buffers are released when the loop exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::network::frame::Captured;
use crate::session::dispatch::{FramePoster, StatusEvent, Tagged};
use crate::session::receiver::ReceiverSession;

/// Flags shared between a running loop and its controller
#[derive(Debug, Default)]
pub struct LoopControl {
    cancel: AtomicBool,
    restart_requested: AtomicBool,
    alive: AtomicBool,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Ask the loop to drop and recreate its receiver and converter
    pub fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a loop thread is currently running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn arm(&self) {
        self.cancel.store(false, Ordering::SeqCst);
        self.restart_requested.store(false, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionTiming {
    /// Upper bound on a single capture call
    pub capture_timeout: Duration,
    /// Sleep between attempts while the source is unavailable
    pub retry_backoff: Duration,
}

impl Default for AcquisitionTiming {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_millis(crate::constants::CAPTURE_TIMEOUT_MS),
            retry_backoff: Duration::from_millis(crate::constants::RECONNECT_BACKOFF_MS),
        }
    }
}

/// Releases everything the loop owned, in order, however it exits
struct CleanupGuard {
    session: Arc<ReceiverSession>,
    control: Arc<LoopControl>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.session.teardown();
        self.control.alive.store(false, Ordering::SeqCst);
        tracing::debug!("Acquisition for '{}' cleaned up", self.session.source_name());
    }
}

pub struct AcquisitionLoop {
    session: Arc<ReceiverSession>,
    poster: FramePoster,
    control: Arc<LoopControl>,
    timing: AcquisitionTiming,
}

impl AcquisitionLoop {
    pub fn new(
        session: Arc<ReceiverSession>,
        poster: FramePoster,
        control: Arc<LoopControl>,
        timing: AcquisitionTiming,
    ) -> Self {
        Self {
            session,
            poster,
            control,
            timing,
        }
    }

    /// Start the loop on its own thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        self.control.arm();
        let control = self.control.clone();
        let name = format!("acquire-{}", self.session.source_name());

        let result = thread::Builder::new().name(name).spawn(move || {
            let _guard = CleanupGuard {
                session: self.session.clone(),
                control: self.control.clone(),
            };

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::error!(
                    "Acquisition for '{}' stopped by a fault: {}",
                    self.session.source_name(),
                    reason
                );
            }
        });

        if result.is_err() {
            control.alive.store(false, Ordering::SeqCst);
        }
        result
    }

    fn run(&self) {
        let source = self.session.source_name().to_string();
        tracing::info!("Acquisition started for '{}'", source);
        let mut in_outage = false;

        while !self.control.is_cancelled() {
            if self.control.restart_requested.swap(false, Ordering::SeqCst) {
                tracing::info!("Restarting receiver for '{}'", source);
                self.session.release_internal_objects();
            }

            let Some((receiver, generation)) = self.session.prepare() else {
                if !in_outage {
                    in_outage = true;
                    tracing::debug!("Source '{}' not available, retrying", source);
                    self.poster
                        .post_status(StatusEvent::SourceUnavailable(source.clone()));
                }
                thread::sleep(self.timing.retry_backoff);
                continue;
            };
            in_outage = false;

            let captured = receiver.capture(self.timing.capture_timeout);
            if !matches!(captured, Captured::None | Captured::Error)
                && self.session.state().mark_connected()
            {
                self.poster.post_status(StatusEvent::Connected);
            }
            self.handle(captured, generation);
        }

        tracing::info!("Acquisition stopped for '{}'", source);
    }

    fn handle(&self, captured: Captured, generation: u64) {
        let session = &self.session;
        match captured {
            Captured::None => {}
            Captured::Video(frame) => {
                if let Err(rejected) = self.poster.post_video(Tagged::new(generation, frame)) {
                    session.health().record_dropped();
                    session.free_video(rejected.generation, rejected.frame);
                }
            }
            Captured::Audio(frame) => {
                session.bridge().fill_audio_buffer(&frame);
                if let Err(rejected) = self.poster.post_audio(Tagged::new(generation, frame)) {
                    session.health().record_dropped();
                    session.free_audio(rejected.generation, rejected.frame);
                }
            }
            Captured::Metadata(frame) => {
                if let Err(rejected) = self.poster.post_metadata(Tagged::new(generation, frame)) {
                    session.health().record_dropped();
                    session.free_metadata(rejected.generation, rejected.frame);
                }
            }
            Captured::Error => {
                session.health().record_capture_error();
                session.state().mark_faulted();
                self.poster.post_status(StatusEvent::StreamLost);
            }
            Captured::StatusChange => {
                self.poster.post_status(StatusEvent::Changed);
            }
        }
    }
}
