//! Audio bridge between the acquisition thread and the device callback
//!
//! The producer side ([`AudioBridge::fill_audio_buffer`]) runs on the
//! acquisition thread whenever an audio frame arrives, at irregular network
//! intervals. The consumer side ([`AudioBridge::handle_audio_filter_read`])
//! runs on the device's real-time thread and asks for exactly one quantum per
//! call.
//!
//! The ring buffer is the only state both sides touch and sits behind a single
//! mutex that is held just long enough to copy samples in or out. Conversion
//! happens in producer-owned scratch before the lock is taken.
//!
//! Playback is gated: after a reset, or after the buffer runs dry, the
//! consumer outputs silence until `min_buffer_ahead_frames` quanta are
//! buffered. A starved buffer therefore produces one longer gap instead of
//! many short clicks.

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::audio::buffer::RingBuffer;
use crate::audio::device::ChannelExpectation;
use crate::audio::sink::AudioSource;
use crate::codec::interleave::AudioInterleaver;
use crate::constants::{MIN_BUFFER_AHEAD_FRAMES, RING_BUFFER_CAPACITY};
use crate::network::frame::AudioFrame;

/// Source format last warned about, with the expectation it was compared to
type FormatKey = (u32, usize, ChannelExpectation);

/// State touched only by the producer
struct ProducerState {
    interleaver: AudioInterleaver,
    warned_format: Option<FormatKey>,
}

/// Bridge configuration
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Quanta that must be buffered before playback (re)starts
    pub min_buffer_ahead_frames: usize,
    /// Initial ring buffer capacity in samples
    pub ring_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            min_buffer_ahead_frames: MIN_BUFFER_AHEAD_FRAMES,
            ring_capacity: RING_BUFFER_CAPACITY,
        }
    }
}

/// Per-session audio bridge
pub struct AudioBridge {
    ring: Mutex<Option<RingBuffer<f32>>>,
    producer: Mutex<ProducerState>,
    expectation: AtomicCell<ChannelExpectation>,
    waiting_for_fill: AtomicBool,
    config: BridgeConfig,
    underruns: AtomicU64,
    frames_buffered: AtomicU64,
    malformed_frames: AtomicU64,
    format_warnings: AtomicU64,
}

impl AudioBridge {
    pub fn new(config: BridgeConfig, expectation: ChannelExpectation) -> Self {
        Self {
            ring: Mutex::new(Some(RingBuffer::new(config.ring_capacity))),
            producer: Mutex::new(ProducerState {
                interleaver: AudioInterleaver::new(),
                warned_format: None,
            }),
            expectation: AtomicCell::new(expectation),
            waiting_for_fill: AtomicBool::new(true),
            config,
            underruns: AtomicU64::new(0),
            frames_buffered: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            format_warnings: AtomicU64::new(0),
        }
    }

    pub fn expectation(&self) -> ChannelExpectation {
        self.expectation.load()
    }

    /// Adopt a new device configuration. Buffers are left alone; the next
    /// audio frame is converted to the new layout.
    pub fn set_expectation(&self, expectation: ChannelExpectation) {
        self.expectation.store(expectation);
    }

    /// Whether the consumer is currently withholding output
    pub fn is_waiting_for_fill(&self) -> bool {
        self.waiting_for_fill.load(Ordering::Acquire)
    }

    /// Samples currently buffered
    pub fn buffered(&self) -> usize {
        self.ring.lock().as_ref().map_or(0, RingBuffer::len)
    }

    /// Convert one planar frame and append it to the ring buffer.
    ///
    /// Returns false if nothing was buffered (empty or malformed frame, or
    /// the bridge has been torn down).
    pub fn fill_audio_buffer(&self, frame: &AudioFrame) -> bool {
        if !frame.has_data() {
            return false;
        }

        let expected = self.expectation.load();
        let mut producer = self.producer.lock();

        if frame.sample_rate != expected.sample_rate || frame.channels != expected.channel_count() {
            let key = (frame.sample_rate, frame.channels, expected);
            if producer.warned_format != Some(key) {
                tracing::warn!(
                    "Audio format mismatch: source {} Hz / {} ch, device {}; remixing",
                    frame.sample_rate,
                    frame.channels,
                    expected
                );
                producer.warned_format = Some(key);
                self.format_warnings.fetch_add(1, Ordering::Relaxed);
            }
        }

        let samples = match producer.interleaver.convert(frame, expected.channel_count()) {
            Ok(samples) => samples,
            Err(e) => {
                self.malformed_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Skipping audio frame {}: {}", frame.id, e);
                return false;
            }
        };

        let mut ring = self.ring.lock();
        let Some(rb) = ring.as_mut() else {
            return false;
        };
        let grows = rb.grow_count();
        rb.push_back(samples);
        if rb.grow_count() != grows {
            tracing::debug!("Audio ring buffer grown to {} samples", rb.capacity());
        }
        drop(ring);

        self.frames_buffered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Device callback: write exactly `data.len()` samples or silence.
    pub fn handle_audio_filter_read(&self, data: &mut [f32], channels: usize) {
        let length = data.len();
        if length == 0 {
            return;
        }

        if self.waiting_for_fill.load(Ordering::Acquire) {
            let buffered = self.buffered();
            if buffered < length * self.config.min_buffer_ahead_frames {
                data.fill(0.0);
                return;
            }
            self.waiting_for_fill.store(false, Ordering::Release);
        }

        let (starved, buffered) = {
            let mut ring = self.ring.lock();
            match ring.as_mut() {
                Some(rb) => {
                    let buffered = rb.len();
                    (rb.pop_front_into(data).is_err(), buffered)
                }
                None => (true, 0),
            }
        };

        if starved {
            data.fill(0.0);
            self.waiting_for_fill.store(true, Ordering::Release);
            self.underruns.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Audio underrun: device wanted {} samples ({} ch), {} buffered; refilling",
                length,
                channels,
                buffered
            );
        }
    }

    /// Drop buffered audio and re-arm the prefill gate
    pub fn reset(&self) {
        {
            let mut ring = self.ring.lock();
            match ring.as_mut() {
                Some(rb) => rb.clear(),
                None => *ring = Some(RingBuffer::new(self.config.ring_capacity)),
            }
        }
        self.producer.lock().warned_format = None;
        self.waiting_for_fill.store(true, Ordering::Release);
    }

    /// Release the ring buffer and scratch memory. The consumer keeps
    /// producing silence until [`reset`](Self::reset) is called.
    pub fn teardown(&self) {
        self.ring.lock().take();
        self.producer.lock().interleaver.release();
        self.waiting_for_fill.store(true, Ordering::Release);
    }

    pub fn is_torn_down(&self) -> bool {
        self.ring.lock().is_none()
    }

    pub fn stats(&self) -> BridgeStats {
        let (buffered, capacity, grow_events) = match self.ring.lock().as_ref() {
            Some(rb) => (rb.len(), rb.capacity(), rb.grow_count()),
            None => (0, 0, 0),
        };
        BridgeStats {
            buffered,
            capacity,
            grow_events,
            underruns: self.underruns.load(Ordering::Relaxed),
            frames_buffered: self.frames_buffered.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            format_warnings: self.format_warnings.load(Ordering::Relaxed),
            waiting_for_fill: self.is_waiting_for_fill(),
        }
    }
}

impl Default for AudioBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default(), ChannelExpectation::default())
    }
}

impl AudioSource for AudioBridge {
    fn read(&self, data: &mut [f32], channels: usize) {
        self.handle_audio_filter_read(data, channels);
    }
}

/// Audio bridge statistics
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    pub buffered: usize,
    pub capacity: usize,
    pub grow_events: usize,
    pub underruns: u64,
    pub frames_buffered: u64,
    pub malformed_frames: u64,
    /// Distinct source/device format mismatches reported
    pub format_warnings: u64,
    pub waiting_for_fill: bool,
}

impl BridgeStats {
    /// Buffered audio in milliseconds at the given layout
    pub fn buffered_ms(&self, expectation: ChannelExpectation) -> f32 {
        let per_second = expectation.sample_rate as f32 * expectation.channels as f32;
        if per_second == 0.0 {
            0.0
        } else {
            self.buffered as f32 * 1000.0 / per_second
        }
    }
}
