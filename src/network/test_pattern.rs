//! Built-in synthetic transport
//!
//! Produces UYVY colour bars and a planar sine tone on a real-time schedule,
//! and keeps a ledger of every frame it hands out so callers can check the
//! release contract.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::TransportError;
use crate::network::frame::{
    AudioFrame, Captured, FourCc, FrameId, MetadataFrame, ScanFormat, VideoFrame,
};
use crate::network::transport::{Receiver, Transport};

/// Name under which the pattern is advertised by default
pub const TEST_PATTERN_SOURCE: &str = "Test Pattern";

/// Colour bars in RGB, left to right
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Shape of the generated streams
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate_n: u32,
    pub frame_rate_d: u32,
    /// Emit UYVA (with an alpha plane) instead of UYVY
    pub alpha: bool,
    pub sample_rate: u32,
    pub channels: usize,
    /// Samples per channel in each audio frame
    pub samples_per_frame: usize,
    pub tone_hz: f32,
    pub video: bool,
    pub audio: bool,
    /// Emit a metadata frame every this many video frames
    pub metadata_every: Option<u64>,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            frame_rate_n: 30000,
            frame_rate_d: 1001,
            alpha: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS as usize,
            samples_per_frame: 800,
            tone_hz: 440.0,
            video: true,
            audio: true,
            metadata_every: Some(300),
        }
    }
}

/// Counters shared by every receiver a transport opens
#[derive(Debug, Default)]
pub struct FrameLedger {
    captured: AtomicU64,
    released: AtomicU64,
    reclaimed: AtomicU64,
    receivers_opened: AtomicU64,
    receivers_closed: AtomicU64,
}

impl FrameLedger {
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames that were still outstanding when their receiver was dropped
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::SeqCst)
    }

    pub fn receivers_opened(&self) -> u64 {
        self.receivers_opened.load(Ordering::SeqCst)
    }

    pub fn receivers_closed(&self) -> u64 {
        self.receivers_closed.load(Ordering::SeqCst)
    }
}

/// Transport that serves a synthetic pattern under a fixed set of names
pub struct TestPatternTransport {
    sources: Vec<String>,
    config: TestPatternConfig,
    ledger: Arc<FrameLedger>,
}

impl TestPatternTransport {
    pub fn new(config: TestPatternConfig) -> Self {
        Self::with_sources(config, [TEST_PATTERN_SOURCE])
    }

    pub fn with_sources<I, S>(config: TestPatternConfig, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            config,
            ledger: Arc::new(FrameLedger::default()),
        }
    }

    pub fn ledger(&self) -> Arc<FrameLedger> {
        self.ledger.clone()
    }

    /// Names this transport will connect to
    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

impl Default for TestPatternTransport {
    fn default() -> Self {
        Self::new(TestPatternConfig::default())
    }
}

impl Transport for TestPatternTransport {
    fn try_create(&self, source_name: &str) -> Option<Arc<dyn Receiver>> {
        // Accept both the bare name and the "HOST (name)" form
        let matches = self.sources.iter().any(|s| {
            s == source_name || source_name.ends_with(&format!("({})", s))
        });
        if !matches {
            return None;
        }

        self.ledger.receivers_opened.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(TestPatternReceiver::new(
            self.config.clone(),
            self.ledger.clone(),
        )))
    }
}

struct Schedule {
    next_video: Instant,
    next_audio: Instant,
    video_index: u64,
    phase: f32,
    announced: bool,
}

enum Due {
    Video,
    Audio,
}

/// Receiver that generates the pattern
pub struct TestPatternReceiver {
    config: TestPatternConfig,
    schedule: Mutex<Schedule>,
    outstanding: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    ledger: Arc<FrameLedger>,
    picture: Bytes,
    started: Instant,
}

impl TestPatternReceiver {
    fn new(config: TestPatternConfig, ledger: Arc<FrameLedger>) -> Self {
        let now = Instant::now();
        let picture = Bytes::from(color_bars(config.width, config.height, config.alpha));
        Self {
            config,
            schedule: Mutex::new(Schedule {
                next_video: now,
                next_audio: now,
                video_index: 0,
                phase: 0.0,
                announced: false,
            }),
            outstanding: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            ledger,
            picture,
            started: now,
        }
    }

    fn video_period(&self) -> Duration {
        let n = self.config.frame_rate_n.max(1) as f64;
        let d = self.config.frame_rate_d.max(1) as f64;
        Duration::from_secs_f64(d / n)
    }

    fn audio_period(&self) -> Duration {
        Duration::from_secs_f64(
            self.config.samples_per_frame as f64 / self.config.sample_rate.max(1) as f64,
        )
    }

    fn issue_id(&self) -> FrameId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.outstanding.lock().insert(id);
        self.ledger.captured.fetch_add(1, Ordering::SeqCst);
        FrameId(id)
    }

    fn release(&self, id: FrameId) -> Result<(), TransportError> {
        if self.outstanding.lock().remove(&id.0) {
            self.ledger.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(TransportError::UnknownFrame(id.0))
        }
    }

    fn timestamp(&self) -> i64 {
        // 100 ns units, like most broadcast transports
        (self.started.elapsed().as_nanos() / 100) as i64
    }

    fn make_video(&self, index: u64) -> VideoFrame {
        let timestamp = self.timestamp();
        VideoFrame {
            id: self.issue_id(),
            width: self.config.width,
            height: self.config.height,
            fourcc: if self.config.alpha { FourCc::Uyva } else { FourCc::Uyvy },
            frame_rate_n: self.config.frame_rate_n,
            frame_rate_d: self.config.frame_rate_d,
            aspect_ratio: self.config.width as f32 / self.config.height.max(1) as f32,
            scan_format: ScanFormat::Progressive,
            timecode: timestamp,
            data: self.picture.clone(),
            line_stride: self.config.width as usize * 2,
            metadata: Some(format!("<frame index=\"{}\"/>", index)),
            timestamp,
        }
    }

    fn make_audio(&self, phase: &mut f32) -> AudioFrame {
        let samples = self.config.samples_per_frame;
        let channels = self.config.channels;
        let step = std::f32::consts::TAU * self.config.tone_hz / self.config.sample_rate.max(1) as f32;

        let mut data = vec![0.0f32; samples * channels];
        let start = *phase;
        for ch in 0..channels {
            let mut p = start;
            for sample in &mut data[ch * samples..(ch + 1) * samples] {
                *sample = p.sin() * 0.25;
                p = (p + step) % std::f32::consts::TAU;
            }
            *phase = p;
        }

        let timestamp = self.timestamp();
        AudioFrame {
            id: self.issue_id(),
            sample_rate: self.config.sample_rate,
            channels,
            samples,
            timecode: timestamp,
            data,
            channel_stride_in_bytes: samples * std::mem::size_of::<f32>(),
            metadata: None,
            timestamp,
        }
    }

    fn make_metadata(&self, index: u64) -> MetadataFrame {
        let data = format!("<pattern frames=\"{}\"/>", index);
        MetadataFrame {
            id: self.issue_id(),
            length: data.len(),
            timecode: self.timestamp(),
            data,
        }
    }

    /// Number of frames handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

impl Receiver for TestPatternReceiver {
    fn capture(&self, timeout: Duration) -> Captured {
        let deadline = Instant::now() + timeout;

        let (due, at) = {
            let mut schedule = self.schedule.lock();
            if !schedule.announced {
                schedule.announced = true;
                return Captured::StatusChange;
            }
            match (self.config.video, self.config.audio) {
                (true, true) if schedule.next_audio <= schedule.next_video => {
                    (Due::Audio, schedule.next_audio)
                }
                (true, _) => (Due::Video, schedule.next_video),
                (false, true) => (Due::Audio, schedule.next_audio),
                (false, false) => {
                    drop(schedule);
                    thread::sleep(timeout);
                    return Captured::None;
                }
            }
        };

        if at > deadline {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            return Captured::None;
        }
        let wait = at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }

        let mut schedule = self.schedule.lock();
        match due {
            Due::Audio => {
                schedule.next_audio += self.audio_period();
                let mut phase = schedule.phase;
                let frame = self.make_audio(&mut phase);
                schedule.phase = phase;
                Captured::Audio(frame)
            }
            Due::Video => {
                schedule.next_video += self.video_period();
                schedule.video_index += 1;
                let index = schedule.video_index;
                if let Some(every) = self.config.metadata_every {
                    if every > 0 && index % every == 0 {
                        return Captured::Metadata(self.make_metadata(index));
                    }
                }
                Captured::Video(self.make_video(index))
            }
        }
    }

    fn free_video(&self, frame: VideoFrame) -> Result<(), TransportError> {
        self.release(frame.id)
    }

    fn free_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.release(frame.id)
    }

    fn free_metadata(&self, frame: MetadataFrame) -> Result<(), TransportError> {
        self.release(frame.id)
    }
}

impl Drop for TestPatternReceiver {
    fn drop(&mut self) {
        let leftover = self.outstanding.get_mut().drain().count() as u64;
        self.ledger.reclaimed.fetch_add(leftover, Ordering::SeqCst);
        self.ledger.receivers_closed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Test pattern receiver closed, {} frames reclaimed", leftover);
    }
}

/// Packed UYVY colour bars, followed by an opaque alpha plane when `alpha`
fn color_bars(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let row = width * 2;
    let mut data = vec![0u8; row * height + if alpha { width * height } else { 0 }];

    let yuv: Vec<[u8; 3]> = BARS.iter().map(|&rgb| rgb_to_yuv(rgb)).collect();
    for y in 0..height {
        let line = &mut data[y * row..(y + 1) * row];
        for (pair, chunk) in line.chunks_exact_mut(4).enumerate() {
            let bar = (pair * 2 * BARS.len() / width.max(1)).min(BARS.len() - 1);
            let [luma, u, v] = yuv[bar];
            chunk.copy_from_slice(&[u, luma, v, luma]);
        }
    }
    if alpha {
        data[row * height..].fill(255);
    }
    data
}

/// BT.601 studio-swing RGB to YUV
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 16.0 + 0.257 * r + 0.504 * g + 0.098 * b;
    let u = 128.0 - 0.148 * r - 0.291 * g + 0.439 * b;
    let v = 128.0 + 0.439 * r - 0.368 * g - 0.071 * b;
    [
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> TestPatternConfig {
        TestPatternConfig {
            width: 64,
            height: 16,
            frame_rate_n: 1000,
            frame_rate_d: 1,
            samples_per_frame: 48,
            metadata_every: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_source_is_unavailable() {
        let transport = TestPatternTransport::new(fast_config());
        assert!(transport.try_create("Nope").is_none());
        assert!(transport.try_create(TEST_PATTERN_SOURCE).is_some());
        assert!(transport.try_create("DESKTOP-1 (Test Pattern)").is_some());
        assert_eq!(transport.ledger().receivers_opened(), 2);
    }

    #[test]
    fn test_first_capture_announces_connection() {
        let transport = TestPatternTransport::new(fast_config());
        let receiver = transport.try_create(TEST_PATTERN_SOURCE).unwrap();
        assert!(matches!(
            receiver.capture(Duration::from_millis(10)),
            Captured::StatusChange
        ));
    }

    #[test]
    fn test_frames_released_once() {
        let transport = TestPatternTransport::new(fast_config());
        let ledger = transport.ledger();
        let receiver = transport.try_create(TEST_PATTERN_SOURCE).unwrap();

        let mut video = None;
        let mut audio = None;
        for _ in 0..20 {
            match receiver.capture(Duration::from_millis(50)) {
                Captured::Video(f) if video.is_none() => video = Some(f),
                Captured::Audio(f) if audio.is_none() => audio = Some(f),
                Captured::Video(f) => receiver.free_video(f).unwrap(),
                Captured::Audio(f) => receiver.free_audio(f).unwrap(),
                _ => {}
            }
        }

        let video = video.expect("video frame");
        let audio = audio.expect("audio frame");
        assert_eq!(video.fourcc, FourCc::Uyvy);
        assert_eq!(video.data.len(), 64 * 2 * 16);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.data.len(), 96);

        // A frame rebuilt with an already released id is rejected
        let stale = VideoFrame {
            data: video.data.clone(),
            metadata: video.metadata.clone(),
            ..video
        };
        let stale_id = stale.id.0;
        receiver.free_video(video).unwrap();
        assert_eq!(
            receiver.free_video(stale),
            Err(TransportError::UnknownFrame(stale_id))
        );
        receiver.free_audio(audio).unwrap();

        drop(receiver);
        assert_eq!(ledger.captured(), ledger.released() + ledger.reclaimed());
        assert_eq!(ledger.receivers_closed(), 1);
    }

    #[test]
    fn test_color_bars_layout() {
        let data = color_bars(16, 2, true);
        assert_eq!(data.len(), 16 * 2 * 2 + 16 * 2);
        // First pair is white: U = V = 128
        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert!(data[16 * 2 * 2..].iter().all(|&a| a == 255));
    }
}
