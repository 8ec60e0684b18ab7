//! Audio sink adapters
//!
//! A sink is whatever owns the real-time device callback. Sessions register
//! their audio bridge with it as an [`AudioSource`] on start and detach on
//! stop; the sink pulls from the attached source every device quantum.

use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::device::ChannelExpectation;

/// Producer side of a device callback
pub trait AudioSource: Send + Sync {
    /// Fill `data` (interleaved, `channels` wide) with the next samples.
    /// Called on the device thread; must not block.
    fn read(&self, data: &mut [f32], channels: usize);
}

/// Device-callback owner that a session attaches its audio to
pub trait AudioSink: Send + Sync {
    fn attach(&self, source: Arc<dyn AudioSource>);

    fn detach(&self);

    /// Output gain in [0, 1]
    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);
}

/// In-process sink: applies gain to whatever the attached source produces
pub struct SoftwareSink {
    source: RwLock<Option<Arc<dyn AudioSource>>>,
    volume: AtomicCell<f32>,
    channels: u16,
}

impl SoftwareSink {
    pub fn new(channels: u16) -> Self {
        Self {
            source: RwLock::new(None),
            volume: AtomicCell::new(1.0),
            channels,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_attached(&self) -> bool {
        self.source.read().is_some()
    }

    /// One device quantum: pull from the source, or silence if none
    pub fn render(&self, data: &mut [f32]) {
        let source = self.source.read().clone();
        match source {
            Some(source) => {
                source.read(data, self.channels as usize);
                let gain = self.volume.load();
                if gain != 1.0 {
                    data.iter_mut().for_each(|s| *s *= gain);
                }
            }
            None => data.fill(0.0),
        }
    }
}

impl Default for SoftwareSink {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_CHANNELS)
    }
}

impl AudioSink for SoftwareSink {
    fn attach(&self, source: Arc<dyn AudioSource>) {
        *self.source.write() = Some(source);
    }

    fn detach(&self) {
        *self.source.write() = None;
    }

    fn volume(&self) -> f32 {
        self.volume.load()
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0));
    }
}

/// Counters kept by a [`VirtualDevice`]
#[derive(Debug, Default)]
pub struct DeviceStats {
    callbacks: AtomicU64,
    silent_callbacks: AtomicU64,
}

impl DeviceStats {
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Callbacks whose output was entirely zero
    pub fn silent_callbacks(&self) -> u64 {
        self.silent_callbacks.load(Ordering::Relaxed)
    }
}

/// A software device clock: renders a fixed quantum on its own thread at the
/// configured sample rate, discarding the output
pub struct VirtualDevice {
    sink: Arc<SoftwareSink>,
    running: Arc<AtomicBool>,
    stats: Arc<DeviceStats>,
    thread_handle: Option<JoinHandle<()>>,
    config: ChannelExpectation,
}

impl VirtualDevice {
    /// Start a clock of `quantum` frames per callback
    pub fn start(config: ChannelExpectation, quantum: usize) -> std::io::Result<Self> {
        let sink = Arc::new(SoftwareSink::new(config.channels));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(DeviceStats::default());

        let period = Duration::from_secs_f64(quantum as f64 / config.sample_rate.max(1) as f64);
        let thread_sink = sink.clone();
        let thread_running = running.clone();
        let thread_stats = stats.clone();

        let handle = thread::Builder::new()
            .name("virtual-audio-device".into())
            .spawn(move || {
                let mut data = vec![0.0f32; quantum * config.channel_count()];
                let mut next = Instant::now();
                while thread_running.load(Ordering::Relaxed) {
                    thread_sink.render(&mut data);
                    thread_stats.callbacks.fetch_add(1, Ordering::Relaxed);
                    if data.iter().all(|&s| s == 0.0) {
                        thread_stats.silent_callbacks.fetch_add(1, Ordering::Relaxed);
                    }

                    next += period;
                    let wait = next.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                }
            })?;

        tracing::info!(
            "Virtual audio device started: {}, {} frames per callback",
            config,
            quantum
        );

        Ok(Self {
            sink,
            running,
            stats,
            thread_handle: Some(handle),
            config,
        })
    }

    pub fn sink(&self) -> Arc<SoftwareSink> {
        self.sink.clone()
    }

    pub fn stats(&self) -> Arc<DeviceStats> {
        self.stats.clone()
    }

    pub fn config(&self) -> ChannelExpectation {
        self.config
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl AudioSource for Constant {
        fn read(&self, data: &mut [f32], _channels: usize) {
            data.fill(self.0);
        }
    }

    #[test]
    fn test_software_sink_applies_volume() {
        let sink = SoftwareSink::new(2);
        let mut data = [1.0f32; 4];

        sink.render(&mut data);
        assert_eq!(data, [0.0; 4]);

        sink.attach(Arc::new(Constant(0.5)));
        sink.set_volume(0.5);
        sink.render(&mut data);
        assert_eq!(data, [0.25; 4]);

        sink.set_volume(3.0);
        assert_eq!(sink.volume(), 1.0);

        sink.detach();
        assert!(!sink.is_attached());
    }

    #[test]
    fn test_virtual_device_ticks() {
        let mut device = VirtualDevice::start(ChannelExpectation::new(48000, 2), 480).unwrap();
        device.sink().attach(Arc::new(Constant(0.1)));
        thread::sleep(Duration::from_millis(60));
        device.stop();

        let stats = device.stats();
        assert!(stats.callbacks() >= 2);
        assert!(stats.silent_callbacks() < stats.callbacks());
    }
}
