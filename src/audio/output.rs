//! Playback through the default cpal output device

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{ChannelExpectation, DeviceConfigHub};
use crate::audio::sink::{AudioSink, AudioSource, SoftwareSink};
use crate::error::AudioError;

/// Sample rate and channel count of the current default output device
pub fn default_output_expectation() -> Result<ChannelExpectation, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("default output".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::CpalError(e.to_string()))?;
    Ok(ChannelExpectation::new(config.sample_rate().0, config.channels()))
}

/// Output stream on the default device, fed by a [`SoftwareSink`]
pub struct CpalOutput {
    sink: Arc<SoftwareSink>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
    config: ChannelExpectation,
}

impl CpalOutput {
    /// Open the default output device at its default configuration
    pub fn start_default() -> Result<Self, AudioError> {
        let config = default_output_expectation()?;
        let sink = Arc::new(SoftwareSink::new(config.channels));
        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let thread_sink = sink.clone();
        let thread_running = running.clone();

        // cpal streams are not Send on every platform; keep it on its own thread
        let handle = thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                let device = match cpal::default_host().default_output_device() {
                    Some(device) => device,
                    None => {
                        tracing::error!("Default output device disappeared");
                        return;
                    }
                };

                let stream_errors = error_tx.clone();
                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        thread_sink.render(data);
                    },
                    move |err| {
                        let _ = stream_errors.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start output stream: {}", e);
                            return;
                        }
                        while thread_running.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build output stream: {}", e);
                        let _ = error_tx.try_send(AudioError::CpalError(e.to_string()));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!("Audio output started on default device: {}", config);

        Ok(Self {
            sink,
            running,
            thread_handle: Some(handle),
            error_rx,
            config,
        })
    }

    pub fn sink(&self) -> Arc<SoftwareSink> {
        self.sink.clone()
    }

    pub fn config(&self) -> ChannelExpectation {
        self.config
    }

    /// Stream errors reported since the last call
    pub fn take_errors(&self) -> Vec<AudioError> {
        self.error_rx.try_iter().collect()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioSink for CpalOutput {
    fn attach(&self, source: Arc<dyn AudioSource>) {
        self.sink.attach(source);
    }

    fn detach(&self) {
        self.sink.detach();
    }

    fn volume(&self) -> f32 {
        self.sink.volume()
    }

    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Polls the default output device and publishes configuration changes
pub struct DeviceWatcher {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    pub fn start(hub: Arc<DeviceConfigHub>, interval: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("device-watcher".into())
            .spawn(move || {
                while thread_running.load(Ordering::Relaxed) {
                    match default_output_expectation() {
                        Ok(config) => {
                            hub.notify_changed(config);
                        }
                        Err(e) => tracing::debug!("Default output device query failed: {}", e),
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            running,
            thread_handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
