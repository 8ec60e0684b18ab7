//! Module facade
//!
//! The surface an application embeds: open a stream by source name and get
//! back a handle, then control its volume or release it through that handle.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::device::DeviceConfigHub;
use crate::audio::sink::AudioSink;
use crate::codec::convert::{CpuConverter, FormatConverter};
use crate::config::{AppConfig, ReceiverConfig, TransportSettings};
use crate::error::{Result, StreamError};
use crate::network::transport::Transport;
use crate::session::controller::StreamController;
use crate::session::present::Surface;
use crate::session::receiver::ConverterFactory;
use crate::session::state::StreamHealth;

/// Volume reported for a handle that is not open
pub const UNKNOWN_STREAM_VOLUME: f32 = -1.0;

/// Identifies one captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle(Uuid);

impl StreamHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct StreamEntry {
    controller: StreamController,
    surface: Surface,
}

/// Registry of open streams
pub struct MediaModule {
    transport: Arc<dyn Transport>,
    streams: DashMap<StreamHandle, StreamEntry>,
    hub: Arc<DeviceConfigHub>,
    converter_factory: ConverterFactory,
    config: ReceiverConfig,
}

impl MediaModule {
    /// Write the transport settings to `settings_path`, then build the module
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: &TransportSettings,
        settings_path: &Path,
        config: ReceiverConfig,
    ) -> Result<Self> {
        config.validate()?;
        settings.write_to(settings_path)?;
        tracing::info!(
            "Media module ready (local sources: {}, {} external hosts)",
            settings.use_local_sources,
            settings.external_ips.len()
        );

        Ok(Self {
            transport,
            streams: DashMap::new(),
            hub: DeviceConfigHub::global(),
            converter_factory: Arc::new(|| Box::new(CpuConverter::new()) as Box<dyn FormatConverter>),
            config,
        })
    }

    /// Build from an [`AppConfig`], writing the transport settings to its
    /// configured location
    pub fn from_config(transport: Arc<dyn Transport>, config: &AppConfig) -> Result<Self> {
        Self::new(
            transport,
            &config.transport,
            &config.transport_settings_path(),
            config.receiver.clone(),
        )
    }

    /// Use `hub` instead of the process-wide device configuration
    pub fn with_hub(mut self, hub: Arc<DeviceConfigHub>) -> Self {
        self.hub = hub;
        self
    }

    pub fn with_converter_factory(mut self, factory: ConverterFactory) -> Self {
        self.converter_factory = factory;
        self
    }

    /// Start receiving `stream_name` onto a new `width` x `height` surface,
    /// with audio going to `audio_sink`
    pub fn capture_stream(
        &self,
        stream_name: &str,
        width: u32,
        height: u32,
        audio_sink: Arc<dyn AudioSink>,
    ) -> Result<StreamHandle> {
        let surface = Surface::new(width, height)?;
        let controller = StreamController::new(
            stream_name,
            self.transport.clone(),
            self.converter_factory.clone(),
            Box::new(surface.clone()),
            audio_sink,
            self.hub.clone(),
            self.config.clone(),
        );
        controller.start()?;

        let handle = StreamHandle::new();
        self.streams.insert(handle, StreamEntry { controller, surface });
        tracing::info!("Capturing '{}' as {} ({}x{})", stream_name, handle, width, height);
        Ok(handle)
    }

    /// Stop the stream and release everything it owns
    pub fn release_stream(&self, handle: StreamHandle) -> Result<()> {
        match self.streams.remove(&handle) {
            Some((_, entry)) => {
                entry.controller.stop();
                tracing::info!("Released stream {}", handle);
                Ok(())
            }
            None => Err(StreamError::UnknownHandle(handle).into()),
        }
    }

    /// Set output gain, clamped to [0, 1]. Unknown handles are ignored.
    pub fn set_volume(&self, handle: StreamHandle, volume: f32) {
        match self.streams.get(&handle) {
            Some(entry) => entry.controller.set_volume(volume),
            None => tracing::debug!("set_volume on unknown stream {}", handle),
        }
    }

    /// Output gain, or [`UNKNOWN_STREAM_VOLUME`] for an unknown handle
    pub fn get_volume(&self, handle: StreamHandle) -> f32 {
        self.streams
            .get(&handle)
            .map_or(UNKNOWN_STREAM_VOLUME, |entry| entry.controller.volume())
    }

    pub fn surface(&self, handle: StreamHandle) -> Option<Surface> {
        self.streams.get(&handle).map(|entry| entry.surface.clone())
    }

    pub fn health(&self, handle: StreamHandle) -> Option<StreamHealth> {
        self.streams.get(&handle).map(|entry| entry.controller.health())
    }

    pub fn restart_stream(&self, handle: StreamHandle) -> Result<()> {
        match self.streams.get(&handle) {
            Some(entry) => entry.controller.restart(),
            None => Err(StreamError::UnknownHandle(handle).into()),
        }
    }

    /// Presentation tick for every open stream
    pub fn update(&self) {
        for entry in self.streams.iter() {
            entry.controller.pump();
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn handles(&self) -> Vec<StreamHandle> {
        self.streams.iter().map(|entry| *entry.key()).collect()
    }
}

impl Drop for MediaModule {
    fn drop(&mut self) {
        for handle in self.handles() {
            let _ = self.release_stream(handle);
        }
    }
}
