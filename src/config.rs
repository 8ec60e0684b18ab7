//! Configuration
//!
//! Two files are involved. The application config (TOML) tunes the receiver
//! and names the demo source. The transport settings blob (JSON) is written
//! out before any receiver exists so the transport's discovery layer can read
//! it when it initialises.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::session::acquisition::AcquisitionTiming;

/// File name of the transport settings blob
pub const TRANSPORT_SETTINGS_FILE: &str = "transport-settings.json";

/// File name of the application config
pub const APP_CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "media-receiver")
}

/// Source discovery settings read by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Discover sources on the local network
    #[serde(rename = "UseLocalSources")]
    pub use_local_sources: bool,
    /// Extra hosts to query directly
    #[serde(rename = "ExternalIps")]
    pub external_ips: Vec<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            use_local_sources: true,
            external_ips: Vec::new(),
        }
    }
}

impl TransportSettings {
    /// `<config dir>/media-receiver/transport-settings.json`
    pub fn default_path() -> PathBuf {
        match project_dirs() {
            Some(dirs) => dirs.config_dir().join(TRANSPORT_SETTINGS_FILE),
            None => PathBuf::from(TRANSPORT_SETTINGS_FILE),
        }
    }

    /// Write the blob, creating parent directories as needed
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        tracing::debug!("Transport settings written to {}", path.display());
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Receiver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Upper bound on one capture call
    pub capture_timeout_ms: u64,
    /// Wait between attempts while a source is unavailable
    pub retry_backoff_ms: u64,
    /// Device quanta to buffer before audio (re)starts
    pub min_buffer_ahead_frames: usize,
    /// Initial audio ring buffer size in samples
    pub ring_capacity: usize,
    /// Slots per frame type between acquisition and presentation
    pub dispatch_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: CAPTURE_TIMEOUT_MS,
            retry_backoff_ms: RECONNECT_BACKOFF_MS,
            min_buffer_ahead_frames: MIN_BUFFER_AHEAD_FRAMES,
            ring_capacity: RING_BUFFER_CAPACITY,
            dispatch_capacity: DISPATCH_QUEUE_CAPACITY,
        }
    }
}

impl ReceiverConfig {
    pub fn timing(&self) -> AcquisitionTiming {
        AcquisitionTiming {
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture_timeout_ms == 0 {
            return Err(Error::Config("capture_timeout_ms must be positive".into()));
        }
        if self.min_buffer_ahead_frames == 0 {
            return Err(Error::Config("min_buffer_ahead_frames must be at least 1".into()));
        }
        if self.dispatch_capacity == 0 {
            return Err(Error::Config("dispatch_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Stream opened by the receiver binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub source_name: String,
    pub width: u32,
    pub height: u32,
    pub volume: f32,
    /// Presentation tick period
    pub tick_ms: u64,
    /// Frames per virtual device callback
    pub device_quantum: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            source_name: crate::network::TEST_PATTERN_SOURCE.to_string(),
            width: 1920,
            height: 1080,
            volume: 1.0,
            tick_ms: 16,
            device_quantum: 1024,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub receiver: ReceiverConfig,
    pub transport: TransportSettings,
    /// Overrides [`TransportSettings::default_path`]
    pub transport_settings_path: Option<PathBuf>,
    pub demo: DemoConfig,
}

impl AppConfig {
    /// `<config dir>/media-receiver/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(APP_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.receiver.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if the file
    /// is missing
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn transport_settings_path(&self) -> PathBuf {
        self.transport_settings_path
            .clone()
            .unwrap_or_else(TransportSettings::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("media-receiver-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_transport_settings_json_shape() {
        let settings = TransportSettings {
            use_local_sources: false,
            external_ips: vec!["10.0.0.5".into(), "10.0.0.6".into()],
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(
            json,
            r#"{"UseLocalSources":false,"ExternalIps":["10.0.0.5","10.0.0.6"]}"#
        );
    }

    #[test]
    fn test_transport_settings_written_and_read() {
        let path = temp_path(TRANSPORT_SETTINGS_FILE);
        let settings = TransportSettings {
            use_local_sources: true,
            external_ips: vec!["192.168.1.20".into()],
        };
        settings.write_to(&path).unwrap();
        assert_eq!(TransportSettings::load_from(&path).unwrap(), settings);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_app_config_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [receiver]
            min_buffer_ahead_frames = 6

            [demo]
            source_name = "STUDIO (Camera 2)"
            "#,
        )
        .unwrap();
        assert_eq!(config.receiver.min_buffer_ahead_frames, 6);
        assert_eq!(config.receiver.capture_timeout_ms, CAPTURE_TIMEOUT_MS);
        assert_eq!(config.demo.source_name, "STUDIO (Camera 2)");
        assert!(config.transport.use_local_sources);
    }

    #[test]
    fn test_invalid_receiver_config() {
        let path = temp_path(APP_CONFIG_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[receiver]\nmin_buffer_ahead_frames = 0\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(Error::Config(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
