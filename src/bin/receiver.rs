//! Media Receiver Application
//!
//! Opens one stream through the built-in test pattern transport, plays its
//! audio and drives the presentation tick until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_receiver::{
    audio::{AudioSink, DeviceConfigHub},
    config::AppConfig,
    network::{TestPatternConfig, TestPatternTransport},
    MediaModule,
};

#[cfg(not(feature = "cpal-output"))]
use media_receiver::audio::VirtualDevice;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Media Receiver");

    let config = AppConfig::load_or_default().context("loading configuration")?;
    let demo = config.demo.clone();
    let hub = DeviceConfigHub::global();

    // Audio output
    #[cfg(feature = "cpal-output")]
    let (_output, _watcher, audio_sink) = {
        use media_receiver::audio::{CpalOutput, DeviceWatcher};
        let output = CpalOutput::start_default()?;
        hub.notify_changed(output.config());
        let watcher = DeviceWatcher::start(hub.clone(), Duration::from_secs(1))?;
        let sink: Arc<dyn AudioSink> = output.sink();
        (output, watcher, sink)
    };
    #[cfg(not(feature = "cpal-output"))]
    let (_output, audio_sink) = {
        let device = VirtualDevice::start(hub.current(), demo.device_quantum)?;
        let sink: Arc<dyn AudioSink> = device.sink();
        (device, sink)
    };

    let transport = Arc::new(TestPatternTransport::new(TestPatternConfig::default()));
    let module = MediaModule::from_config(transport, &config)
        .context("writing transport settings")?
        .with_hub(hub);

    let handle = module.capture_stream(&demo.source_name, demo.width, demo.height, audio_sink)?;
    module.set_volume(handle, demo.volume);

    tracing::info!("Receiving '{}' ({}x{})", demo.source_name, demo.width, demo.height);
    tracing::info!("Press Ctrl+C to stop");

    let mut tick = tokio::time::interval(Duration::from_millis(demo.tick_ms.max(1)));
    let mut stats = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tick.tick() => module.update(),
            _ = stats.tick() => {
                if let Some(health) = module.health(handle) {
                    tracing::info!(
                        "Stream {}: {} video, {} audio, {} dropped, audio buffer {}/{} ({} underruns)",
                        health.state,
                        health.video_frames,
                        health.audio_frames,
                        health.dropped_frames,
                        health.audio.buffered,
                        health.audio.capacity,
                        health.audio.underruns
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    module.release_stream(handle)?;
    Ok(())
}
