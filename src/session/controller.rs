//! Stream lifecycle: start, restart, stop and the presentation tick

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::audio::bridge::{AudioBridge, BridgeConfig};
use crate::audio::device::{DeviceConfigHub, SubscriptionId};
use crate::audio::sink::{AudioSink, AudioSource};
use crate::config::ReceiverConfig;
use crate::error::{Result, StreamError};
use crate::network::transport::Transport;
use crate::session::acquisition::{AcquisitionLoop, LoopControl};
use crate::session::dispatch::{mailbox, DrainCounts, FrameMailbox, FramePoster};
use crate::session::present::{PresentationSink, Presenter};
use crate::session::receiver::{ConverterFactory, ReceiverSession};
use crate::session::state::{SessionState, StreamHealth};

/// Owns one stream from start to stop
pub struct StreamController {
    session: Arc<ReceiverSession>,
    control: Arc<LoopControl>,
    poster: FramePoster,
    mailbox: FrameMailbox,
    presenter: Mutex<Presenter>,
    audio_sink: Arc<dyn AudioSink>,
    hub: Arc<DeviceConfigHub>,
    subscription: Mutex<Option<SubscriptionId>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    config: ReceiverConfig,
}

impl StreamController {
    pub fn new(
        source_name: impl Into<String>,
        transport: Arc<dyn Transport>,
        converter_factory: ConverterFactory,
        presentation: Box<dyn PresentationSink>,
        audio_sink: Arc<dyn AudioSink>,
        hub: Arc<DeviceConfigHub>,
        config: ReceiverConfig,
    ) -> Self {
        let bridge = Arc::new(AudioBridge::new(
            BridgeConfig {
                min_buffer_ahead_frames: config.min_buffer_ahead_frames,
                ring_capacity: config.ring_capacity,
            },
            hub.current(),
        ));
        let session = Arc::new(ReceiverSession::new(
            source_name,
            transport,
            converter_factory,
            bridge,
        ));
        let (poster, mailbox) = mailbox(config.dispatch_capacity);
        let presenter = Presenter::new(session.clone(), presentation);

        Self {
            session,
            control: Arc::new(LoopControl::new()),
            poster,
            mailbox,
            presenter: Mutex::new(presenter),
            audio_sink,
            hub,
            subscription: Mutex::new(None),
            thread_handle: Mutex::new(None),
            config,
        }
    }

    pub fn source_name(&self) -> &str {
        self.session.source_name()
    }

    pub fn bridge(&self) -> Arc<AudioBridge> {
        self.session.bridge().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.state().load()
    }

    /// Whether the acquisition thread is running
    pub fn is_running(&self) -> bool {
        self.control.is_alive()
    }

    /// Spawn acquisition, follow device configuration, attach audio
    pub fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let bridge = self.session.bridge();
        bridge.set_expectation(self.hub.current());
        bridge.reset();

        {
            let mut subscription = self.subscription.lock();
            if subscription.is_none() {
                let weak = Arc::downgrade(bridge);
                *subscription = Some(self.hub.subscribe(move |config| {
                    if let Some(bridge) = weak.upgrade() {
                        bridge.set_expectation(config);
                    }
                }));
            }
        }

        self.audio_sink
            .attach(bridge.clone() as Arc<dyn AudioSource>);
        self.spawn_loop()?;

        tracing::info!("Stream '{}' started", self.source_name());
        Ok(())
    }

    fn spawn_loop(&self) -> Result<()> {
        let mut thread_handle = self.thread_handle.lock();
        if let Some(old) = thread_handle.take() {
            let _ = old.join();
        }

        self.session.state().begin_connect();
        let acquisition = AcquisitionLoop::new(
            self.session.clone(),
            self.poster.clone(),
            self.control.clone(),
            self.config.timing(),
        );
        match acquisition.spawn() {
            Ok(handle) => {
                *thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.session.state().reset();
                Err(StreamError::SpawnFailed(e.to_string()).into())
            }
        }
    }

    /// Recreate the receiver and converter. A live loop does this on its next
    /// iteration; a loop that died is spawned again.
    pub fn restart(&self) -> Result<()> {
        if self.control.is_alive() {
            self.control.request_restart();
            return Ok(());
        }
        if self.subscription.lock().is_none() {
            return self.start();
        }

        tracing::warn!("Acquisition for '{}' was not running, respawning", self.source_name());
        self.session.bridge().reset();
        self.spawn_loop()
    }

    /// Cancel, join, detach and release everything. Idempotent.
    pub fn stop(&self) {
        self.control.cancel();
        if let Some(handle) = self.thread_handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Acquisition thread for '{}' panicked", self.source_name());
            }
        }

        if let Some(id) = self.subscription.lock().take() {
            self.audio_sink.detach();
            self.hub.unsubscribe(id);
            tracing::info!("Stream '{}' stopped", self.source_name());
        }

        // Queued frames belong to a receiver that is already gone
        let discarded = self.mailbox.discard();
        if discarded > 0 {
            tracing::debug!("Discarded {} queued items for '{}'", discarded, self.source_name());
        }
        self.session.teardown();
        self.session.state().reset();
    }

    /// Presentation tick: run handlers for everything queued so far
    pub fn pump(&self) -> DrainCounts {
        let mut presenter = self.presenter.lock();
        self.mailbox.drain(&mut *presenter)
    }

    pub fn volume(&self) -> f32 {
        self.audio_sink.volume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.audio_sink.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn health(&self) -> StreamHealth {
        self.session
            .health()
            .snapshot(self.state(), self.session.bridge().stats())
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop();
    }
}
