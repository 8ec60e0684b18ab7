//! Receiver session: the per-stream receiver handle, converter and audio bridge
//!
//! Internal objects are created lazily by the acquisition loop and released
//! either on a restart request or at teardown. Every receiver instance gets a
//! new generation number; frames remember the generation they were captured
//! under so that a frame from a replaced receiver is never handed to its
//! successor.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::bridge::AudioBridge;
use crate::codec::convert::FormatConverter;
use crate::network::frame::{AudioFrame, MetadataFrame, VideoFrame};
use crate::network::transport::{Receiver, Transport};
use crate::session::state::{AtomicSessionState, HealthCounters};

/// Creates a fresh converter whenever a session (re)connects
pub type ConverterFactory = Arc<dyn Fn() -> Box<dyn FormatConverter> + Send + Sync>;

struct ReceiverSlot {
    receiver: Option<Arc<dyn Receiver>>,
    generation: u64,
}

/// Owned resources of one stream
pub struct ReceiverSession {
    source_name: String,
    transport: Arc<dyn Transport>,
    slot: Mutex<ReceiverSlot>,
    converter: Mutex<Option<Box<dyn FormatConverter>>>,
    converter_factory: ConverterFactory,
    bridge: Arc<AudioBridge>,
    state: AtomicSessionState,
    health: HealthCounters,
}

impl ReceiverSession {
    pub fn new(
        source_name: impl Into<String>,
        transport: Arc<dyn Transport>,
        converter_factory: ConverterFactory,
        bridge: Arc<AudioBridge>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            transport,
            slot: Mutex::new(ReceiverSlot {
                receiver: None,
                generation: 0,
            }),
            converter: Mutex::new(None),
            converter_factory,
            bridge,
            state: AtomicSessionState::new(),
            health: HealthCounters::new(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn bridge(&self) -> &Arc<AudioBridge> {
        &self.bridge
    }

    pub fn state(&self) -> &AtomicSessionState {
        &self.state
    }

    pub fn health(&self) -> &HealthCounters {
        &self.health
    }

    /// Current receiver and its generation, creating both receiver and
    /// converter if needed. `None` while the source is unavailable.
    pub fn prepare(&self) -> Option<(Arc<dyn Receiver>, u64)> {
        let mut slot = self.slot.lock();
        if slot.receiver.is_none() {
            let receiver = self.transport.try_create(&self.source_name)?;
            slot.generation += 1;
            slot.receiver = Some(receiver);
            tracing::info!(
                "Receiver for '{}' created (generation {})",
                self.source_name,
                slot.generation
            );
        }
        let current = slot.receiver.clone().map(|r| (r, slot.generation));
        drop(slot);

        let mut converter = self.converter.lock();
        if converter.is_none() {
            *converter = Some((self.converter_factory)());
        }
        drop(converter);

        if self.bridge.is_torn_down() {
            self.bridge.reset();
        }
        current
    }

    /// Whether a receiver is currently held
    pub fn has_receiver(&self) -> bool {
        self.slot.lock().receiver.is_some()
    }

    pub fn has_converter(&self) -> bool {
        self.converter.lock().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Run `f` with the converter, or `None` if it has been released
    pub fn with_converter<R>(&self, f: impl FnOnce(Option<&mut dyn FormatConverter>) -> R) -> R {
        let mut converter = self.converter.lock();
        match converter.as_mut() {
            Some(c) => f(Some(&mut **c)),
            None => f(None),
        }
    }

    /// Whether frames tagged with `generation` came from the live receiver
    pub fn is_current(&self, generation: u64) -> bool {
        let slot = self.slot.lock();
        slot.receiver.is_some() && slot.generation == generation
    }

    /// Receiver for `generation`, if it is still the live one
    fn receiver_for(&self, generation: u64) -> Option<Arc<dyn Receiver>> {
        let slot = self.slot.lock();
        if slot.generation == generation {
            slot.receiver.clone()
        } else {
            None
        }
    }

    pub fn free_video(&self, generation: u64, frame: VideoFrame) {
        let id = frame.id;
        match self.receiver_for(generation) {
            Some(receiver) => {
                if let Err(e) = receiver.free_video(frame) {
                    tracing::error!("Failed to release video frame {}: {}", id, e);
                }
            }
            None => tracing::debug!("Dropping video frame {} from a released receiver", id),
        }
    }

    pub fn free_audio(&self, generation: u64, frame: AudioFrame) {
        let id = frame.id;
        match self.receiver_for(generation) {
            Some(receiver) => {
                if let Err(e) = receiver.free_audio(frame) {
                    tracing::error!("Failed to release audio frame {}: {}", id, e);
                }
            }
            None => tracing::debug!("Dropping audio frame {} from a released receiver", id),
        }
    }

    pub fn free_metadata(&self, generation: u64, frame: MetadataFrame) {
        let id = frame.id;
        match self.receiver_for(generation) {
            Some(receiver) => {
                if let Err(e) = receiver.free_metadata(frame) {
                    tracing::error!("Failed to release metadata frame {}: {}", id, e);
                }
            }
            None => tracing::debug!("Dropping metadata frame {} from a released receiver", id),
        }
    }

    /// Release the receiver, then the converter. Safe to call repeatedly.
    pub fn release_internal_objects(&self) {
        // Presentation checks the generation while holding the converter, so
        // no decode can overlap the receiver going away
        let mut converter = self.converter.lock();
        let receiver = {
            let mut slot = self.slot.lock();
            let receiver = slot.receiver.take();
            if receiver.is_some() {
                // Invalidate frames captured under the old receiver
                slot.generation += 1;
            }
            receiver
        };
        if receiver.is_some() {
            tracing::info!("Releasing receiver for '{}'", self.source_name);
        }
        drop(receiver);

        drop(converter.take());
    }

    /// Full teardown: receiver, converter, then the bridge buffers
    pub fn teardown(&self) {
        self.release_internal_objects();
        self.bridge.teardown();
    }
}

impl Drop for ReceiverSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::convert::CpuConverter;
    use crate::network::frame::Captured;
    use crate::network::test_pattern::{TestPatternConfig, TestPatternTransport};
    use crate::network::TEST_PATTERN_SOURCE;
    use std::time::Duration;

    fn session(transport: Arc<TestPatternTransport>) -> ReceiverSession {
        ReceiverSession::new(
            TEST_PATTERN_SOURCE,
            transport,
            Arc::new(|| Box::new(CpuConverter::new()) as Box<dyn FormatConverter>),
            Arc::new(AudioBridge::default()),
        )
    }

    fn next_video(receiver: &Arc<dyn Receiver>) -> VideoFrame {
        loop {
            match receiver.capture(Duration::from_millis(100)) {
                Captured::Video(frame) => return frame,
                Captured::Audio(frame) => receiver.free_audio(frame).unwrap(),
                Captured::Metadata(frame) => receiver.free_metadata(frame).unwrap(),
                _ => {}
            }
        }
    }

    #[test]
    fn test_prepare_unknown_source() {
        let transport = Arc::new(TestPatternTransport::default());
        let session = ReceiverSession::new(
            "NOWHERE (Camera 9)",
            transport,
            Arc::new(|| Box::new(CpuConverter::new()) as Box<dyn FormatConverter>),
            Arc::new(AudioBridge::default()),
        );
        assert!(session.prepare().is_none());
        assert!(!session.has_converter());
    }

    #[test]
    fn test_prepare_is_lazy_and_stable() {
        let transport = Arc::new(TestPatternTransport::default());
        let session = session(transport.clone());

        let (_, first) = session.prepare().unwrap();
        let (_, second) = session.prepare().unwrap();
        assert_eq!(first, second);
        assert!(session.has_converter());
        assert_eq!(transport.ledger().receivers_opened(), 1);
    }

    #[test]
    fn test_stale_frame_not_freed_on_new_receiver() {
        let transport = Arc::new(TestPatternTransport::new(TestPatternConfig::default()));
        let ledger = transport.ledger();
        let session = session(transport);

        let (receiver, generation) = session.prepare().unwrap();
        let frame = next_video(&receiver);
        drop(receiver);

        session.release_internal_objects();
        let (_, new_generation) = session.prepare().unwrap();
        assert_ne!(generation, new_generation);

        session.free_video(generation, frame);
        assert_eq!(ledger.receivers_closed(), 1);
        // The old receiver reclaimed the frame when it was dropped
        assert!(ledger.reclaimed() >= 1);
    }

    #[test]
    fn test_is_current_tracks_live_receiver() {
        let session = session(Arc::new(TestPatternTransport::default()));
        assert!(!session.is_current(0));

        let (_, generation) = session.prepare().unwrap();
        assert!(session.is_current(generation));

        session.release_internal_objects();
        assert!(!session.is_current(generation));
        assert!(!session.is_current(session.generation()));

        let (_, next) = session.prepare().unwrap();
        assert!(session.is_current(next));
        assert!(!session.is_current(generation));
    }

    #[test]
    fn test_teardown_releases_everything() {
        let transport = Arc::new(TestPatternTransport::default());
        let ledger = transport.ledger();
        let session = session(transport);

        session.prepare().unwrap();
        session.teardown();
        assert!(!session.has_receiver());
        assert!(!session.has_converter());
        assert!(session.bridge().is_torn_down());
        assert_eq!(ledger.receivers_closed(), 1);

        session.teardown();
        assert_eq!(ledger.receivers_closed(), 1);

        // Reconnecting restores the bridge
        session.prepare().unwrap();
        assert!(!session.bridge().is_torn_down());
    }

    struct Recorded {
        name: &'static str,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl Drop for Recorded {
        fn drop(&mut self) {
            self.log.lock().push(self.name);
        }
    }

    struct RecordedReceiver(Recorded);

    impl Receiver for RecordedReceiver {
        fn capture(&self, timeout: Duration) -> Captured {
            std::thread::sleep(timeout);
            Captured::None
        }

        fn free_video(&self, frame: VideoFrame) -> Result<(), crate::error::TransportError> {
            Err(crate::error::TransportError::UnknownFrame(frame.id.0))
        }

        fn free_audio(&self, frame: AudioFrame) -> Result<(), crate::error::TransportError> {
            Err(crate::error::TransportError::UnknownFrame(frame.id.0))
        }

        fn free_metadata(&self, frame: MetadataFrame) -> Result<(), crate::error::TransportError> {
            Err(crate::error::TransportError::UnknownFrame(frame.id.0))
        }
    }

    struct RecordedTransport(Arc<parking_lot::Mutex<Vec<&'static str>>>);

    impl Transport for RecordedTransport {
        fn try_create(&self, _source_name: &str) -> Option<Arc<dyn Receiver>> {
            Some(Arc::new(RecordedReceiver(Recorded {
                name: "receiver",
                log: self.0.clone(),
            })))
        }
    }

    struct RecordedConverter(Recorded);

    impl FormatConverter for RecordedConverter {
        fn decode(
            &mut self,
            _width: u32,
            _height: u32,
            _has_alpha: bool,
            _data: &[u8],
        ) -> Option<&crate::codec::convert::PixelBuffer> {
            None
        }
    }

    #[test]
    fn test_teardown_order() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let converter_log = log.clone();
        let session = ReceiverSession::new(
            "Ordered",
            Arc::new(RecordedTransport(log.clone())),
            Arc::new(move || {
                Box::new(RecordedConverter(Recorded {
                    name: "converter",
                    log: converter_log.clone(),
                })) as Box<dyn FormatConverter>
            }),
            Arc::new(AudioBridge::default()),
        );

        session.prepare().unwrap();
        session.teardown();
        assert_eq!(*log.lock(), vec!["receiver", "converter"]);
    }
}
