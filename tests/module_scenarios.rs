//! End-to-end behaviour of the module facade

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use media_receiver::audio::{DeviceConfigHub, SoftwareSink};
use media_receiver::config::{ReceiverConfig, TransportSettings};
use media_receiver::error::{Error, StreamError, TransportError};
use media_receiver::module::UNKNOWN_STREAM_VOLUME;
use media_receiver::network::{
    AudioFrame, Captured, MetadataFrame, Receiver, TestPatternTransport, Transport, VideoFrame,
    TEST_PATTERN_SOURCE,
};
use media_receiver::session::SessionState;
use media_receiver::MediaModule;

fn settings_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("media-receiver-it-{}", uuid::Uuid::new_v4()))
        .join("transport-settings.json")
}

fn fast_config() -> ReceiverConfig {
    ReceiverConfig {
        capture_timeout_ms: 20,
        retry_backoff_ms: 5,
        ..ReceiverConfig::default()
    }
}

fn module_with(transport: Arc<dyn Transport>) -> (MediaModule, PathBuf) {
    let path = settings_path();
    let module = MediaModule::new(transport, &TransportSettings::default(), &path, fast_config())
        .unwrap()
        .with_hub(Arc::new(DeviceConfigHub::default()));
    (module, path)
}

fn cleanup(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_pattern_capture_volume_release() {
    let (module, path) = module_with(Arc::new(TestPatternTransport::default()));

    let handle = module
        .capture_stream(TEST_PATTERN_SOURCE, 1920, 1080, Arc::new(SoftwareSink::default()))
        .unwrap();
    let surface = module.surface(handle).unwrap();
    assert_eq!((surface.width(), surface.height()), (1920, 1080));

    module.set_volume(handle, 0.0);
    assert_eq!(module.get_volume(handle), 0.0);
    module.set_volume(handle, 1.0);
    assert_eq!(module.get_volume(handle), 1.0);

    module.release_stream(handle).unwrap();
    assert_eq!(module.get_volume(handle), UNKNOWN_STREAM_VOLUME);

    let second = module.release_stream(handle);
    assert!(matches!(
        second,
        Err(Error::Stream(StreamError::UnknownHandle(h))) if h == handle
    ));
    cleanup(&path);
}

#[test]
fn test_pattern_frames_reach_surface() {
    let (module, path) = module_with(Arc::new(TestPatternTransport::default()));
    let handle = module
        .capture_stream(TEST_PATTERN_SOURCE, 320, 180, Arc::new(SoftwareSink::default()))
        .unwrap();
    let surface = module.surface(handle).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while surface.updates() == 0 && Instant::now() < deadline {
        module.update();
        thread::sleep(Duration::from_millis(10));
    }
    assert!(surface.updates() > 0);

    let health = module.health(handle).unwrap();
    assert_eq!(health.state, SessionState::Connected);
    assert_eq!(health.capture_errors, 0);
    // Leftmost bar is white
    let [r, g, b, a] = surface.pixel(0, 0).unwrap();
    assert!(r > 200 && g > 200 && b > 200);
    assert_eq!(a, 255);

    module.release_stream(handle).unwrap();
    cleanup(&path);
}

/// Receiver that never has anything to deliver
struct SilentReceiver {
    captures: Arc<AtomicUsize>,
}

impl Receiver for SilentReceiver {
    fn capture(&self, _timeout: Duration) -> Captured {
        self.captures.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        Captured::None
    }

    fn free_video(&self, frame: VideoFrame) -> Result<(), TransportError> {
        Err(TransportError::UnknownFrame(frame.id.0))
    }

    fn free_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        Err(TransportError::UnknownFrame(frame.id.0))
    }

    fn free_metadata(&self, frame: MetadataFrame) -> Result<(), TransportError> {
        Err(TransportError::UnknownFrame(frame.id.0))
    }
}

struct SilentTransport {
    captures: Arc<AtomicUsize>,
}

impl Transport for SilentTransport {
    fn try_create(&self, _source_name: &str) -> Option<Arc<dyn Receiver>> {
        Some(Arc::new(SilentReceiver {
            captures: self.captures.clone(),
        }))
    }
}

#[test]
fn test_empty_captures_never_block_presentation() {
    let captures = Arc::new(AtomicUsize::new(0));
    let (module, path) = module_with(Arc::new(SilentTransport {
        captures: captures.clone(),
    }));
    let handle = module
        .capture_stream("Quiet Source", 64, 64, Arc::new(SoftwareSink::default()))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while captures.load(Ordering::SeqCst) < 100 && Instant::now() < deadline {
        let started = Instant::now();
        module.update();
        assert!(started.elapsed() < Duration::from_millis(50));
        thread::sleep(Duration::from_millis(1));
    }
    assert!(captures.load(Ordering::SeqCst) >= 100);

    let health = module.health(handle).unwrap();
    assert_eq!(health.capture_errors, 0);
    assert_eq!(health.video_frames, 0);
    assert_eq!(health.state, SessionState::Connecting);
    assert_eq!(module.surface(handle).unwrap().updates(), 0);

    module.release_stream(handle).unwrap();
    cleanup(&path);
}
