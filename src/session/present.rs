//! Presentation-side frame handling
//!
//! Runs on whatever thread calls the presentation tick. Video frames are
//! decoded and copied onto the target surface; every frame is handed back to
//! the receiver that produced it.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::codec::convert::PixelBuffer;
use crate::error::StreamError;
use crate::network::frame::{AudioFrame, MetadataFrame, VideoFrame};
use crate::session::dispatch::{FrameHandlers, StatusEvent, Tagged};
use crate::session::receiver::ReceiverSession;

/// Destination for decoded pictures
pub trait PresentationSink: Send {
    fn present(&mut self, pixels: &PixelBuffer);
}

#[derive(Debug)]
struct SurfaceInner {
    pixels: PixelBuffer,
    updates: u64,
    source_size: Option<(u32, u32)>,
}

/// Fixed-size RGBA render target
///
/// Cloning gives another handle to the same pixels. Incoming pictures of any
/// size are scaled onto it with nearest-neighbour sampling.
#[derive(Debug, Clone)]
pub struct Surface {
    inner: Arc<Mutex<SurfaceInner>>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, StreamError> {
        if width == 0 || height == 0 {
            return Err(StreamError::InvalidSurface { width, height });
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(SurfaceInner {
                pixels: PixelBuffer::new(width, height),
                updates: 0,
                source_size: None,
            })),
        })
    }

    pub fn width(&self) -> u32 {
        self.inner.lock().pixels.width
    }

    pub fn height(&self) -> u32 {
        self.inner.lock().pixels.height
    }

    /// Number of pictures presented so far
    pub fn updates(&self) -> u64 {
        self.inner.lock().updates
    }

    /// Size of the last picture presented
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.inner.lock().source_size
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.inner.lock().pixels.pixel(x, y)
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> PixelBuffer {
        self.inner.lock().pixels.clone()
    }
}

impl PresentationSink for Surface {
    fn present(&mut self, pixels: &PixelBuffer) {
        let (sw, sh) = (pixels.width as usize, pixels.height as usize);
        if sw == 0 || sh == 0 {
            return;
        }
        if pixels.data.len() < sw * sh * 4 {
            tracing::warn!(
                "Ignoring {}x{} picture with only {} bytes",
                sw,
                sh,
                pixels.data.len()
            );
            return;
        }
        let mut inner = self.inner.lock();
        let target = &mut inner.pixels;
        let (tw, th) = (target.width as usize, target.height as usize);

        if (tw, th) == (sw, sh) {
            target.data.copy_from_slice(&pixels.data[..tw * th * 4]);
        } else {
            for y in 0..th {
                let sy = y * sh / th;
                for x in 0..tw {
                    let sx = x * sw / tw;
                    let src = (sy * sw + sx) * 4;
                    let dst = (y * tw + x) * 4;
                    target.data[dst..dst + 4].copy_from_slice(&pixels.data[src..src + 4]);
                }
            }
        }

        inner.updates += 1;
        inner.source_size = Some((pixels.width, pixels.height));
    }
}

/// The [`FrameHandlers`] of one stream
pub struct Presenter {
    session: Arc<ReceiverSession>,
    sink: Box<dyn PresentationSink>,
    audio_format: Option<(u32, usize)>,
}

impl Presenter {
    pub fn new(session: Arc<ReceiverSession>, sink: Box<dyn PresentationSink>) -> Self {
        Self {
            session,
            sink,
            audio_format: None,
        }
    }
}

impl FrameHandlers for Presenter {
    fn on_video(&mut self, tagged: Tagged<VideoFrame>) {
        let Tagged { generation, frame } = tagged;
        let session = &self.session;
        let sink = &mut self.sink;

        session.with_converter(|converter| {
            if !session.is_current(generation) {
                // Its receiver already reclaimed the pixel data
                tracing::debug!("Dropping video frame {} from a released receiver", frame.id);
                return;
            }
            session.health().record_video();
            if let Some(metadata) = &frame.metadata {
                session.health().set_last_metadata(metadata.clone());
            }

            let decoded = converter.and_then(|c| {
                c.decode(frame.width, frame.height, frame.fourcc.has_alpha(), &frame.data)
            });
            // The decoded picture lives in the converter, so the source frame
            // can go back before the surface copy
            session.free_video(generation, frame);
            if let Some(pixels) = decoded {
                sink.present(pixels);
            }
        });
    }

    fn on_audio(&mut self, tagged: Tagged<AudioFrame>) {
        let Tagged { generation, frame } = tagged;
        if !self.session.is_current(generation) {
            tracing::debug!("Dropping audio frame {} from a released receiver", frame.id);
            return;
        }
        self.session.health().record_audio();

        let format = (frame.sample_rate, frame.channels);
        if self.audio_format != Some(format) {
            tracing::info!(
                "'{}' audio: {} Hz, {} channels",
                self.session.source_name(),
                format.0,
                format.1
            );
            self.audio_format = Some(format);
        }
        self.session.free_audio(generation, frame);
    }

    fn on_metadata(&mut self, tagged: Tagged<MetadataFrame>) {
        let Tagged { generation, frame } = tagged;
        if !self.session.is_current(generation) {
            tracing::debug!("Dropping metadata frame {} from a released receiver", frame.id);
            return;
        }
        tracing::debug!("'{}' metadata: {}", self.session.source_name(), frame.data);
        self.session.health().record_metadata(frame.data.clone());
        self.session.free_metadata(generation, frame);
    }

    fn on_status(&mut self, event: StatusEvent) {
        let source = self.session.source_name();
        match &event {
            StatusEvent::Connected => tracing::info!("'{}' connected", source),
            StatusEvent::Changed => tracing::info!("'{}' status changed", source),
            StatusEvent::StreamLost => tracing::warn!("'{}' stream lost", source),
            StatusEvent::SourceUnavailable(name) => {
                tracing::warn!("Source '{}' is not available", name)
            }
        }
        self.session.health().record_status();
    }
}
