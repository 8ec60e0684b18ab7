//! Hand-off from the acquisition thread to the presentation context
//!
//! One bounded queue per frame type keeps per-type FIFO order. The
//! acquisition side never blocks: a full queue hands the frame straight back
//! so the caller can release it. The presentation side drains each queue once
//! per tick, taking only what was queued when the drain began.

use crossbeam_channel::{bounded, Receiver as ChannelReceiver, Sender, TrySendError};

use crate::network::frame::{AudioFrame, MetadataFrame, VideoFrame};

/// A frame together with the receiver generation that produced it
#[derive(Debug)]
pub struct Tagged<F> {
    pub generation: u64,
    pub frame: F,
}

impl<F> Tagged<F> {
    pub fn new(generation: u64, frame: F) -> Self {
        Self { generation, frame }
    }
}

/// Stream status notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// First successful capture after connecting or a fault
    Connected,
    /// The transport could not open the named source
    SourceUnavailable(String),
    /// The transport reported a capture error
    StreamLost,
    /// The transport reported a status change
    Changed,
}

/// Handlers run on the presentation context, one call per queued item
pub trait FrameHandlers {
    fn on_video(&mut self, frame: Tagged<VideoFrame>);

    fn on_audio(&mut self, frame: Tagged<AudioFrame>);

    fn on_metadata(&mut self, frame: Tagged<MetadataFrame>);

    fn on_status(&mut self, event: StatusEvent);
}

/// Items handled by one [`FrameMailbox::drain`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainCounts {
    pub video: usize,
    pub audio: usize,
    pub metadata: usize,
    pub status: usize,
}

impl DrainCounts {
    pub fn total(&self) -> usize {
        self.video + self.audio + self.metadata + self.status
    }
}

/// Acquisition-side end of the hand-off queues
#[derive(Clone)]
pub struct FramePoster {
    video: Sender<Tagged<VideoFrame>>,
    audio: Sender<Tagged<AudioFrame>>,
    metadata: Sender<Tagged<MetadataFrame>>,
    status: Sender<StatusEvent>,
}

fn give_back<T>(result: Result<(), TrySendError<T>>) -> Result<(), T> {
    result.map_err(|e| match e {
        TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
    })
}

impl FramePoster {
    /// Queue a video frame; on a full queue the frame is returned
    pub fn post_video(&self, frame: Tagged<VideoFrame>) -> Result<(), Tagged<VideoFrame>> {
        give_back(self.video.try_send(frame))
    }

    pub fn post_audio(&self, frame: Tagged<AudioFrame>) -> Result<(), Tagged<AudioFrame>> {
        give_back(self.audio.try_send(frame))
    }

    pub fn post_metadata(
        &self,
        frame: Tagged<MetadataFrame>,
    ) -> Result<(), Tagged<MetadataFrame>> {
        give_back(self.metadata.try_send(frame))
    }

    /// Queue a status event; returns false if it was dropped
    pub fn post_status(&self, event: StatusEvent) -> bool {
        self.status.try_send(event).is_ok()
    }
}

/// Presentation-side end of the hand-off queues
pub struct FrameMailbox {
    video: ChannelReceiver<Tagged<VideoFrame>>,
    audio: ChannelReceiver<Tagged<AudioFrame>>,
    metadata: ChannelReceiver<Tagged<MetadataFrame>>,
    status: ChannelReceiver<StatusEvent>,
}

/// Create a poster/mailbox pair with `capacity` slots per frame type
pub fn mailbox(capacity: usize) -> (FramePoster, FrameMailbox) {
    let capacity = capacity.max(1);
    let (video_tx, video_rx) = bounded(capacity);
    let (audio_tx, audio_rx) = bounded(capacity);
    let (metadata_tx, metadata_rx) = bounded(capacity);
    let (status_tx, status_rx) = bounded(capacity);
    (
        FramePoster {
            video: video_tx,
            audio: audio_tx,
            metadata: metadata_tx,
            status: status_tx,
        },
        FrameMailbox {
            video: video_rx,
            audio: audio_rx,
            metadata: metadata_rx,
            status: status_rx,
        },
    )
}

/// Pop at most the number of items queued at entry
fn drain_queue<T>(rx: &ChannelReceiver<T>, mut handle: impl FnMut(T)) -> usize {
    let queued = rx.len();
    let mut handled = 0;
    while handled < queued {
        match rx.try_recv() {
            Ok(item) => {
                handle(item);
                handled += 1;
            }
            Err(_) => break,
        }
    }
    handled
}

impl FrameMailbox {
    /// Run the handlers for everything queued so far
    pub fn drain<H: FrameHandlers + ?Sized>(&self, handlers: &mut H) -> DrainCounts {
        DrainCounts {
            status: drain_queue(&self.status, |e| handlers.on_status(e)),
            video: drain_queue(&self.video, |f| handlers.on_video(f)),
            audio: drain_queue(&self.audio, |f| handlers.on_audio(f)),
            metadata: drain_queue(&self.metadata, |f| handlers.on_metadata(f)),
        }
    }

    /// Drop everything queued without running handlers
    pub fn discard(&self) -> usize {
        self.video.try_iter().count()
            + self.audio.try_iter().count()
            + self.metadata.try_iter().count()
            + self.status.try_iter().count()
    }

    pub fn pending(&self) -> usize {
        self.video.len() + self.audio.len() + self.metadata.len() + self.status.len()
    }
}
