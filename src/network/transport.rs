//! Transport and receiver interfaces
//!
//! The media transport itself is opaque: the crate only needs a way to open a
//! receiver for a named source, a blocking capture call, and the free calls
//! that hand frames back to the transport.

use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::network::frame::{AudioFrame, Captured, MetadataFrame, VideoFrame};

/// Factory for receivers connected to a named source
pub trait Transport: Send + Sync {
    /// Open a receiver for `source_name`, or `None` if the source (or the
    /// transport) is not available right now.
    fn try_create(&self, source_name: &str) -> Option<Arc<dyn Receiver>>;
}

/// An open connection to one source
///
/// `capture` is called from the acquisition thread while the `free_*` calls
/// come from the presentation context, so implementations must be `Sync`.
/// Dropping the receiver disposes it and reclaims any frames still out.
pub trait Receiver: Send + Sync {
    /// Block for up to `timeout` waiting for the next frame
    fn capture(&self, timeout: Duration) -> Captured;

    fn free_video(&self, frame: VideoFrame) -> Result<(), TransportError>;

    fn free_audio(&self, frame: AudioFrame) -> Result<(), TransportError>;

    fn free_metadata(&self, frame: MetadataFrame) -> Result<(), TransportError>;
}
