//! Network media transport interfaces and frame types

pub mod frame;
pub mod test_pattern;
pub mod transport;

pub use frame::{AudioFrame, Captured, FourCc, FrameId, FrameType, MetadataFrame, ScanFormat, VideoFrame};
pub use test_pattern::{TestPatternConfig, TestPatternTransport, TEST_PATTERN_SOURCE};
pub use transport::{Receiver, Transport};
