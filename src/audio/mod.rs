//! Audio subsystem module

pub mod bridge;
pub mod buffer;
pub mod device;
#[cfg(feature = "cpal-output")]
pub mod output;
pub mod sink;

pub use bridge::{AudioBridge, BridgeConfig, BridgeStats};
pub use buffer::RingBuffer;
pub use device::{ChannelExpectation, DeviceConfigHub, SubscriptionId};
#[cfg(feature = "cpal-output")]
pub use output::{CpalOutput, DeviceWatcher};
pub use sink::{AudioSink, AudioSource, DeviceStats, SoftwareSink, VirtualDevice};
