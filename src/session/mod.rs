//! Receiver sessions: acquisition, hand-off, presentation and lifecycle

pub mod acquisition;
pub mod controller;
pub mod dispatch;
pub mod present;
pub mod receiver;
pub mod state;

pub use acquisition::{AcquisitionLoop, AcquisitionTiming, LoopControl};
pub use controller::StreamController;
pub use dispatch::{DrainCounts, FrameHandlers, FrameMailbox, FramePoster, StatusEvent, Tagged};
pub use present::{PresentationSink, Presenter, Surface};
pub use receiver::{ConverterFactory, ReceiverSession};
pub use state::{SessionState, StreamHealth};
