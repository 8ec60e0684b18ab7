//! Video decode and audio layout conversion

pub mod convert;
pub mod interleave;

pub use convert::{CpuConverter, FormatConverter, PixelBuffer};
pub use interleave::{planar_to_interleaved, remix_into, AudioInterleaver};
