//! Frame types produced by a receiver
//!
//! Every frame carries the [`FrameId`] its receiver assigned on capture and
//! must go back to that receiver exactly once through one of the `free_*`
//! calls. Frames are not `Clone` and the calls take them by value, so a frame
//! cannot be released twice.

use bytes::Bytes;
use std::fmt;

/// Transport-assigned identity of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification of a single capture call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    None,
    Video,
    Audio,
    Metadata,
    Error,
    StatusChange,
}

/// Pixel format tags (FourCC codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourCc {
    Uyvy,
    Yv12,
    Nv12,
    I420,
    Bgra,
    Bgrx,
    Rgba,
    Rgbx,
    Uyva,
}

impl FourCc {
    /// Little-endian FourCC code
    pub const fn code(self) -> u32 {
        match self {
            FourCc::Uyvy => 0x5956_5955,
            FourCc::Yv12 => 0x3231_5659,
            FourCc::Nv12 => 0x3231_564E,
            FourCc::I420 => 0x3032_3449,
            FourCc::Bgra => 0x4152_4742,
            FourCc::Bgrx => 0x5852_4742,
            FourCc::Rgba => 0x4142_4752,
            FourCc::Rgbx => 0x5842_4752,
            FourCc::Uyva => 0x4156_5955,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        [
            FourCc::Uyvy,
            FourCc::Yv12,
            FourCc::Nv12,
            FourCc::I420,
            FourCc::Bgra,
            FourCc::Bgrx,
            FourCc::Rgba,
            FourCc::Rgbx,
            FourCc::Uyva,
        ]
        .into_iter()
        .find(|f| f.code() == code)
    }

    /// Whether the format carries an alpha channel
    pub const fn has_alpha(self) -> bool {
        matches!(self, FourCc::Bgra | FourCc::Rgba | FourCc::Uyva)
    }
}

/// Scan format of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanFormat {
    Interleaved,
    #[default]
    Progressive,
    Field0,
    Field1,
}

/// A captured video frame
pub struct VideoFrame {
    pub id: FrameId,
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    pub frame_rate_n: u32,
    pub frame_rate_d: u32,
    pub aspect_ratio: f32,
    pub scan_format: ScanFormat,
    pub timecode: i64,
    /// Raw pixel data, owned by the transport until released
    pub data: Bytes,
    pub line_stride: usize,
    pub metadata: Option<String>,
    pub timestamp: i64,
}

impl VideoFrame {
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Frames per second, or zero for a malformed rate
    pub fn frame_rate(&self) -> f32 {
        if self.frame_rate_d == 0 {
            0.0
        } else {
            self.frame_rate_n as f32 / self.frame_rate_d as f32
        }
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fourcc", &self.fourcc)
            .field("frame_rate", &self.frame_rate())
            .field("aspect_ratio", &self.aspect_ratio)
            .field("scan_format", &self.scan_format)
            .field("timecode", &self.timecode)
            .field("data (bytes)", &self.data.len())
            .field("line_stride", &self.line_stride)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// A captured audio frame with planar 32-bit float samples
pub struct AudioFrame {
    pub id: FrameId,
    pub sample_rate: u32,
    pub channels: usize,
    /// Samples per channel
    pub samples: usize,
    pub timecode: i64,
    /// Planar sample data, one region per channel
    pub data: Vec<f32>,
    pub channel_stride_in_bytes: usize,
    pub metadata: Option<String>,
    pub timestamp: i64,
}

impl AudioFrame {
    pub fn has_data(&self) -> bool {
        !self.data.is_empty() && self.samples > 0
    }

    /// Distance between the starts of two channel regions, in samples
    pub fn channel_stride(&self) -> usize {
        self.channel_stride_in_bytes / std::mem::size_of::<f32>()
    }

    /// Borrow one channel's samples, if the frame is large enough to hold it
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        if index >= self.channels {
            return None;
        }
        let start = index * self.channel_stride();
        self.data.get(start..start + self.samples)
    }
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFrame")
            .field("id", &self.id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("samples", &self.samples)
            .field("timecode", &self.timecode)
            .field("channel_stride_in_bytes", &self.channel_stride_in_bytes)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// A captured metadata frame
#[derive(Debug)]
pub struct MetadataFrame {
    pub id: FrameId,
    pub length: usize,
    pub timecode: i64,
    pub data: String,
}

impl MetadataFrame {
    pub fn has_data(&self) -> bool {
        self.length > 0 && !self.data.is_empty()
    }
}

/// Result of one blocking capture call
#[derive(Debug)]
pub enum Captured {
    /// Nothing arrived before the timeout
    None,
    Video(VideoFrame),
    Audio(AudioFrame),
    Metadata(MetadataFrame),
    /// The connection to the source was lost
    Error,
    StatusChange,
}

impl Captured {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Captured::None => FrameType::None,
            Captured::Video(_) => FrameType::Video,
            Captured::Audio(_) => FrameType::Audio,
            Captured::Metadata(_) => FrameType::Metadata,
            Captured::Error => FrameType::Error,
            Captured::StatusChange => FrameType::StatusChange,
        }
    }
}
