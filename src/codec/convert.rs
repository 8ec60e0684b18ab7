//! Video format conversion
//!
//! Turns a packed transport frame into a displayable RGBA buffer. The
//! converter owns its output buffer and reuses it between frames.

use crate::error::CodecError;

/// Displayable 8-bit RGBA pixels, rows top to bottom, no padding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// RGBA value at (`x`, `y`)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Opaque decode step from transport pixels to a displayable buffer
pub trait FormatConverter: Send {
    /// Decode one frame; `None` when the frame cannot be displayed
    fn decode(&mut self, width: u32, height: u32, has_alpha: bool, data: &[u8])
        -> Option<&PixelBuffer>;
}

/// CPU converter for packed 4:2:2 frames (UYVY, and UYVA when `has_alpha`)
#[derive(Debug, Default)]
pub struct CpuConverter {
    output: PixelBuffer,
    frames_decoded: u64,
    frames_rejected: u64,
}

impl CpuConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Decode into the internal buffer, reporting why a frame was rejected
    pub fn try_decode(
        &mut self,
        width: u32,
        height: u32,
        has_alpha: bool,
        data: &[u8],
    ) -> Result<&PixelBuffer, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidDimensions { width, height });
        }

        let w = width as usize;
        let h = height as usize;
        let row = w.div_ceil(2) * 4;
        let alpha_offset = row * h;
        let expected = alpha_offset + if has_alpha { w * h } else { 0 };
        if data.len() < expected {
            return Err(CodecError::DataTooShort {
                expected,
                actual: data.len(),
            });
        }

        if self.output.width != width || self.output.height != height {
            self.output = PixelBuffer::new(width, height);
        }

        let out = &mut self.output.data;
        for y in 0..h {
            let line = &data[y * row..(y + 1) * row];
            for (pair, chunk) in line.chunks_exact(4).enumerate() {
                let (u, y0, v, y1) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                for (k, luma) in [y0, y1].into_iter().enumerate() {
                    let x = pair * 2 + k;
                    if x >= w {
                        break;
                    }
                    let alpha = if has_alpha { data[alpha_offset + y * w + x] } else { 255 };
                    let [r, g, b] = yuv_to_rgb(luma, u, v);
                    let i = (y * w + x) * 4;
                    out[i..i + 4].copy_from_slice(&[r, g, b, alpha]);
                }
            }
        }

        self.frames_decoded += 1;
        Ok(&self.output)
    }
}

impl FormatConverter for CpuConverter {
    fn decode(
        &mut self,
        width: u32,
        height: u32,
        has_alpha: bool,
        data: &[u8],
    ) -> Option<&PixelBuffer> {
        match self.try_decode(width, height, has_alpha, data).map(|_| ()) {
            Ok(()) => Some(&self.output),
            Err(e) => {
                self.frames_rejected += 1;
                tracing::debug!("Dropping undecodable video frame: {}", e);
                None
            }
        }
    }
}

/// BT.601 studio-swing YUV to RGB
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}
