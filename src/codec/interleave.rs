//! Planar to interleaved audio conversion with channel remixing
//!
//! Transport audio arrives planar (one contiguous region per channel); the
//! device callback wants interleaved samples in the device's channel layout.
//! When the counts differ, every source channel is summed into one mono
//! signal that is copied to every output channel.

use crate::error::AudioError;
use crate::network::frame::AudioFrame;

/// Write `samples` frames of planar audio into `out` as interleaved samples
///
/// `stride` is the distance between channel starts in `planar`, in samples.
pub fn planar_to_interleaved(
    planar: &[f32],
    channels: usize,
    samples: usize,
    stride: usize,
    out: &mut [f32],
) -> Result<(), AudioError> {
    if channels == 0 {
        return Err(AudioError::MalformedFrame("zero channels".into()));
    }
    if stride < samples {
        return Err(AudioError::MalformedFrame(format!(
            "channel stride {} shorter than {} samples",
            stride, samples
        )));
    }
    let needed = (channels - 1) * stride + samples;
    if planar.len() < needed {
        return Err(AudioError::MalformedFrame(format!(
            "planar data holds {} samples, {} needed",
            planar.len(),
            needed
        )));
    }
    if out.len() < channels * samples {
        return Err(AudioError::MalformedFrame(format!(
            "output holds {} samples, {} needed",
            out.len(),
            channels * samples
        )));
    }

    for ch in 0..channels {
        let plane = &planar[ch * stride..ch * stride + samples];
        for (i, &sample) in plane.iter().enumerate() {
            out[i * channels + ch] = sample;
        }
    }
    Ok(())
}

/// Remix interleaved audio from `in_channels` to `out_channels`
///
/// Equal counts copy straight through. Otherwise each output frame holds the
/// sum of the input frame's channels on every output channel.
pub fn remix_into(input: &[f32], in_channels: usize, out_channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if in_channels == 0 || out_channels == 0 {
        return;
    }
    if in_channels == out_channels {
        out.extend_from_slice(input);
        return;
    }

    let frames = input.len() / in_channels;
    out.reserve(frames * out_channels);
    for frame in input.chunks_exact(in_channels) {
        let mono: f32 = frame.iter().sum();
        out.extend(std::iter::repeat(mono).take(out_channels));
    }
}

/// Reusable scratch space for the audio producer path
///
/// Both buffers only ever grow, so steady-state frames cause no allocation.
#[derive(Debug, Default)]
pub struct AudioInterleaver {
    interleaved: Vec<f32>,
    remixed: Vec<f32>,
    grow_events: usize,
}

impl AudioInterleaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the scratch for frames of up to `samples` interleaved samples
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            interleaved: vec![0.0; samples],
            remixed: Vec::with_capacity(samples),
            grow_events: 0,
        }
    }

    /// Times the interleave scratch had to grow
    pub fn grow_events(&self) -> usize {
        self.grow_events
    }

    /// Current scratch size in samples
    pub fn scratch_len(&self) -> usize {
        self.interleaved.len()
    }

    /// Interleave `frame` and remix it to `out_channels`
    ///
    /// The returned slice borrows the scratch and is valid until the next call.
    pub fn convert(&mut self, frame: &AudioFrame, out_channels: usize) -> Result<&[f32], AudioError> {
        let total = frame.samples * frame.channels;
        if self.interleaved.len() < total {
            self.interleaved.resize(total, 0.0);
            self.grow_events += 1;
        }

        planar_to_interleaved(
            &frame.data,
            frame.channels,
            frame.samples,
            frame.channel_stride(),
            &mut self.interleaved[..total],
        )?;

        if frame.channels == out_channels {
            return Ok(&self.interleaved[..total]);
        }
        remix_into(
            &self.interleaved[..total],
            frame.channels,
            out_channels,
            &mut self.remixed,
        );
        Ok(&self.remixed)
    }

    /// Give the scratch memory back
    pub fn release(&mut self) {
        self.interleaved = Vec::new();
        self.remixed = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::frame::FrameId;

    fn planar_frame(channels: usize, samples: usize, stride: usize) -> AudioFrame {
        let mut data = vec![0.0; channels * stride];
        for ch in 0..channels {
            for i in 0..samples {
                data[ch * stride + i] = (ch * 100 + i) as f32;
            }
        }
        AudioFrame {
            id: FrameId(1),
            sample_rate: 48000,
            channels,
            samples,
            timecode: 0,
            data,
            channel_stride_in_bytes: stride * 4,
            metadata: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_planar_to_interleaved() {
        let planar = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let mut out = [0.0; 6];
        planar_to_interleaved(&planar, 2, 3, 3, &mut out).unwrap();
        assert_eq!(out, [1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn test_padded_stride() {
        let frame = planar_frame(2, 2, 4);
        let mut interleaver = AudioInterleaver::new();
        let out = interleaver.convert(&frame, 2).unwrap();
        assert_eq!(out, &[0.0f32, 100.0, 1.0, 101.0][..]);
    }

    #[test]
    fn test_malformed_frames_rejected() {
        let mut out = [0.0; 8];
        assert!(planar_to_interleaved(&[0.0; 3], 2, 2, 2, &mut out).is_err());
        assert!(planar_to_interleaved(&[0.0; 8], 2, 4, 2, &mut out).is_err());
        assert!(planar_to_interleaved(&[0.0; 8], 0, 4, 4, &mut out).is_err());
    }

    #[test]
    fn test_remix_stereo_to_quad_sums() {
        let input = [0.25, 0.5, -1.0, 0.75];
        let mut out = Vec::new();
        remix_into(&input, 2, 4, &mut out);
        assert_eq!(out, vec![0.75, 0.75, 0.75, 0.75, -0.25, -0.25, -0.25, -0.25]);
    }

    #[test]
    fn test_remix_to_mono_and_passthrough() {
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = Vec::new();
        remix_into(&input, 3, 1, &mut out);
        assert_eq!(out, vec![6.0, 15.0]);

        remix_into(&input, 2, 2, &mut out);
        assert_eq!(out, input.to_vec());
    }

    #[test]
    fn test_scratch_grows_only_when_needed() {
        let mut interleaver = AudioInterleaver::new();
        interleaver.convert(&planar_frame(2, 64, 64), 2).unwrap();
        interleaver.convert(&planar_frame(2, 32, 32), 2).unwrap();
        interleaver.convert(&planar_frame(2, 64, 64), 2).unwrap();
        assert_eq!(interleaver.grow_events(), 1);
        assert_eq!(interleaver.scratch_len(), 128);

        interleaver.convert(&planar_frame(4, 64, 64), 2).unwrap();
        assert_eq!(interleaver.grow_events(), 2);

        interleaver.release();
        assert_eq!(interleaver.scratch_len(), 0);
    }
}
