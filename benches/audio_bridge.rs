use criterion::{black_box, criterion_group, criterion_main, Criterion};

use media_receiver::audio::{AudioBridge, BridgeConfig, ChannelExpectation, RingBuffer};
use media_receiver::network::{AudioFrame, FrameId};

fn planar_frame(channels: usize, samples: usize) -> AudioFrame {
    AudioFrame {
        id: FrameId(1),
        sample_rate: 48000,
        channels,
        samples,
        timecode: 0,
        data: (0..channels * samples).map(|i| (i as f32 * 0.001).sin()).collect(),
        channel_stride_in_bytes: samples * 4,
        metadata: None,
        timestamp: 0,
    }
}

fn ring_buffer(c: &mut Criterion) {
    let mut buffer = RingBuffer::<f32>::new(32 * 1024);
    let block = vec![0.5f32; 2048];
    let mut out = vec![0.0f32; 2048];

    c.bench_function("ring_buffer_push_pop_2048", |b| {
        b.iter(|| {
            buffer.push_back(black_box(&block));
            buffer.pop_front_into(black_box(&mut out)).unwrap();
        })
    });
}

fn bridge(c: &mut Criterion) {
    let stereo = AudioBridge::new(BridgeConfig::default(), ChannelExpectation::new(48000, 2));
    let frame = planar_frame(2, 1024);
    let mut out = vec![0.0f32; 2048];

    c.bench_function("bridge_fill_and_read_stereo", |b| {
        b.iter(|| {
            stereo.fill_audio_buffer(black_box(&frame));
            stereo.handle_audio_filter_read(black_box(&mut out), 2);
        })
    });

    let surround = AudioBridge::new(BridgeConfig::default(), ChannelExpectation::new(48000, 6));
    let mut out = vec![0.0f32; 6144];

    c.bench_function("bridge_fill_and_read_remix_2_to_6", |b| {
        b.iter(|| {
            surround.fill_audio_buffer(black_box(&frame));
            surround.handle_audio_filter_read(black_box(&mut out), 6);
        })
    });
}

criterion_group!(benches, ring_buffer, bridge);
criterion_main!(benches);
