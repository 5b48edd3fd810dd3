//! Бенчмарк фазового вокодера на типичных длинах реплик

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use srt_sync::{AudioData, CancellationToken, PhaseVocoderStretcher};

fn speech_like(sample_rate: u32, seconds: f64) -> AudioData {
    let len = (sample_rate as f64 * seconds) as usize;
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * 180.0 * t).sin() * 0.4
                + (2.0 * std::f32::consts::PI * 540.0 * t).sin() * 0.1
        })
        .collect();
    AudioData::new(samples, sample_rate)
}

fn bench_stretch_ratios(c: &mut Criterion) {
    let vocoder = PhaseVocoderStretcher::default();
    let cancel = CancellationToken::new();
    let audio = speech_like(44100, 3.0);

    let mut group = c.benchmark_group("phase_vocoder_ratio");
    group.throughput(Throughput::Elements(audio.len() as u64));

    for ratio in [0.5, 0.8, 1.25, 2.0] {
        let target = audio.duration() * ratio;
        group.bench_with_input(BenchmarkId::from_parameter(ratio), &target, |b, &target| {
            b.iter(|| {
                vocoder
                    .stretch_blocking(black_box(&audio), target, &cancel)
                    .expect("растяжение")
            })
        });
    }

    group.finish();
}

fn bench_frame_sizes(c: &mut Criterion) {
    let cancel = CancellationToken::new();
    let audio = speech_like(44100, 2.0);
    let target = audio.duration() * 1.3;

    let mut group = c.benchmark_group("phase_vocoder_frame");
    for frame in [1024, 2048, 4096] {
        let vocoder = PhaseVocoderStretcher::new(frame);
        group.bench_with_input(BenchmarkId::from_parameter(frame), &vocoder, |b, vocoder| {
            b.iter(|| {
                vocoder
                    .stretch_blocking(black_box(&audio), target, &cancel)
                    .expect("растяжение")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stretch_ratios, bench_frame_sizes);
criterion_main!(benches);
