//! Performance benchmarks for the optimization stages

use audio_optimizer::audio::{AudioBuffer, AudioFormat, FormatStandardizer};
use audio_optimizer::processing::{FrequencyFilter, LoudnessNormalizer, NoiseReducer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array1, Array2};

fn speech_like(rate: u32, seconds: usize) -> Array1<f32> {
    (0..rate as usize * seconds)
        .map(|i| {
            let t = i as f32 / rate as f32;
            0.4 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 1800.0 * t).sin()
        })
        .collect()
}

fn bench_stages(c: &mut Criterion) {
    // 10 seconds of stereo at 44.1kHz
    let mono = speech_like(44100, 10);
    let stereo = Array2::from_shape_fn((mono.len(), 2), |(i, _)| mono[i]);
    let input = AudioBuffer::new_stereo(44100, stereo, AudioFormat::Int16).unwrap();

    let standardizer = FormatStandardizer::default();
    c.bench_function("format_standardization_10s", |b| {
        b.iter(|| standardizer.standardize(black_box(input.clone())).unwrap());
    });

    let standardized = standardizer.standardize(input.clone()).unwrap();

    let reducer = NoiseReducer::default();
    c.bench_function("noise_reduction_10s", |b| {
        b.iter(|| reducer.reduce(black_box(standardized.clone())).unwrap());
    });

    let filter = FrequencyFilter::default();
    c.bench_function("frequency_filtering_10s", |b| {
        b.iter(|| filter.apply(black_box(standardized.clone())).unwrap());
    });

    let normalizer = LoudnessNormalizer::default();
    c.bench_function("loudness_normalization_10s", |b| {
        b.iter(|| normalizer.normalize(black_box(standardized.clone())));
    });
}

criterion_group!(benches, bench_stages);
criterion_main!(benches);
