//! Stationary noise reduction by spectral gating
//!
//! A per-frequency noise threshold is estimated from the whole clip
//! (mean + `n_std_thresh` standard deviations of the dB magnitude). STFT bins
//! above the threshold are kept, the rest are attenuated by `prop_decrease`.
//! The binary mask is smoothed over frequency and time before it is applied.

use std::sync::Arc;
use ndarray::Array1;
use rustfft::{Fft, FftPlanner};
use rustfft::num_complex::Complex;
use crate::audio::AudioBuffer;
use crate::config::NoiseReductionConfig;
use crate::error::{AudioOptimizerError, Result};

/// Dynamic range kept below the loudest bin when converting to dB
const TOP_DB: f64 = 80.0;
const AMP_FLOOR: f64 = 1e-10;
const WSS_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Default)]
pub struct NoiseReducer {
    config: NoiseReductionConfig,
}

/// Parameters resolved for one clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateParams {
    pub fft_size: usize,
    pub hop: usize,
    pub chunk_size: usize,
    pub n_grad_freq: usize,
    pub n_grad_time: usize,
}

impl NoiseReducer {
    pub fn new(config: NoiseReductionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NoiseReductionConfig {
        &self.config
    }

    /// Clamp window sizes to the clip: at most one second per chunk and
    /// never an FFT longer than the signal
    pub fn params_for(&self, len: usize, sample_rate: u32) -> GateParams {
        let fft_size = self.config.max_fft_size.min(len).max(1);
        let hop = (fft_size / 4).max(1);
        let chunk_size = len.min(sample_rate as usize).max(1);

        let bin_hz = sample_rate as f32 / (fft_size as f32 / 2.0);
        let frame_ms = hop as f32 / sample_rate as f32 * 1000.0;
        // smoothing never reaches past the spectrum or the clip
        let bins = fft_size / 2 + 1;
        let frames = len / hop + 1;
        let n_grad_freq = ((self.config.freq_mask_smooth_hz / bin_hz).max(0.0) as usize).min(bins - 1);
        let n_grad_time = ((self.config.time_mask_smooth_ms / frame_ms).max(0.0) as usize).min(frames);

        GateParams { fft_size, hop, chunk_size, n_grad_freq, n_grad_time }
    }

    /// Output has exactly as many samples as the input
    pub fn reduce(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        let samples = buffer
            .mono()
            .ok_or_else(|| AudioOptimizerError::processing("Noise reduction expects mono input"))?;
        if samples.is_empty() {
            return Err(AudioOptimizerError::processing("Noise reduction input is empty"));
        }

        let signal: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
        let params = self.params_for(signal.len(), buffer.sample_rate());
        let stft = Stft::new(params.fft_size, params.hop);

        let threshold = self.noise_threshold(&stft, &signal);
        let freq_kernel = triangle(params.n_grad_freq);
        let time_kernel = triangle(params.n_grad_time);
        let prop = self.config.prop_decrease as f64;

        let mut output = vec![0.0f64; signal.len()];
        let context = params.fft_size;
        let mut start = 0;
        while start < signal.len() {
            let end = (start + params.chunk_size).min(signal.len());
            let lo = start.saturating_sub(context);
            let hi = (end + context).min(signal.len());

            let segment = &signal[lo..hi];
            let mut frames = stft.analyze(segment);
            let mut mask = signal_mask(&frames, &threshold);
            smooth_mask(&mut mask, &freq_kernel, &time_kernel);

            for (frame, frame_mask) in frames.iter_mut().zip(mask.iter()) {
                let n = frame.len();
                for (k, &m) in frame_mask.iter().enumerate() {
                    let gain = m * prop + (1.0 - prop);
                    frame[k] *= gain;
                    if k != 0 && n - k != k {
                        frame[n - k] *= gain;
                    }
                }
            }

            let rebuilt = stft.synthesize(frames, segment);
            output[start..end].copy_from_slice(&rebuilt[start - lo..end - lo]);
            start = end;
        }

        let samples: Array1<f32> = output.into_iter().map(|x| x as f32).collect();
        Ok(buffer.with_mono(samples))
    }

    /// Per-bin dB threshold from the clip's own statistics.
    ///
    /// Streams over the frames twice (peak, then moments) instead of holding
    /// the whole spectrogram of a long recording.
    fn noise_threshold(&self, stft: &Stft, signal: &[f64]) -> Vec<f64> {
        let peak = stft
            .frames(signal)
            .flat_map(|f| magnitudes_db(&f))
            .fold(f64::NEG_INFINITY, f64::max);
        let floor = peak - TOP_DB;

        let bins = stft.bins();
        let mut sum = vec![0.0; bins];
        let mut sum_sq = vec![0.0; bins];
        let mut count = 0.0;
        for frame in stft.frames(signal) {
            for ((s, q), v) in sum.iter_mut().zip(sum_sq.iter_mut()).zip(magnitudes_db(&frame)) {
                let v = v.max(floor);
                *s += v;
                *q += v * v;
            }
            count += 1.0;
        }

        let n_std = self.config.n_std_thresh as f64;
        sum.iter()
            .zip(&sum_sq)
            .map(|(s, q)| {
                let mean = s / count;
                let std = (q / count - mean * mean).max(0.0).sqrt();
                mean + n_std * std
            })
            .collect()
    }
}

fn magnitudes_db(frame: &[Complex<f64>]) -> Vec<f64> {
    frame[..frame.len() / 2 + 1]
        .iter()
        .map(|c| 20.0 * c.norm().max(AMP_FLOOR).log10())
        .collect()
}

/// Magnitudes of the non-negative bins in dB, floored `TOP_DB` below the peak
fn to_db(frames: &[Vec<Complex<f64>>]) -> Vec<Vec<f64>> {
    let mut db: Vec<Vec<f64>> = frames.iter().map(|f| magnitudes_db(f)).collect();

    let peak = db.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    for v in db.iter_mut().flatten() {
        *v = v.max(floor);
    }
    db
}

fn signal_mask(frames: &[Vec<Complex<f64>>], threshold: &[f64]) -> Vec<Vec<f64>> {
    to_db(frames)
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(threshold)
                .map(|(&v, &t)| if v > t { 1.0 } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Triangular kernel of length `2n + 1`, peak 1
fn triangle(n: usize) -> Vec<f64> {
    let n = n as i64;
    (-n..=n).map(|k| 1.0 - k.abs() as f64 / (n + 1) as f64).collect()
}

/// Zero-padded "same" convolution with the normalized outer product of both kernels
fn smooth_mask(mask: &mut [Vec<f64>], freq_kernel: &[f64], time_kernel: &[f64]) {
    if freq_kernel.len() == 1 && time_kernel.len() == 1 {
        return;
    }
    let norm: f64 = freq_kernel.iter().sum::<f64>() * time_kernel.iter().sum::<f64>();

    for row in mask.iter_mut() {
        *row = convolve_same(row, freq_kernel);
    }

    let frames = mask.len();
    let bins = mask.first().map_or(0, |r| r.len());
    for k in 0..bins {
        let column: Vec<f64> = mask.iter().map(|r| r[k]).collect();
        let smoothed = convolve_same(&column, time_kernel);
        for t in 0..frames {
            mask[t][k] = smoothed[t] / norm;
        }
    }
}

fn convolve_same(data: &[f64], kernel: &[f64]) -> Vec<f64> {
    let half = (kernel.len() / 2) as i64;
    let len = data.len() as i64;
    (0..len)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, &w)| {
                    let idx = i + half - j as i64;
                    (0..len).contains(&idx).then(|| w * data[idx as usize])
                })
                .sum()
        })
        .collect()
}

/// Centered short-time Fourier transform with a periodic Hann window
struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Stft {
    fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            n_fft,
            hop,
            window: hann(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    fn pad(&self) -> usize {
        self.n_fft / 2
    }

    fn frame_count(&self, len: usize) -> usize {
        let padded = len + 2 * self.pad();
        1 + padded.saturating_sub(self.n_fft).div_ceil(self.hop)
    }

    fn padded_len(&self, len: usize) -> usize {
        (self.frame_count(len) - 1) * self.hop + self.n_fft
    }

    fn analyze(&self, signal: &[f64]) -> Vec<Vec<Complex<f64>>> {
        self.frames(signal).collect()
    }

    fn frames(&self, signal: &[f64]) -> impl Iterator<Item = Vec<Complex<f64>>> + '_ {
        let pad = self.pad();
        let mut padded = vec![0.0; self.padded_len(signal.len())];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        (0..self.frame_count(signal.len()))
            .map(move |t| {
                let start = t * self.hop;
                let mut frame: Vec<Complex<f64>> = padded[start..start + self.n_fft]
                    .iter()
                    .zip(&self.window)
                    .map(|(&x, &w)| Complex::new(x * w, 0.0))
                    .collect();
                self.forward.process(&mut frame);
                frame
            })
    }

    /// Weighted overlap-add; samples with no window coverage keep their input value
    fn synthesize(&self, frames: Vec<Vec<Complex<f64>>>, original: &[f64]) -> Vec<f64> {
        let total = self.padded_len(original.len());
        let mut acc = vec![0.0; total];
        let mut wss = vec![0.0; total];
        let scale = 1.0 / self.n_fft as f64;

        for (t, mut frame) in frames.into_iter().enumerate() {
            self.inverse.process(&mut frame);
            let start = t * self.hop;
            for (i, (c, &w)) in frame.iter().zip(&self.window).enumerate() {
                acc[start + i] += c.re * scale * w;
                wss[start + i] += w * w;
            }
        }

        let pad = self.pad();
        original
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let w = wss[pad + i];
                if w > WSS_FLOOR { acc[pad + i] / w } else { x }
            })
            .collect()
    }
}

fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn mono(samples: Vec<f32>, rate: u32) -> AudioBuffer {
        AudioBuffer::new_mono(rate, Array1::from(samples), AudioFormat::Float32).unwrap()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_params_are_clamped_for_short_clips() {
        let reducer = NoiseReducer::default();
        let p = reducer.params_for(300, 16000);
        assert_eq!(p.fft_size, 300);
        assert_eq!(p.chunk_size, 300);
        assert_eq!(p.hop, 75);

        let p = reducer.params_for(48000, 16000);
        assert_eq!(p.fft_size, 2048);
        assert_eq!(p.chunk_size, 16000);
        assert_eq!(p.hop, 512);
        assert_eq!(p.n_grad_freq, 32);
        assert_eq!(p.n_grad_time, 1);
    }

    #[test]
    fn test_smoothing_is_bounded_at_low_rates() {
        let reducer = NoiseReducer::default();
        for rate in [1u32, 7, 300] {
            let p = reducer.params_for(rate as usize * 20, rate);
            assert!(p.n_grad_freq <= p.fft_size / 2, "rate {}", rate);
            assert!(p.n_grad_time <= rate as usize * 20 / p.hop + 1, "rate {}", rate);
        }

        let samples: Vec<f32> = (0..140).map(|i| ((i * 5 % 13) as f32 - 6.0) * 0.02).collect();
        let out = reducer.reduce(mono(samples, 7)).unwrap();
        assert_eq!(out.len(), 140);
        assert!(out.mono().unwrap().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_short_clips_keep_length() {
        let reducer = NoiseReducer::default();
        for len in [1usize, 2, 3, 17, 500, 2047] {
            let samples: Vec<f32> = (0..len).map(|i| ((i * 7 % 11) as f32 - 5.0) * 0.01).collect();
            let out = reducer.reduce(mono(samples, 16000)).unwrap();
            assert_eq!(out.len(), len);
            assert!(out.mono().unwrap().iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn test_stationary_noise_is_attenuated() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<f32> = (0..32000).map(|_| rng.gen_range(-0.1f32..0.1)).collect();
        let before = rms(&noise);

        let out = NoiseReducer::default().reduce(mono(noise, 16000)).unwrap();
        let after = rms(out.mono().unwrap().as_slice().unwrap());
        assert!(after < before * 0.6, "before {} after {}", before, after);
    }

    #[test]
    fn test_zero_decrease_is_near_identity() {
        let config = NoiseReductionConfig { prop_decrease: 0.0, ..Default::default() };
        let samples: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let out = NoiseReducer::new(config).reduce(mono(samples.clone(), 16000)).unwrap();
        for (a, b) in out.mono().unwrap().iter().zip(&samples) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_rejects_stereo() {
        let stereo = ndarray::Array2::zeros((10, 2));
        let buffer = AudioBuffer::new_stereo(16000, stereo, AudioFormat::Float32).unwrap();
        assert!(NoiseReducer::default().reduce(buffer).is_err());
    }

    #[test]
    fn test_triangle_kernel() {
        assert_eq!(triangle(0), vec![1.0]);
        assert_eq!(triangle(1), vec![0.5, 1.0, 0.5]);
    }
}
