//! Channel mixdown and band-limited sample rate conversion

use ndarray::{Array1, ArrayView1};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use crate::audio::AudioBuffer;
use crate::error::{AudioOptimizerError, Result};

/// Brings any buffer to mono at the canonical rate
#[derive(Debug, Clone)]
pub struct FormatStandardizer {
    target_rate: u32,
}

impl Default for FormatStandardizer {
    fn default() -> Self {
        Self { target_rate: 16000 }
    }
}

impl FormatStandardizer {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn standardize(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        if self.target_rate == 0 {
            return Err(AudioOptimizerError::processing("Target sample rate cannot be 0"));
        }

        let mono = buffer.data().to_mono();
        let samples = if buffer.sample_rate() != self.target_rate {
            resample(mono.view(), buffer.sample_rate(), self.target_rate)?
        } else {
            mono
        };

        AudioBuffer::new_mono(self.target_rate, samples, buffer.format())
    }
}

/// Output length of a rate conversion: `floor(len * to / from)`
pub fn resampled_len(len: usize, from: u32, to: u32) -> usize {
    (len as u128 * to as u128 / from as u128) as usize
}

/// Fourier-domain resampling of a real signal.
///
/// The spectrum is truncated (downsampling) or zero-padded (upsampling) to the
/// new length; an even-length Nyquist bin is split or folded so the result stays real.
pub fn resample(data: ArrayView1<f32>, from: u32, to: u32) -> Result<Array1<f32>> {
    if from == 0 || to == 0 {
        return Err(AudioOptimizerError::processing("Sample rates must be greater than 0"));
    }
    if data.is_empty() {
        return Err(AudioOptimizerError::processing("Input data is empty"));
    }

    let n = data.len();
    let m = resampled_len(n, from, to);
    if m == 0 {
        return Err(AudioOptimizerError::processing(format!(
            "Resampling {} samples from {} Hz to {} Hz leaves no samples", n, from, to
        )));
    }
    if m == n {
        return Ok(data.to_owned());
    }

    let mut planner = FftPlanner::<f64>::new();

    let mut spectrum: Vec<Complex<f64>> = data.iter().map(|&x| Complex::new(x as f64, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    let n_min = n.min(m);
    let nyq = n_min / 2 + 1;
    let mut out = vec![Complex::new(0.0, 0.0); m];
    out[..nyq].copy_from_slice(&spectrum[..nyq]);

    if n_min % 2 == 0 {
        if m < n {
            out[n_min / 2] *= 2.0;
        } else {
            out[n_min / 2] *= 0.5;
        }
    }

    // Hermitian completion; DC and an even Nyquist bin are real
    out[0].im = 0.0;
    if m % 2 == 0 {
        out[m / 2].im = 0.0;
    }
    for k in 1..=(m - 1) / 2 {
        out[m - k] = out[k].conj();
    }

    planner.plan_fft_inverse(m).process(&mut out);

    let norm = 1.0 / n as f64;
    Ok(out.iter().map(|c| (c.re * norm) as f32).collect())
}
