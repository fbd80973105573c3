//! Zero-phase Butterworth band-pass filtering

use ndarray::Array1;
use rustfft::num_complex::Complex;
use crate::audio::AudioBuffer;
use crate::config::FilterConfig;
use crate::error::{AudioOptimizerError, Result};

const MIN_NORMALIZED: f64 = 0.001;
const MAX_NORMALIZED: f64 = 0.99;
const IMAG_EPS: f64 = 1e-12;

/// Second-order section, `a[0] == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Steady-state transposed direct-form state for a unit step input
    fn step_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * gain;
        let z1 = self.b[1] - self.a[1] * gain + z2;
        [z1, z2]
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (self.a[0] + self.a[1] + self.a[2])
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrequencyFilter {
    config: FilterConfig,
}

impl FrequencyFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        let samples = buffer
            .mono()
            .ok_or_else(|| AudioOptimizerError::processing("Band-pass filter expects mono input"))?;

        let (low, high) = normalized_cutoffs(self.config.lowcut, self.config.highcut, buffer.sample_rate());
        let sections = butter_bandpass(self.config.order, low, high)?;

        let signal: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
        let filtered = sos_filtfilt(&sections, &signal);

        if filtered.iter().any(|x| !x.is_finite()) {
            return Err(AudioOptimizerError::processing("Band-pass filter produced non-finite samples"));
        }

        let out: Array1<f32> = filtered.into_iter().map(|x| x as f32).collect();
        Ok(buffer.with_mono(out))
    }
}

/// Cutoffs as fractions of Nyquist, clamped so the design stays valid at low rates
pub fn normalized_cutoffs(lowcut: f64, highcut: f64, sample_rate: u32) -> (f64, f64) {
    let nyquist = 0.5 * sample_rate as f64;
    let low = (lowcut / nyquist).min(MAX_NORMALIZED).max(MIN_NORMALIZED);
    let high = (highcut / nyquist).min(MAX_NORMALIZED).max(low + MIN_NORMALIZED);
    (low, high)
}

/// Digital Butterworth band-pass of the given prototype order as second-order sections.
///
/// `low` and `high` are normalized to Nyquist. The result has `order` sections
/// (filter order `2 * order`), each with one zero at z = 1 and one at z = -1.
pub fn butter_bandpass(order: usize, low: f64, high: f64) -> Result<Vec<Biquad>> {
    if order == 0 {
        return Err(AudioOptimizerError::processing("Filter order must be at least 1"));
    }
    if !(0.0 < low && low < high && high < 1.0) {
        return Err(AudioOptimizerError::processing(format!(
            "Invalid normalized band [{}, {}]", low, high
        )));
    }

    // pre-warp for the bilinear transform (fs = 2)
    let fs2 = 4.0;
    let wl = fs2 * (std::f64::consts::PI * low / 2.0).tan();
    let wh = fs2 * (std::f64::consts::PI * high / 2.0).tan();
    let bw = wh - wl;
    let wo2 = wl * wh;

    let n = order as i64;
    let mut analog = Vec::with_capacity(2 * order);
    for m in (-n + 1..n).step_by(2) {
        let theta = std::f64::consts::PI * m as f64 / (2 * n) as f64;
        let proto = -Complex::from_polar(1.0, theta);
        let p_lp = proto * (bw / 2.0);
        let root = (p_lp * p_lp - wo2).sqrt();
        analog.push(p_lp + root);
        analog.push(p_lp - root);
    }

    // bilinear transform: the `order` analog zeros at s = 0 land on z = 1,
    // the remaining `order` zeros at infinity on z = -1
    let poles: Vec<Complex<f64>> = analog.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    let denom: Complex<f64> = analog.iter().map(|&p| fs2 - p).product();
    let gain = ((bw * fs2).powi(order as i32) / denom).re;

    if poles.iter().any(|p| !p.re.is_finite() || !p.im.is_finite() || p.norm() >= 1.0) || !gain.is_finite() {
        return Err(AudioOptimizerError::processing("Unstable band-pass design"));
    }

    let upper: Vec<Complex<f64>> = poles.iter().copied().filter(|p| p.im > IMAG_EPS).collect();
    let lower = poles.iter().filter(|p| p.im < -IMAG_EPS).count();
    let mut real: Vec<f64> = poles.iter().filter(|p| p.im.abs() <= IMAG_EPS).map(|p| p.re).collect();
    if upper.len() != lower || real.len() % 2 != 0 {
        return Err(AudioOptimizerError::processing("Band-pass poles cannot be paired into sections"));
    }
    real.sort_by(|a, b| a.total_cmp(b));

    let mut sections: Vec<Biquad> = upper
        .iter()
        .map(|p| Biquad { b: [1.0, 0.0, -1.0], a: [1.0, -2.0 * p.re, p.norm_sqr()] })
        .chain(real.chunks_exact(2).map(|pair| Biquad {
            b: [1.0, 0.0, -1.0],
            a: [1.0, -(pair[0] + pair[1]), pair[0] * pair[1]],
        }))
        .collect();

    for coeff in sections[0].b.iter_mut() {
        *coeff *= gain;
    }

    Ok(sections)
}

/// Cascade the sections over `x`, starting from (and updating) `state`
fn sos_filter(sections: &[Biquad], x: &[f64], state: &mut [[f64; 2]]) -> Vec<f64> {
    let mut y = x.to_vec();
    for (s, z) in sections.iter().zip(state.iter_mut()) {
        for v in y.iter_mut() {
            let input = *v;
            let out = s.b[0] * input + z[0];
            z[0] = s.b[1] * input - s.a[1] * out + z[1];
            z[1] = s.b[2] * input - s.a[2] * out;
            *v = out;
        }
    }
    y
}

/// Initial states for a steady unit step through the whole cascade
fn sos_step_state(sections: &[Biquad]) -> Vec<[f64; 2]> {
    let mut scale = 1.0;
    sections
        .iter()
        .map(|s| {
            let [z1, z2] = s.step_state();
            let zi = [z1 * scale, z2 * scale];
            scale *= s.dc_gain();
            zi
        })
        .collect()
}

/// Forward-backward filtering with odd extension at both ends.
///
/// The extension length shrinks for signals too short for the nominal padding.
pub fn sos_filtfilt(sections: &[Biquad], x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let n = x.len();
    let padlen = (3 * (2 * sections.len() + 1)).min(n - 1);

    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));

    let zi = sos_step_state(sections);

    let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * ext[0], z[1] * ext[0]]).collect();
    let mut forward = sos_filter(sections, &ext, &mut state);

    forward.reverse();
    let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * forward[0], z[1] * forward[0]]).collect();
    let mut backward = sos_filter(sections, &forward, &mut state);
    backward.reverse();

    backward[padlen..padlen + n].to_vec()
}
