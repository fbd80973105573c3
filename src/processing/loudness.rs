//! EBU R128 loudness normalization
//!
//! The only stage with a recoverable failure: when the integrated loudness
//! cannot be measured (clip shorter than one gating block, silence, numeric
//! trouble) the input buffer is passed through unchanged and the reason is
//! reported as a [`LoudnessOutcome::Fallback`].

use ebur128::{EbuR128, Mode};
use log::{debug, warn};
use crate::audio::{AudioBuffer, AudioData};
use crate::config::LoudnessConfig;
use crate::error::{AudioOptimizerError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum LoudnessOutcome {
    Normalized {
        buffer: AudioBuffer,
        /// Integrated loudness of the input (LUFS)
        measured_lufs: f64,
        gain_db: f64,
    },
    /// Input returned untouched
    Fallback {
        buffer: AudioBuffer,
        reason: String,
    },
}

impl LoudnessOutcome {
    pub fn buffer(&self) -> &AudioBuffer {
        match self {
            Self::Normalized { buffer, .. } | Self::Fallback { buffer, .. } => buffer,
        }
    }

    pub fn into_buffer(self) -> AudioBuffer {
        match self {
            Self::Normalized { buffer, .. } | Self::Fallback { buffer, .. } => buffer,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Fallback { reason, .. } => Some(reason),
            Self::Normalized { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoudnessNormalizer {
    config: LoudnessConfig,
}

impl LoudnessNormalizer {
    pub fn new(config: LoudnessConfig) -> Self {
        Self { config }
    }

    pub fn target_lufs(&self) -> f64 {
        self.config.target_lufs
    }

    /// Never fails; a measurement problem yields `Fallback` with the original buffer
    pub fn normalize(&self, buffer: AudioBuffer) -> LoudnessOutcome {
        match self.gain_for(&buffer) {
            Ok((measured_lufs, gain_db)) => {
                debug!("Loudness {:.2} LUFS -> {:.2} LUFS ({:+.2} dB)", measured_lufs, self.config.target_lufs, gain_db);
                let buffer = apply_gain(buffer, gain_db);
                LoudnessOutcome::Normalized { buffer, measured_lufs, gain_db }
            }
            Err(e) => {
                warn!("Loudness normalization skipped: {}", e);
                LoudnessOutcome::Fallback { buffer, reason: e.to_string() }
            }
        }
    }

    fn gain_for(&self, buffer: &AudioBuffer) -> Result<(f64, f64)> {
        let measured = measure_loudness(buffer)?;
        if !measured.is_finite() {
            return Err(AudioOptimizerError::processing(format!(
                "Integrated loudness is not measurable ({} LUFS); clip too short or silent", measured
            )));
        }

        let gain_db = self.config.target_lufs - measured;
        let linear = 10f64.powf(gain_db / 20.0);
        if !linear.is_finite() || linear <= 0.0 {
            return Err(AudioOptimizerError::processing(format!("Degenerate gain {:.2} dB", gain_db)));
        }
        Ok((measured, gain_db))
    }
}

/// Integrated loudness (ITU-R BS.1770) of a mono or stereo buffer in LUFS.
///
/// Returns negative infinity when no gating block passes the absolute gate.
pub fn measure_loudness(buffer: &AudioBuffer) -> Result<f64> {
    let mut meter = EbuR128::new(buffer.channels() as u32, buffer.sample_rate(), Mode::I)
        .map_err(|e| AudioOptimizerError::processing(format!("Cannot create loudness meter: {}", e)))?;

    let interleaved: Vec<f32> = match buffer.data() {
        AudioData::Mono(data) => data.iter().copied().collect(),
        AudioData::Stereo(data) => data.iter().copied().collect(),
    };
    meter
        .add_frames_f32(&interleaved)
        .map_err(|e| AudioOptimizerError::processing(format!("Loudness measurement failed: {}", e)))?;

    meter
        .loudness_global()
        .map_err(|e| AudioOptimizerError::processing(format!("Loudness measurement failed: {}", e)))
}

fn apply_gain(buffer: AudioBuffer, gain_db: f64) -> AudioBuffer {
    let linear = 10f64.powf(gain_db / 20.0) as f32;
    buffer.map_samples(|x| x * linear)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use ndarray::{Array1, Array2};
    use std::f64::consts::PI;

    fn tone(amp: f64, rate: u32, len: usize) -> AudioBuffer {
        let data = Array1::from_iter((0..len).map(|i| (amp * (2.0 * PI * 1000.0 * i as f64 / rate as f64).sin()) as f32));
        AudioBuffer::new_mono(rate, data, AudioFormat::Float32).unwrap()
    }

    #[test]
    fn test_normalizes_to_target() {
        let normalizer = LoudnessNormalizer::default();
        let outcome = normalizer.normalize(tone(0.5, 16000, 32000));
        assert!(!outcome.is_fallback());

        let measured = measure_loudness(outcome.buffer()).unwrap();
        assert!((measured - -23.0).abs() < 0.1, "measured {}", measured);
        match outcome {
            LoudnessOutcome::Normalized { gain_db, measured_lufs, .. } => {
                assert!((measured_lufs + gain_db - -23.0).abs() < 1e-9);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_custom_target() {
        let normalizer = LoudnessNormalizer::new(LoudnessConfig { target_lufs: -16.0 });
        let outcome = normalizer.normalize(tone(0.05, 16000, 16000));
        let measured = measure_loudness(outcome.buffer()).unwrap();
        assert!((measured - -16.0).abs() < 0.1);
    }

    #[test]
    fn test_silence_falls_back_unchanged() {
        let input = AudioBuffer::new_mono(16000, Array1::from_elem(16000, 1e-9f32), AudioFormat::Float32).unwrap();
        let outcome = LoudnessNormalizer::default().normalize(input.clone());
        assert!(outcome.is_fallback());
        assert!(outcome.fallback_reason().is_some());
        assert_eq!(outcome.into_buffer(), input);
    }

    #[test]
    fn test_too_short_falls_back_unchanged() {
        // 100 ms is shorter than one 400 ms gating block
        let input = tone(0.5, 16000, 1600);
        let outcome = LoudnessNormalizer::default().normalize(input.clone());
        assert!(outcome.is_fallback());
        assert_eq!(outcome.buffer(), &input);
    }

    #[test]
    fn test_stereo_measurement() {
        let data = Array2::from_shape_fn((16000, 2), |(i, _)| (0.3 * (2.0 * PI * 1000.0 * i as f64 / 16000.0).sin()) as f32);
        let buffer = AudioBuffer::new_stereo(16000, data, AudioFormat::Float32).unwrap();
        let outcome = LoudnessNormalizer::default().normalize(buffer);
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.buffer().channels(), 2);
    }
}
