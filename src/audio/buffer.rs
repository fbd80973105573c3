//! In-flight audio value passed between pipeline stages

use hound::SampleFormat;
use ndarray::{Array1, Array2, Axis};
use crate::error::{AudioOptimizerError, Result};

/// Sample encoding of the source file, reused when the result is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Int8,
    Int16,
    Int24,
    Int32,
    Float32,
}

impl AudioFormat {
    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::Int8 => "int8",
            AudioFormat::Int16 => "int16",
            AudioFormat::Int24 => "int24",
            AudioFormat::Int32 => "int32",
            AudioFormat::Float32 => "float32",
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            AudioFormat::Int8 => 8,
            AudioFormat::Int16 => 16,
            AudioFormat::Int24 => 24,
            AudioFormat::Int32 | AudioFormat::Float32 => 32,
        }
    }

    pub fn to_sample_format(self) -> SampleFormat {
        match self {
            AudioFormat::Float32 => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }

    pub fn from_spec(spec: &hound::WavSpec) -> Result<Self> {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => Ok(AudioFormat::Float32),
            (SampleFormat::Int, 8) => Ok(AudioFormat::Int8),
            (SampleFormat::Int, 16) => Ok(AudioFormat::Int16),
            (SampleFormat::Int, 24) => Ok(AudioFormat::Int24),
            (SampleFormat::Int, 32) => Ok(AudioFormat::Int32),
            (format, bits) => Err(AudioOptimizerError::io(format!(
                "Unsupported sample encoding: {:?} {}-bit", format, bits
            ))),
        }
    }

    /// Full-scale value for integer encodings
    pub fn int_scale(&self) -> f32 {
        (1i64 << (self.bits_per_sample() - 1)) as f32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioData {
    Mono(Array1<f32>),
    /// One row per frame, one column per channel
    Stereo(Array2<f32>),
}

impl AudioData {
    /// Number of frames
    pub fn len(&self) -> usize {
        match self {
            AudioData::Mono(data) => data.len(),
            AudioData::Stereo(data) => data.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> u16 {
        match self {
            AudioData::Mono(_) => 1,
            AudioData::Stereo(_) => 2,
        }
    }

    /// Arithmetic mean across channels, one value per frame
    pub fn to_mono(&self) -> Array1<f32> {
        match self {
            AudioData::Mono(data) => data.clone(),
            AudioData::Stereo(data) => data
                .mean_axis(Axis(1))
                .unwrap_or_else(|| Array1::zeros(data.nrows())),
        }
    }
}

/// Samples plus sample rate. Each stage consumes one buffer and returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    format: AudioFormat,
    data: AudioData,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, data: AudioData, format: AudioFormat) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioOptimizerError::validation("Sample rate cannot be 0"));
        }
        Ok(Self { sample_rate, format, data })
    }

    pub fn new_mono(sample_rate: u32, data: Array1<f32>, format: AudioFormat) -> Result<Self> {
        Self::new(sample_rate, AudioData::Mono(data), format)
    }

    pub fn new_stereo(sample_rate: u32, data: Array2<f32>, format: AudioFormat) -> Result<Self> {
        if data.ncols() != 2 {
            return Err(AudioOptimizerError::validation("Stereo data must have 2 columns"));
        }
        Self::new(sample_rate, AudioData::Stereo(data), format)
    }

    /// Same rate and encoding, new mono samples
    pub fn with_mono(&self, samples: Array1<f32>) -> Self {
        Self {
            sample_rate: self.sample_rate,
            format: self.format,
            data: AudioData::Mono(samples),
        }
    }

    /// Apply `f` to every sample, keeping layout, rate and encoding
    pub fn map_samples<F>(self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        let data = match self.data {
            AudioData::Mono(d) => AudioData::Mono(d.mapv(&f)),
            AudioData::Stereo(d) => AudioData::Stereo(d.mapv(&f)),
        };
        Self { data, ..self }
    }

    pub fn data(&self) -> &AudioData {
        &self.data
    }

    pub fn into_data(self) -> AudioData {
        self.data
    }

    /// Samples of a mono buffer
    pub fn mono(&self) -> Option<&Array1<f32>> {
        match &self.data {
            AudioData::Mono(data) => Some(data),
            AudioData::Stereo(_) => None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.data.channels()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format() {
        assert_eq!(AudioFormat::Int16.name(), "int16");
        assert_eq!(AudioFormat::Int16.bits_per_sample(), 16);
        assert_eq!(AudioFormat::Int24.int_scale(), 8_388_608.0);
        assert_eq!(AudioFormat::Float32.to_sample_format(), SampleFormat::Float);
    }

    #[test]
    fn test_format_from_spec_rejects_float64() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 64,
            sample_format: SampleFormat::Float,
        };
        assert!(AudioFormat::from_spec(&spec).is_err());
    }

    #[test]
    fn test_stereo_mixdown_is_mean() {
        let stereo = AudioData::Stereo(Array2::from(vec![[0.2, 0.4], [-1.0, 1.0], [0.5, 0.0]]));
        let mono = stereo.to_mono();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
        assert!((mono[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_buffer_accessors() {
        let buffer = AudioBuffer::new_mono(16000, Array1::zeros(8000), AudioFormat::Float32).unwrap();
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.len(), 8000);
        assert!((buffer.duration() - 0.5).abs() < f64::EPSILON);
        assert!(buffer.mono().is_some());
    }

    #[test]
    fn test_invalid_buffers() {
        assert!(AudioBuffer::new_mono(0, Array1::zeros(4), AudioFormat::Int16).is_err());
        let three_cols = Array2::from(vec![[0.1, 0.2, 0.3]]);
        assert!(AudioBuffer::new_stereo(16000, three_cols, AudioFormat::Int16).is_err());
    }
}
