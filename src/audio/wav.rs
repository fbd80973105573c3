//! WAV file loading and result persistence

use std::fs;
use std::path::{Path, PathBuf};
use hound::{SampleFormat, WavReader, WavWriter};
use log::info;
use ndarray::{Array1, Array2};
use crate::audio::{AudioBuffer, AudioData, AudioFormat};
use crate::error::{AudioOptimizerError, Result};

/// Prefix of every persisted result file
pub const OUTPUT_PREFIX: &str = "optimized_";

/// Reads a recording into an [`AudioBuffer`]
pub struct Loader;

impl Loader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
        let path = path.as_ref();

        let mut reader = WavReader::open(path).map_err(|e| {
            AudioOptimizerError::io(format!("Cannot open audio file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let format = AudioFormat::from_spec(&spec)?;

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AudioOptimizerError::io(format!("Failed to read sample: {}", e)))?,
            SampleFormat::Int => {
                let scale = format.int_scale();
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| AudioOptimizerError::io(format!("Failed to read sample: {}", e)))?
            }
        };

        let data = match spec.channels {
            1 => AudioData::Mono(Array1::from(samples)),
            2 => {
                let frames = samples.len() / 2;
                let mut stereo = Array2::zeros((frames, 2));
                for (i, chunk) in samples.chunks_exact(2).enumerate() {
                    stereo[[i, 0]] = chunk[0];
                    stereo[[i, 1]] = chunk[1];
                }
                AudioData::Stereo(stereo)
            }
            n => {
                return Err(AudioOptimizerError::io(format!(
                    "Only mono or stereo audio supported, got {} channels", n
                )));
            }
        };

        AudioBuffer::new(spec.sample_rate, data, format)
            .map_err(|e| AudioOptimizerError::io(format!("Invalid WAV header in {}: {}", path.display(), e)))
    }

    /// Rejects empty recordings and logs a short summary of the rest
    pub fn verify(buffer: &AudioBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Err(AudioOptimizerError::validation("Audio file contains no samples"));
        }

        info!(
            "Audio: {} Hz, {} samples ({:.2} s), {} channel(s)",
            buffer.sample_rate(),
            buffer.len(),
            buffer.duration(),
            buffer.channels()
        );

        Ok(())
    }
}

/// Persists the final buffer as `optimized_<basename>` inside the output directory
#[derive(Debug, Clone)]
pub struct Writer {
    output_dir: PathBuf,
}

impl Writer {
    /// Creates the output directory if it does not exist yet
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| {
            AudioOptimizerError::io(format!(
                "Cannot create output directory {}: {}", output_dir.display(), e
            ))
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path_for(&self, input_path: &Path) -> Result<PathBuf> {
        let basename = input_path.file_name().ok_or_else(|| {
            AudioOptimizerError::io(format!("Input path has no file name: {}", input_path.display()))
        })?;
        let mut name = std::ffi::OsString::from(OUTPUT_PREFIX);
        name.push(basename);
        Ok(self.output_dir.join(name))
    }

    /// Writes the buffer and returns the path of the new file.
    ///
    /// Samples go to a hidden `.part` file that is renamed once finalized, so
    /// a failed write never leaves a truncated result under the final name.
    pub fn write(&self, buffer: AudioBuffer, input_path: &Path) -> Result<PathBuf> {
        let output_path = self.output_path_for(input_path)?;
        fs::create_dir_all(&self.output_dir)?;
        let part_path = part_path_for(&output_path);

        let written = write_wav(&part_path, buffer).and_then(|_| {
            fs::rename(&part_path, &output_path).map_err(|e| {
                AudioOptimizerError::io(format!("Cannot create output file {}: {}", output_path.display(), e))
            })
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&part_path);
            return Err(e);
        }
        Ok(output_path)
    }
}

fn part_path_for(output_path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(output_path.file_name().unwrap_or_default());
    name.push(".part");
    output_path.with_file_name(name)
}

fn write_wav(path: &Path, buffer: AudioBuffer) -> Result<()> {
    let format = buffer.format();
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: format.bits_per_sample(),
        sample_format: format.to_sample_format(),
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| {
        AudioOptimizerError::io(format!("Cannot create output file {}: {}", path.display(), e))
    })?;

    // logical iteration order of a (frames, channels) array is interleaved
    let interleaved: Vec<f32> = match buffer.data() {
        AudioData::Mono(data) => data.iter().copied().collect(),
        AudioData::Stereo(data) => data.iter().copied().collect(),
    };
    drop(buffer);

    let scale = format.int_scale() as f64;
    for sample in interleaved {
        let result = if spec.sample_format == SampleFormat::Float {
            writer.write_sample(sample)
        } else {
            let clamped = sample.clamp(-1.0, 1.0) as f64;
            let quantized = (clamped * scale).round().clamp(-scale, scale - 1.0) as i32;
            writer.write_sample(quantized)
        };
        result.map_err(|e| AudioOptimizerError::io(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AudioOptimizerError::io(format!("Failed to finalize WAV writing: {}", e)))
}
