//! Configuration management for the optimization pipeline

use crate::error::{AudioOptimizerError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub noise_reduction: NoiseReductionConfig,
    pub filter: FilterConfig,
    pub loudness: LoudnessConfig,
    pub output_dir: PathBuf,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseReductionConfig {
    /// Fraction of the gated noise that is removed (0.0 - 1.0)
    pub prop_decrease: f32,
    /// Upper bound for the STFT size; short clips shrink it further
    pub max_fft_size: usize,
    /// Standard deviations above the mean noise level a bin must exceed to count as signal
    pub n_std_thresh: f32,
    pub freq_mask_smooth_hz: f32,
    pub time_mask_smooth_ms: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub lowcut: f64,
    pub highcut: f64,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    pub target_lufs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            noise_reduction: NoiseReductionConfig::default(),
            filter: FilterConfig::default(),
            loudness: LoudnessConfig::default(),
            output_dir: PathBuf::from("optimized_audio"),
            verbose: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { target_sample_rate: 16000 }
    }
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        Self {
            prop_decrease: 0.75,
            max_fft_size: 2048,
            n_std_thresh: 1.5,
            freq_mask_smooth_hz: 500.0,
            time_mask_smooth_ms: 50.0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lowcut: 300.0,
            highcut: 3400.0,
            order: 5,
        }
    }
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self { target_lufs: -23.0 }
    }
}

impl Config {
    /// Get target sample rate (convenience method)
    pub fn target_sample_rate(&self) -> u32 {
        self.audio.target_sample_rate
    }

    /// Get target loudness in LUFS (convenience method)
    pub fn target_loudness(&self) -> f64 {
        self.loudness.target_lufs
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "audio-optimizer", about = "Speech audio optimization pipeline with performance analysis", version)]
pub struct Args {
    #[arg(help = "Input WAV file, or a directory whose first WAV file is processed")]
    pub input: PathBuf,

    #[arg(short = 'o', long = "output-dir", help = "Directory for optimized output")]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'r', long = "sample-rate", help = "Target sample rate (Hz)")]
    pub sample_rate: Option<u32>,

    #[arg(long = "target-loudness", allow_hyphen_values = true, help = "Target integrated loudness (LUFS)")]
    pub target_loudness: Option<f64>,

    #[arg(long = "lowcut", help = "Band-pass low cutoff (Hz)")]
    pub lowcut: Option<f64>,

    #[arg(long = "highcut", help = "Band-pass high cutoff (Hz)")]
    pub highcut: Option<f64>,

    #[arg(long = "prop-decrease", help = "Noise reduction proportion (0.0 - 1.0)")]
    pub prop_decrease: Option<f32>,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,

    #[arg(long = "json", help = "Print the performance report as JSON")]
    pub json: bool,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,
}

impl Config {
    /// Create config from command line arguments and config file
    pub fn from_args_and_config(args: &Args) -> Result<Self> {
        // First load config file (if provided)
        let mut config = match &args.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // Command line arguments override config file settings
        if let Some(dir) = &args.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(rate) = args.sample_rate {
            config.audio.target_sample_rate = rate;
        }
        if let Some(lufs) = args.target_loudness {
            config.loudness.target_lufs = lufs;
        }
        if let Some(lowcut) = args.lowcut {
            config.filter.lowcut = lowcut;
        }
        if let Some(highcut) = args.highcut {
            config.filter.highcut = highcut;
        }
        if let Some(prop) = args.prop_decrease {
            config.noise_reduction.prop_decrease = prop;
        }
        config.verbose |= args.verbose;

        config.validate()?;
        Ok(config)
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AudioOptimizerError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AudioOptimizerError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate configuration parameter validity
    pub fn validate(&self) -> Result<()> {
        if self.audio.target_sample_rate == 0 {
            return Err(AudioOptimizerError::config("Sample rate must be greater than 0"));
        }
        if self.audio.target_sample_rate > 192000 {
            return Err(AudioOptimizerError::config("Sample rate cannot exceed 192000 Hz"));
        }

        let nr = &self.noise_reduction;
        if !(0.0..=1.0).contains(&nr.prop_decrease) {
            return Err(AudioOptimizerError::config("Noise reduction proportion must be in range [0.0, 1.0]"));
        }
        if nr.max_fft_size == 0 {
            return Err(AudioOptimizerError::config("FFT size must be greater than 0"));
        }
        if !nr.n_std_thresh.is_finite() || nr.freq_mask_smooth_hz < 0.0 || nr.time_mask_smooth_ms < 0.0 {
            return Err(AudioOptimizerError::config("Invalid noise mask parameters"));
        }

        if !(self.filter.lowcut > 0.0) {
            return Err(AudioOptimizerError::config("Low cutoff must be greater than 0 Hz"));
        }
        if !(self.filter.highcut > self.filter.lowcut) {
            return Err(AudioOptimizerError::config("High cutoff must be above the low cutoff"));
        }
        if self.filter.order == 0 || self.filter.order > 10 {
            return Err(AudioOptimizerError::config("Filter order must be in range [1, 10]"));
        }

        if !self.loudness.target_lufs.is_finite() {
            return Err(AudioOptimizerError::config("Target loudness must be finite"));
        }

        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AudioOptimizerError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| AudioOptimizerError::config(format!("Failed to write config file: {}", e)))
    }
}
