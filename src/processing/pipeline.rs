//! Audio optimization pipeline
//!
//! Runs the fixed stage chain on one recording:
//! load -> verify -> standardize -> denoise -> band-pass -> loudness -> write.
//! Every transforming stage is timed by the [`PerformanceRecorder`]; the first
//! non-recoverable failure aborts the run and is returned wrapped with the
//! name of the stage it came from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{debug, error, info};
use crate::audio::{AudioBuffer, FormatStandardizer, Loader, Writer};
use crate::config::Config;
use crate::error::{AudioOptimizerError, Result};
use super::denoise::NoiseReducer;
use super::filter::FrequencyFilter;
use super::loudness::{LoudnessNormalizer, LoudnessOutcome};
use super::memory::MemoryProbe;
use super::performance::{PerformanceRecorder, StageMetric};

pub const AUDIO_LOADING: &str = "audio_loading";
pub const VERIFICATION: &str = "verification";
pub const FORMAT_STANDARDIZATION: &str = "format_standardization";
pub const NOISE_REDUCTION: &str = "noise_reduction";
pub const FREQUENCY_FILTERING: &str = "frequency_filtering";
pub const LOUDNESS_NORMALIZATION: &str = "loudness_normalization";
pub const SAVING_RESULT: &str = "saving_result";

/// Timed stages of a run, in execution order
pub const TIMED_STAGES: [&str; 5] = [
    FORMAT_STANDARDIZATION,
    NOISE_REDUCTION,
    FREQUENCY_FILTERING,
    LOUDNESS_NORMALIZATION,
    SAVING_RESULT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Verifying,
    Standardizing,
    Denoising,
    Filtering,
    Normalizing,
    Writing,
    Done,
    Failed,
}

impl PipelineState {
    /// Stage name recorded for this state, if any
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            PipelineState::Loading => Some(AUDIO_LOADING),
            PipelineState::Verifying => Some(VERIFICATION),
            PipelineState::Standardizing => Some(FORMAT_STANDARDIZATION),
            PipelineState::Denoising => Some(NOISE_REDUCTION),
            PipelineState::Filtering => Some(FREQUENCY_FILTERING),
            PipelineState::Normalizing => Some(LOUDNESS_NORMALIZATION),
            PipelineState::Writing => Some(SAVING_RESULT),
            PipelineState::Idle | PipelineState::Done | PipelineState::Failed => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What the loudness stage did
#[derive(Debug, Clone, PartialEq)]
pub enum LoudnessStatus {
    Normalized { measured_lufs: f64, gain_db: f64 },
    Fallback { reason: String },
}

/// Everything a successful run produced; the only input to report generation
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Timed stages in invocation order
    pub stages: Vec<StageMetric>,
    pub total_time: Duration,
    pub loudness: LoudnessStatus,
    pub output_sample_rate: u32,
    pub output_samples: usize,
}

#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    recorder: PerformanceRecorder,
    standardizer: FormatStandardizer,
    reducer: NoiseReducer,
    filter: FrequencyFilter,
    normalizer: LoudnessNormalizer,
    writer: Writer,
    state: PipelineState,
}

impl Pipeline {
    /// Validates the config and creates the output directory
    pub fn new(config: Config) -> Result<Self> {
        Self::with_recorder(config, PerformanceRecorder::new())
    }

    pub fn with_probe(config: Config, probe: Box<dyn MemoryProbe>) -> Result<Self> {
        Self::with_recorder(config, PerformanceRecorder::with_probe(probe))
    }

    fn with_recorder(config: Config, recorder: PerformanceRecorder) -> Result<Self> {
        config.validate()?;
        let writer = Writer::new(&config.output_dir)?;

        debug!("Pipeline output directory: {}", writer.output_dir().display());

        Ok(Self {
            standardizer: FormatStandardizer::new(config.target_sample_rate()),
            reducer: NoiseReducer::new(config.noise_reduction.clone()),
            filter: FrequencyFilter::new(config.filter.clone()),
            normalizer: LoudnessNormalizer::new(config.loudness.clone()),
            writer,
            recorder,
            config,
            state: PipelineState::Idle,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn recorder(&self) -> &PerformanceRecorder {
        &self.recorder
    }

    /// Process one file. Metrics of any previous run are discarded.
    pub fn run<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RunSummary> {
        let input_path = input_path.as_ref();
        self.state = PipelineState::Idle;
        self.recorder.begin_run();
        info!("Processing {}", input_path.display());

        match self.execute(input_path) {
            Ok(summary) => {
                self.transition(PipelineState::Done);
                info!(
                    "Finished in {:.2}s: {}",
                    summary.total_time.as_secs_f64(),
                    summary.output_path.display()
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Pipeline failed in stage '{}': {}", e.stage().unwrap_or("unknown"), e);
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self, input_path: &Path) -> Result<RunSummary> {
        self.transition(PipelineState::Loading);
        let buffer = Loader::load(input_path).map_err(in_stage(AUDIO_LOADING))?;

        self.transition(PipelineState::Verifying);
        Loader::verify(&buffer).map_err(in_stage(VERIFICATION))?;

        self.transition(PipelineState::Standardizing);
        let standardizer = &self.standardizer;
        let buffer = self
            .recorder
            .measure(FORMAT_STANDARDIZATION, || standardizer.standardize(buffer))
            .map_err(in_stage(FORMAT_STANDARDIZATION))?;

        self.transition(PipelineState::Denoising);
        let reducer = &self.reducer;
        let buffer = self
            .recorder
            .measure(NOISE_REDUCTION, || reducer.reduce(buffer))
            .map_err(in_stage(NOISE_REDUCTION))?;

        self.transition(PipelineState::Filtering);
        let filter = &self.filter;
        let buffer = self
            .recorder
            .measure(FREQUENCY_FILTERING, || filter.apply(buffer))
            .map_err(in_stage(FREQUENCY_FILTERING))?;

        self.transition(PipelineState::Normalizing);
        let normalizer = &self.normalizer;
        let outcome = self
            .recorder
            .measure(LOUDNESS_NORMALIZATION, || Ok(normalizer.normalize(buffer)))
            .map_err(in_stage(LOUDNESS_NORMALIZATION))?;
        let (loudness, buffer) = split_outcome(outcome);

        self.transition(PipelineState::Writing);
        let output_sample_rate = buffer.sample_rate();
        let output_samples = buffer.len();
        let writer = &self.writer;
        let output_path = self
            .recorder
            .measure(SAVING_RESULT, || writer.write(buffer, input_path))
            .map_err(in_stage(SAVING_RESULT))?;

        let total_time = self.recorder.finish_run()?;

        Ok(RunSummary {
            input_path: input_path.to_path_buf(),
            output_path,
            stages: self.recorder.metrics().to_vec(),
            total_time,
            loudness,
            output_sample_rate,
            output_samples,
        })
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("State: {} -> {}", self.state, next);
        self.state = next;
    }
}

fn in_stage(stage: &'static str) -> impl FnOnce(AudioOptimizerError) -> AudioOptimizerError {
    move |e| AudioOptimizerError::in_stage(stage, e)
}

fn split_outcome(outcome: LoudnessOutcome) -> (LoudnessStatus, AudioBuffer) {
    match outcome {
        LoudnessOutcome::Normalized { buffer, measured_lufs, gain_db } => {
            (LoudnessStatus::Normalized { measured_lufs, gain_db }, buffer)
        }
        LoudnessOutcome::Fallback { buffer, reason } => (LoudnessStatus::Fallback { reason }, buffer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::f64::consts::PI;
    use tempfile::TempDir;

    fn write_sine(path: &Path, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let s = 0.4 * (2.0 * PI * 440.0 * i as f64 / rate as f64).sin();
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn config_in(dir: &TempDir) -> Config {
        Config {
            output_dir: dir.path().join("out"),
            ..Config::default()
        }
    }

    #[test]
    fn test_new_creates_output_dir() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(config_in(&dir)).unwrap();
        assert!(dir.path().join("out").is_dir());
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.filter.highcut = 100.0;
        let err = Pipeline::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_run_records_timed_stages_in_order() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("voice.wav");
        write_sine(&input, 16000, 16000);

        let mut pipeline = Pipeline::new(config_in(&dir)).unwrap();
        let summary = pipeline.run(&input).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        let names: Vec<_> = summary.stages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, TIMED_STAGES);
        assert!(summary.stages.iter().all(|m| m.succeeded));
        assert!(summary.stages.iter().all(|m| m.duration <= summary.total_time));
        assert_eq!(summary.output_path, dir.path().join("out").join("optimized_voice.wav"));
        assert!(summary.output_path.exists());
        assert_eq!(summary.output_samples, 16000);
        assert!(matches!(summary.loudness, LoudnessStatus::Normalized { .. }));
    }

    #[test]
    fn test_short_clip_uses_loudness_fallback() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("blip.wav");
        write_sine(&input, 16000, 1000);

        let mut pipeline = Pipeline::new(config_in(&dir)).unwrap();
        let summary = pipeline.run(&input).unwrap();
        assert!(matches!(summary.loudness, LoudnessStatus::Fallback { .. }));
        assert_eq!(summary.stages.len(), TIMED_STAGES.len());
        assert_eq!(summary.output_samples, 1000);
    }

    #[test]
    fn test_missing_input_fails_in_loading() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = Pipeline::new(config_in(&dir)).unwrap();
        let err = pipeline.run(dir.path().join("absent.wav")).unwrap_err();

        assert_eq!(err.stage(), Some(AUDIO_LOADING));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.recorder().metrics().is_empty());
        assert!(pipeline.recorder().total_time().is_none());
    }

    #[test]
    fn test_sequential_runs_do_not_mix_metrics() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("voice.wav");
        write_sine(&input, 16000, 8000);

        let mut pipeline = Pipeline::new(config_in(&dir)).unwrap();
        pipeline.run(&input).unwrap();
        let second = pipeline.run(&input).unwrap();
        assert_eq!(second.stages.len(), TIMED_STAGES.len());
        assert_eq!(second.stages[0].index, 0);
    }

    #[test]
    fn test_state_stage_names() {
        assert_eq!(PipelineState::Denoising.stage_name(), Some(NOISE_REDUCTION));
        assert_eq!(PipelineState::Done.stage_name(), None);
        assert_eq!(PipelineState::Writing.to_string(), "Writing");
    }
}
