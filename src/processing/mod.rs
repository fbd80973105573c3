//! Audio Optimization Pipeline

pub mod memory;
pub mod performance;
pub mod denoise;
pub mod filter;
pub mod loudness;
pub mod pipeline;
pub mod report;

pub use memory::{MemoryProbe, ProcessMemoryProbe};
pub use performance::{PerformanceRecorder, StageMetric, TOTAL_TIME};
pub use denoise::{NoiseReducer, GateParams};
pub use filter::FrequencyFilter;
pub use loudness::{LoudnessNormalizer, LoudnessOutcome, measure_loudness};
pub use pipeline::{Pipeline, PipelineState, RunSummary, LoudnessStatus, TIMED_STAGES};
pub use report::{ReportGenerator, PipelineReport, StageReport};
