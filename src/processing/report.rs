//! Performance report of a completed run
//!
//! A report can only be built from a [`RunSummary`], which the pipeline hands
//! out exclusively for runs that reached the final stage.

use std::fmt;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use crate::error::{AudioOptimizerError, Result};
use super::performance::StageMetric;
use super::pipeline::{LoudnessStatus, RunSummary};

/// Formatted figures of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    #[serde(skip)]
    pub name: String,
    pub duration: String,
    pub memory_before: String,
    pub memory_after: String,
    pub memory_delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub processed_at: String,
    pub input_path: String,
    pub output_path: String,
    pub total_duration: String,
    /// Serialized as a map keyed by stage name, in invocation order
    #[serde(serialize_with = "ordered_stage_map")]
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured_loudness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_gain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness_fallback: Option<String>,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AudioOptimizerError::processing(format!("Failed to serialize report: {}", e)))
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Performance Report ===")?;
        writeln!(f, "Processed at: {}", self.processed_at)?;
        writeln!(f, "Input: {}", self.input_path)?;
        writeln!(f, "Output: {}", self.output_path)?;
        writeln!(f, "Total: {}", self.total_duration)?;
        for stage in &self.stages {
            writeln!(
                f,
                "  {:<24} {:>16}  memory {} -> {} ({})",
                stage.name, stage.duration, stage.memory_before, stage.memory_after, stage.memory_delta
            )?;
        }
        if let (Some(measured), Some(gain)) = (&self.measured_loudness, &self.applied_gain) {
            writeln!(f, "Loudness: {} (gain {})", measured, gain)?;
        }
        if let Some(reason) = &self.loudness_fallback {
            writeln!(f, "Loudness normalization skipped: {}", reason)?;
        }
        Ok(())
    }
}

fn ordered_stage_map<S>(stages: &[StageReport], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(stages.len()))?;
    for stage in stages {
        map.serialize_entry(&stage.name, stage)?;
    }
    map.end()
}

pub struct ReportGenerator;

impl ReportGenerator {
    /// Report stamped with the current local time
    pub fn generate(summary: &RunSummary) -> PipelineReport {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::generate_at(summary, now)
    }

    pub fn generate_at(summary: &RunSummary, processed_at: OffsetDateTime) -> PipelineReport {
        let (measured_loudness, applied_gain, loudness_fallback) = match &summary.loudness {
            LoudnessStatus::Normalized { measured_lufs, gain_db } => (
                Some(format!("{:.2} LUFS", measured_lufs)),
                Some(format!("{:+.2} dB", gain_db)),
                None,
            ),
            LoudnessStatus::Fallback { reason } => (None, None, Some(reason.clone())),
        };

        PipelineReport {
            processed_at: format_timestamp(processed_at),
            input_path: summary.input_path.display().to_string(),
            output_path: summary.output_path.display().to_string(),
            total_duration: format_seconds(summary.total_time.as_secs_f64()),
            stages: summary.stages.iter().map(stage_report).collect(),
            measured_loudness,
            applied_gain,
            loudness_fallback,
        }
    }
}

fn stage_report(metric: &StageMetric) -> StageReport {
    StageReport {
        name: metric.name.clone(),
        duration: format_seconds(metric.duration.as_secs_f64()),
        memory_before: format_mb(metric.memory_before),
        memory_after: format_mb(metric.memory_after),
        memory_delta: format_mb(metric.memory_delta()),
    }
}

fn format_seconds(secs: f64) -> String {
    format!("{:.2} Sekunden", secs)
}

fn format_mb(mb: f64) -> String {
    format!("{:.2} MB", mb)
}

fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(format).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use time::macros::datetime;

    fn metric(index: usize, name: &str, millis: u64, before: f64, after: f64) -> StageMetric {
        let start = Instant::now();
        StageMetric {
            index,
            name: name.to_string(),
            start_time: start,
            end_time: start + Duration::from_millis(millis),
            duration: Duration::from_millis(millis),
            memory_before: before,
            memory_after: after,
            succeeded: true,
        }
    }

    fn summary(loudness: LoudnessStatus) -> RunSummary {
        RunSummary {
            input_path: PathBuf::from("in/voice.wav"),
            output_path: PathBuf::from("out/optimized_voice.wav"),
            stages: vec![
                metric(0, "format_standardization", 120, 50.0, 62.5),
                metric(1, "noise_reduction", 340, 62.5, 60.0),
            ],
            total_time: Duration::from_millis(1234),
            loudness,
            output_sample_rate: 16000,
            output_samples: 16000,
        }
    }

    #[test]
    fn test_formats_figures() {
        let status = LoudnessStatus::Normalized { measured_lufs: -30.456, gain_db: 7.456 };
        let report = ReportGenerator::generate_at(&summary(status), datetime!(2024-03-05 14:07:09 UTC));

        assert_eq!(report.processed_at, "2024-03-05 14:07:09");
        assert_eq!(report.total_duration, "1.23 Sekunden");
        assert_eq!(report.output_path, PathBuf::from("out/optimized_voice.wav").display().to_string());

        let nr = report.stage("noise_reduction").unwrap();
        assert_eq!(nr.duration, "0.34 Sekunden");
        assert_eq!(nr.memory_before, "62.50 MB");
        assert_eq!(nr.memory_after, "60.00 MB");
        assert_eq!(nr.memory_delta, "-2.50 MB");

        assert_eq!(report.measured_loudness.as_deref(), Some("-30.46 LUFS"));
        assert_eq!(report.applied_gain.as_deref(), Some("+7.46 dB"));
        assert!(report.loudness_fallback.is_none());
        assert!(report.stage("total_time").is_none());
    }

    #[test]
    fn test_keeps_invocation_order() {
        let report = ReportGenerator::generate(&summary(LoudnessStatus::Fallback { reason: "silent".into() }));
        let names: Vec<_> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["format_standardization", "noise_reduction"]);
        assert_eq!(report.loudness_fallback.as_deref(), Some("silent"));
    }

    #[test]
    fn test_json_stage_map_is_ordered() {
        let report = ReportGenerator::generate(&summary(LoudnessStatus::Fallback { reason: "silent".into() }));
        let json = report.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stages"]["noise_reduction"]["memory_delta"], "-2.50 MB");
        assert_eq!(value["loudness_fallback"], "silent");
        assert!(value.get("applied_gain").is_none());

        let first = json.find("format_standardization").unwrap();
        let second = json.find("noise_reduction").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_text_rendering_lists_stages() {
        let report = ReportGenerator::generate(&summary(LoudnessStatus::Fallback { reason: "silent".into() }));
        let text = report.to_string();
        assert!(text.contains("format_standardization"));
        assert!(text.contains("1.23 Sekunden"));
        assert!(text.contains("Loudness normalization skipped: silent"));
    }
}
