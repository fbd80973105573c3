//! Performance Recording Module
//!
//! Records wall-clock time and resident memory around each pipeline stage.
//! Metrics are kept in invocation order and addressed by a per-run
//! invocation index, so a repeated stage name never replaces an earlier entry.

use std::time::{Duration, Instant};
use log::debug;
use crate::error::{AudioOptimizerError, Result};
use super::memory::{MemoryProbe, ProcessMemoryProbe};

/// Name of the synthetic whole-run metric
pub const TOTAL_TIME: &str = "total_time";

/// Timing and memory snapshot of one completed stage
#[derive(Debug, Clone)]
pub struct StageMetric {
    /// Invocation index within the run, unique and increasing
    pub index: usize,
    pub name: String,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Resident memory before the stage (MB)
    pub memory_before: f64,
    /// Resident memory after the stage (MB)
    pub memory_after: f64,
    pub succeeded: bool,
}

impl StageMetric {
    pub fn memory_delta(&self) -> f64 {
        self.memory_after - self.memory_before
    }
}

#[derive(Debug)]
struct OpenStage {
    index: usize,
    name: String,
    start_time: Instant,
    memory_before: f64,
}

/// Per-run stage recorder
#[derive(Debug)]
pub struct PerformanceRecorder {
    probe: Box<dyn MemoryProbe>,
    metrics: Vec<StageMetric>,
    open: Vec<OpenStage>,
    next_index: usize,
    run_start: Option<Instant>,
    total_time: Option<Duration>,
}

impl PerformanceRecorder {
    /// Recorder backed by the process RSS probe
    pub fn new() -> Self {
        Self::with_probe(Box::new(ProcessMemoryProbe))
    }

    pub fn with_probe(probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            metrics: Vec::new(),
            open: Vec::new(),
            next_index: 0,
            run_start: None,
            total_time: None,
        }
    }

    /// Clear all metrics and mark the start of a new run
    pub fn begin_run(&mut self) {
        self.reset();
        self.run_start = Some(Instant::now());
    }

    /// Record the synthetic total over the whole run
    pub fn finish_run(&mut self) -> Result<Duration> {
        let start = self.run_start
            .ok_or_else(|| AudioOptimizerError::processing("Run was never started"))?;
        let total = start.elapsed();
        self.total_time = Some(total);
        debug!("{}: {:.3}s", TOTAL_TIME, total.as_secs_f64());
        Ok(total)
    }

    /// Capture start time and memory for a stage; returns its invocation index
    pub fn begin(&mut self, stage_name: &str) -> usize {
        let index = self.next_index;
        self.next_index += 1;

        let memory_before = self.probe.usage_mb();
        self.open.push(OpenStage {
            index,
            name: stage_name.to_string(),
            start_time: Instant::now(),
            memory_before,
        });
        index
    }

    /// Close the most recently opened stage with this name
    pub fn finish(&mut self, stage_name: &str) -> Result<&StageMetric> {
        self.finish_with(stage_name, true)
    }

    fn finish_with(&mut self, stage_name: &str, succeeded: bool) -> Result<&StageMetric> {
        let pos = self.open.iter().rposition(|s| s.name == stage_name).ok_or_else(|| {
            AudioOptimizerError::processing(format!("Stage '{}' was never started", stage_name))
        })?;
        let open = self.open.remove(pos);

        let end_time = Instant::now();
        let memory_after = self.probe.usage_mb();
        let metric = StageMetric {
            index: open.index,
            name: open.name,
            start_time: open.start_time,
            end_time,
            duration: end_time.duration_since(open.start_time),
            memory_before: open.memory_before,
            memory_after,
            succeeded,
        };

        debug!(
            "{} #{}: {:.3}s, memory {:+.2} MB",
            metric.name,
            metric.index,
            metric.duration.as_secs_f64(),
            metric.memory_delta()
        );

        let insert_at = self.metrics.partition_point(|m| m.index < metric.index);
        self.metrics.insert(insert_at, metric);
        Ok(&self.metrics[insert_at])
    }

    /// Run `f` bracketed by `begin`/`finish`; a failed stage is still recorded
    pub fn measure<F, R>(&mut self, stage_name: &str, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        self.begin(stage_name);
        let result = f();
        self.finish_with(stage_name, result.is_ok())?;
        result
    }

    /// Completed metrics in invocation order
    pub fn metrics(&self) -> &[StageMetric] {
        &self.metrics
    }

    /// Latest completed metric with this name
    pub fn get(&self, stage_name: &str) -> Option<&StageMetric> {
        self.metrics.iter().rev().find(|m| m.name == stage_name)
    }

    pub fn total_time(&self) -> Option<Duration> {
        self.total_time
    }

    pub fn reset(&mut self) {
        self.metrics.clear();
        self.open.clear();
        self.next_index = 0;
        self.run_start = None;
        self.total_time = None;
    }
}

impl Default for PerformanceRecorder {
    fn default() -> Self {
        Self::new()
    }
}
