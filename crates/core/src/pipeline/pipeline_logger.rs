use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for an inference run: progress, stage timings, metrics, and
/// status lines.
///
/// The use case reports through this trait only, so the CLI and library
/// callers pick their own output.
pub trait PipelineLogger: Send {
    /// Report frame-level progress. `total` is 0 when the frame count is
    /// not known up front, which is the normal case for streamed videos.
    fn progress(&mut self, current: usize, total: usize);

    /// Wall time of one named stage (`predict`, `save`) for one chunk.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// One sample of a named metric such as `batch_chunks`.
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-pipeline summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
///
/// Used by library callers with their own reporting and by tests where
/// logger output is irrelevant.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count, sum, and extremes of one recorded series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageStats {
    pub count: usize,
    pub total: f64,
    pub min: f64,
    pub max: f64,
}

impl StageStats {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            total: value,
            min: value,
            max: value,
        }
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

fn record(series: &mut BTreeMap<String, StageStats>, name: &str, value: f64) {
    match series.get_mut(name) {
        Some(stats) => stats.record(value),
        None => {
            series.insert(name.to_string(), StageStats::first(value));
        }
    }
}

/// CLI-oriented logger: emits throttled progress through `log` and keeps
/// per-stage timing and metric statistics for an end-of-run report.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, StageStats>,
    metrics: BTreeMap<String, StageStats>,
    started: Instant,
    frames_processed: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            frames_processed: 0,
        }
    }

    /// The end-of-run report, or `None` when nothing was timed or measured.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let frames = self.frames_processed;

        let mut report = vec![format!(
            "Inference summary ({frames} frames, {elapsed:.1}s total):"
        )];
        for (stage, stats) in &self.timings {
            let share = if elapsed > 0.0 {
                stats.total / (elapsed * 10.0)
            } else {
                0.0
            };
            report.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms  ({share:4.1}%)",
                stats.mean(),
                stats.max,
                stats.total
            ));
        }
        for (name, stats) in &self.metrics {
            report.push(format!(
                "  {name}: avg {:.1} (min {}, max {})",
                stats.mean(),
                stats.min,
                stats.max
            ));
        }
        if frames > 0 && elapsed > 0.0 {
            report.push(format!("  Throughput: {:.1} fps", frames as f64 / elapsed));
        }
        Some(report.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&StageStats> {
        self.timings.get(stage)
    }

    pub fn metrics_for(&self, name: &str) -> Option<&StageStats> {
        self.metrics.get(name)
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        let step = self.throttle_frames;
        let crossed = current / step > self.frames_processed / step;
        self.frames_processed = current;
        match total {
            0 if crossed => log::info!("Processing: {current} frames"),
            0 => {}
            _ if crossed || current == total => {
                let pct = current as f64 / total as f64 * 100.0;
                log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
            }
            _ => {}
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        record(&mut self.timings, stage, duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        record(&mut self.metrics, name, value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(report) = self.summary_string() {
            log::info!("\n\n{report}");
        }
    }
}
