use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for one job's pipeline run.
///
/// Keeps the use case free of output concerns: the job manager reports
/// through `log`, tests discard everything.
pub trait PipelineLogger: Send {
    /// Frames decoded so far; `total` is `None` when the container does not
    /// report a frame count.
    fn progress(&mut self, current: usize, total: Option<usize>);

    /// Time spent in a named stage, accumulated across calls.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// How many items survived a stage (peaks, candidates, stored frames).
    fn stage_count(&mut self, stage: &str, count: usize);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: Option<usize>) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn stage_count(&mut self, _stage: &str, _count: usize) {}
}

/// Reports through the `log` facade, prefixed with the job id.
///
/// Progress is throttled to every `throttle_frames` frames.
pub struct LogPipelineLogger {
    job_id: String,
    throttle_frames: usize,
    timings: BTreeMap<String, (usize, f64)>,
    counts: Vec<(String, usize)>,
    start_time: Instant,
    frames: usize,
}

impl LogPipelineLogger {
    pub fn new(job_id: impl Into<String>, throttle_frames: usize) -> Self {
        Self {
            job_id: job_id.into(),
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            counts: Vec::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.counts.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "[{}] Selection summary ({} frames, {:.1}s total):",
            self.job_id,
            self.frames,
            elapsed_ms / 1000.0
        )];

        for (stage, (calls, total_ms)) in &self.timings {
            let avg_ms = total_ms / (*calls).max(1) as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({calls} calls)"
            ));
        }
        for (stage, count) in &self.counts {
            lines.push(format!("  {stage}: {count}"));
        }
        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }
        Some(lines.join("\n"))
    }

    #[cfg(test)]
    fn count_for(&self, stage: &str) -> Option<usize> {
        self.counts
            .iter()
            .rev()
            .find(|(name, _)| name == stage)
            .map(|(_, c)| *c)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, current: usize, total: Option<usize>) {
        self.frames = current;
        if current % self.throttle_frames != 0 && Some(current) != total {
            return;
        }
        match total {
            Some(total) if total > 0 => {
                let pct = current as f64 / total as f64 * 100.0;
                log::info!("[{}] Scanned {current}/{total} frames ({pct:.1}%)", self.job_id);
            }
            _ => log::info!("[{}] Scanned {current} frames", self.job_id),
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        let entry = self.timings.entry(stage.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += duration_ms;
    }

    fn stage_count(&mut self, stage: &str, count: usize) {
        log::info!("[{}] {stage}: {count}", self.job_id);
        self.counts.push((stage.to_string(), count));
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
