use std::collections::HashMap;
use std::time::Instant;

/// Observer for per-frame loop events.
///
/// Keeps timing and metrics collection out of the loop body so hosts can
/// choose between silent operation and periodic reports.
pub trait LoopLogger: Send {
    /// Called once per loop iteration.
    fn iteration(&mut self);

    /// Record how long a named stage took in one iteration.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. published fps).
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-loop summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullLoopLogger;

impl LoopLogger for NullLoopLogger {
    fn iteration(&mut self) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Aggregates stage timings and metrics and logs a summary when the loop exits.
pub struct StatsLoopLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    iterations: usize,
}

impl StatsLoopLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            iterations: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.iterations == 0 && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Loop summary ({} iterations, {:.1}s total):",
            self.iterations,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len() as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StatsLoopLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopLogger for StatsLoopLogger {
    fn iteration(&mut self) {
        self.iterations += 1;
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullLoopLogger;
        logger.iteration();
        logger.timing("detect", 5.0);
        logger.metric("fps", 30.0);
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StatsLoopLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect"), Some(&[20.0, 30.0][..]));
        assert_eq!(logger.timings_for("render"), Some(&[5.0][..]));
        assert!(logger.timings_for("missing").is_none());
    }

    #[test]
    fn test_summary_includes_stages_and_metrics() {
        let mut logger = StatsLoopLogger::new();
        for _ in 0..3 {
            logger.iteration();
        }
        logger.timing("detect", 10.0);
        logger.timing("detect", 30.0);
        logger.metric("fps", 28.0);
        logger.metric("fps", 31.0);

        let summary = logger.summary_string().unwrap();

        assert!(summary.contains("3 iterations"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("max   30.0ms"));
        assert!(summary.contains("fps: avg 29.5"));
    }

    #[test]
    fn test_metric_average() {
        let mut logger = StatsLoopLogger::new();
        logger.metric("fps", 3.0);
        logger.metric("fps", 4.0);
        let values = logger.metrics_for("fps").unwrap();
        assert_relative_eq!(values.iter().sum::<f64>() / values.len() as f64, 3.5);
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StatsLoopLogger::new().summary_string().is_none());
    }
}
