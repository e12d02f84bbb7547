use std::time::Duration;

/// Percentile summary of recorded latencies, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Statistics collector for classification latency
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    samples_us: Vec<f64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples_us: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples_us.push(latency.as_secs_f64() * 1_000_000.0);
    }

    pub fn len(&self) -> usize {
        self.samples_us.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples_us.is_empty()
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx]
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        if self.samples_us.is_empty() {
            return None;
        }

        let mut values = self.samples_us.clone();
        values.sort_by(|a, b| a.total_cmp(b));

        let to_ms = |us: f64| us / 1000.0;
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        Some(LatencySummary {
            samples: values.len(),
            mean_ms: to_ms(mean),
            p50_ms: to_ms(Self::percentile(&values, 50.0)),
            p95_ms: to_ms(Self::percentile(&values, 95.0)),
            p99_ms: to_ms(Self::percentile(&values, 99.0)),
            max_ms: to_ms(values[values.len() - 1]),
        })
    }

    /// Log a one-line latency report
    pub fn log_report(&self, label: &str) {
        match self.summary() {
            None => tracing::info!("{}: no timing data collected", label),
            Some(s) => tracing::info!(
                "{}: {} samples | mean {:.1}ms | p50 {:.1}ms | p95 {:.1}ms | p99 {:.1}ms | max {:.1}ms",
                label,
                s.samples,
                s.mean_ms,
                s.p50_ms,
                s.p95_ms,
                s.p99_ms,
                s.max_ms
            ),
        }
    }
}
