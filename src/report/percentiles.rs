use hdrhistogram::Histogram;
use serde::Serialize;

/// Readings are stored in the histogram as hundredths of a unit.
const SCALE: f64 = 100.0;

/// Upper bound for one reading: 1 TB in MB, well above any percentage.
const HIST_HIGH: u64 = 100_000_000_000;
const HIST_SIGFIG: u8 = 3;

/// A percentile breakdown over every sample of every run.
#[derive(Debug, Clone, Serialize)]
pub struct PercentileSet {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: u64,
}

impl PercentileSet {
    /// Returns zeroed values if `samples` is empty.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a f64>) -> Self {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(1, HIST_HIGH, HIST_SIGFIG) else {
            return Self::empty();
        };

        for &s in samples {
            // Clamp to ≥ 1 so zero readings still count.
            let v = ((s.max(0.0) * SCALE).round() as u64).clamp(1, HIST_HIGH);
            let _ = hist.record(v);
        }

        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: unscale(hist.min()),
            max: unscale(hist.max()),
            mean: hist.mean() / SCALE,
            p50: unscale(hist.value_at_percentile(50.0)),
            p95: unscale(hist.value_at_percentile(95.0)),
            p99: unscale(hist.value_at_percentile(99.0)),
            count: hist.len(),
        }
    }

    /// All-zero placeholder for runs without samples.
    pub fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

fn unscale(v: u64) -> f64 {
    v as f64 / SCALE
}
