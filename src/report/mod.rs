//! Downstream view over persisted records.
//!
//! Nothing here runs during a measurement. It reads back what the sinks
//! collected and condenses each operation's history into one line.

pub mod percentiles;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use crate::error::SinkReadError;
use crate::probe::ResourceKind;
use crate::record::Record;

pub use percentiles::PercentileSet;

// ─── Loading ─────────────────────────────────────────────────────

/// Every history stored under `kind`'s key prefix, keyed by operation
/// name (prefix stripped).
pub async fn load_usage_data(
    conn: &mut ConnectionManager,
    kind: ResourceKind,
) -> Result<BTreeMap<String, Vec<Record>>, SinkReadError> {
    let prefix = kind.key_prefix();
    let keys: Vec<String> = conn
        .keys(format!("{prefix}*"))
        .await
        .map_err(SinkReadError::Command)?;

    let mut data = BTreeMap::new();
    for key in keys {
        let raw: Vec<String> = conn
            .lrange(&key, 0, -1)
            .await
            .map_err(SinkReadError::Command)?;

        let runs = raw
            .iter()
            .map(|s| Record::from_json(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SinkReadError::Corrupt {
                key: key.clone(),
                source,
            })?;

        let name = key.strip_prefix(prefix).unwrap_or(&key).to_owned();
        data.insert(name, runs);
    }

    Ok(data)
}

// ─── Summaries ───────────────────────────────────────────────────

/// Condensed view of every run recorded for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub name: String,
    #[serde(skip)]
    pub kind: ResourceKind,
    pub runs: usize,
    pub mean_exec_secs: f64,
    /// Index-wise mean across runs; shorter runs drop out as they end.
    pub average_series: Vec<f64>,
    /// Median of each run's median.
    pub median: f64,
    pub peak: f64,
    pub floor: f64,
    pub distribution: PercentileSet,
}

impl UsageSummary {
    /// `None` when no run holds a single sample.
    pub fn from_runs(name: &str, kind: ResourceKind, runs: &[Record]) -> Option<Self> {
        let average_series = average_series(runs);
        if average_series.is_empty() {
            return None;
        }

        let mean_exec_secs =
            runs.iter().map(|r| r.duration().as_secs_f64()).sum::<f64>() / runs.len() as f64;

        let run_medians: Vec<f64> = runs
            .iter()
            .filter(|r| !r.series().is_empty())
            .map(|r| median(r.series()))
            .collect();

        let peak = average_series.iter().copied().fold(f64::MIN, f64::max);
        let floor = average_series.iter().copied().fold(f64::MAX, f64::min);

        Some(Self {
            name: name.to_owned(),
            kind,
            runs: runs.len(),
            mean_exec_secs,
            median: median(&run_medians),
            peak,
            floor,
            distribution: PercentileSet::from_samples(runs.iter().flat_map(|r| r.series())),
            average_series,
        })
    }

    pub fn delta(&self) -> f64 {
        self.peak - self.floor
    }
}

impl fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Cpu => write!(
                f,
                "{} (Exec Time: {:.2}s, Median: {:.2}%, P99: {:.2}%, Peak: {:.2}%)",
                self.name, self.mean_exec_secs, self.median, self.distribution.p99, self.peak
            ),
            ResourceKind::Ram => write!(
                f,
                "{} (Min: {:.2} MB, Max: {:.2} MB, Delta: {:.2} MB)",
                self.name,
                self.floor,
                self.peak,
                self.delta()
            ),
        }
    }
}

/// Summaries for every operation with at least one sample, by name.
pub fn summarize_all<'a, I>(data: I, kind: ResourceKind) -> Vec<UsageSummary>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<Record>)>,
{
    let mut out: Vec<UsageSummary> = data
        .into_iter()
        .filter_map(|(name, runs)| UsageSummary::from_runs(name, kind, runs))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Convenience over an in-memory snapshot.
pub fn summarize_snapshot(
    snapshot: &HashMap<String, Vec<Record>>,
    kind: ResourceKind,
) -> Vec<UsageSummary> {
    summarize_all(snapshot, kind)
}

// ─── Helpers ─────────────────────────────────────────────────────

fn average_series(runs: &[Record]) -> Vec<f64> {
    let max_len = runs.iter().map(|r| r.series().len()).max().unwrap_or(0);
    (0..max_len)
        .map(|i| {
            let (sum, n) = runs
                .iter()
                .filter_map(|r| r.series().get(i))
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            sum / n as f64
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rec(series: &[f64], ms: u64) -> Record {
        Record::new(series.to_vec(), Duration::from_millis(ms))
    }

    #[test]
    fn averages_index_wise_over_uneven_runs() {
        let runs = [rec(&[10.0, 20.0, 30.0], 300), rec(&[30.0, 40.0], 200)];
        assert_eq!(average_series(&runs), vec![20.0, 30.0, 30.0]);
    }

    #[test]
    fn median_of_medians() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn cpu_summary_label() {
        let runs = [rec(&[10.0, 20.0, 30.0], 400), rec(&[30.0, 40.0], 600)];
        let s = UsageSummary::from_runs("parse_pdf", ResourceKind::Cpu, &runs).unwrap();
        assert_eq!(s.runs, 2);
        assert!((s.mean_exec_secs - 0.5).abs() < 1e-9);
        assert_eq!(s.median, 27.5);
        assert_eq!(s.peak, 30.0);
        let label = s.to_string();
        assert!(label.starts_with("parse_pdf (Exec Time: 0.50s, Median: 27.50%"));
        assert!(label.ends_with("Peak: 30.00%)"));
    }

    #[test]
    fn ram_summary_label() {
        let runs = [rec(&[100.0, 150.0, 125.0], 100)];
        let s = UsageSummary::from_runs("load", ResourceKind::Ram, &runs).unwrap();
        assert_eq!(
            s.to_string(),
            "load (Min: 100.00 MB, Max: 150.00 MB, Delta: 50.00 MB)"
        );
    }

    #[test]
    fn runs_without_samples_are_skipped() {
        let mut data = HashMap::new();
        data.insert("empty".to_string(), vec![rec(&[], 5)]);
        data.insert("b".to_string(), vec![rec(&[1.0], 5)]);
        data.insert("a".to_string(), vec![rec(&[2.0], 5)]);
        let names: Vec<_> = summarize_snapshot(&data, ResourceKind::Cpu)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
