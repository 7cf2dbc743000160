use std::time::{Duration, TryFromFloatSecsError};

use serde::{Deserialize, Serialize};

/// One reading taken at one polling instant.
pub type Sample = f64;

/// Readings in poll order for a single measured invocation.
pub type Series = Vec<Sample>;

/// The persisted unit of one measurement: the series collected while the
/// operation ran, plus its wall-clock duration.
///
/// On the wire a record is a two-element JSON array,
/// `[[s0, s1, ...], duration_secs]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct Record {
    series: Series,
    duration: Duration,
}

impl Record {
    pub fn new(series: Series, duration: Duration) -> Self {
        Self { series, duration }
    }

    pub fn series(&self) -> &[Sample] {
        &self.series
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Fails on NaN or infinite samples, which JSON cannot carry back.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        if let Some(bad) = self.series.iter().find(|v| !v.is_finite()) {
            return Err(serde::ser::Error::custom(format!(
                "sample {bad} cannot be encoded"
            )));
        }
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// ─── Wire form ───────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct WireRecord(Series, f64);

impl From<Record> for WireRecord {
    fn from(r: Record) -> Self {
        WireRecord(r.series, r.duration.as_secs_f64())
    }
}

impl TryFrom<WireRecord> for Record {
    type Error = TryFromFloatSecsError;

    fn try_from(w: WireRecord) -> Result<Self, Self::Error> {
        Ok(Record {
            series: w.0,
            duration: Duration::try_from_secs_f64(w.1)?,
        })
    }
}
