//! Summary statistics over a completed session.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::reading::DisplaySample;
use crate::thresholds::{Channel, Severity, ThresholdConfig};

/// Per-channel mean and maximum of a session, rounded to two decimals.
///
/// Field names on the wire follow the stored test record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(rename = "avg_mq135")]
    pub mean_a: f64,
    #[serde(rename = "avg_mq7")]
    pub mean_b: f64,
    #[serde(rename = "max_mq135")]
    pub max_a: f64,
    #[serde(rename = "max_mq7")]
    pub max_b: f64,
    #[serde(rename = "test_duration")]
    pub duration_seconds: u64,
}

impl AggregateResult {
    /// Severity of each channel's mean, for history and report views.
    pub fn mean_severity(&self, thresholds: &ThresholdConfig) -> (Severity, Severity) {
        (
            thresholds.classify(self.mean_a, Channel::A),
            thresholds.classify(self.mean_b, Channel::B),
        )
    }
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the session summary over every accepted sample.
///
/// Fails with [`SessionError::EmptySession`] when `samples` is empty.
pub fn summarize(
    samples: &[DisplaySample],
    duration_seconds: u64,
) -> Result<AggregateResult, SessionError> {
    if samples.is_empty() {
        return Err(SessionError::EmptySession);
    }

    let count = samples.len() as f64;
    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    let (mut max_a, mut max_b) = (f64::MIN, f64::MIN);

    for s in samples {
        sum_a += s.channel_a;
        sum_b += s.channel_b;
        max_a = max_a.max(s.channel_a);
        max_b = max_b.max(s.channel_b);
    }

    Ok(AggregateResult {
        mean_a: round2(sum_a / count),
        mean_b: round2(sum_b / count),
        max_a: round2(max_a),
        max_b: round2(max_b),
        duration_seconds,
    })
}

/// Format seconds as `m:ss`.
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
