//! Response shapes returned by the records API.

use serde::{Deserialize, Deserializer};

use emission_core::metadata::TestMetadata;
use emission_core::types::TestId;

/// Standard response envelope: `{success, id?, data?, error?, recommendation?}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub id: Option<TestId>,
    pub data: Option<T>,
    pub error: Option<String>,
    pub recommendation: Option<serde_json::Value>,
}

/// One stored test as listed by `GET /tests`.
///
/// Numeric columns may arrive as JSON numbers or as decimal strings,
/// depending on how the service serializes its database rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestRecord {
    pub id: TestId,
    #[serde(flatten)]
    pub metadata: TestMetadata,
    #[serde(rename = "avg_mq135", default, deserialize_with = "lenient_f64")]
    pub mean_a: f64,
    #[serde(rename = "avg_mq7", default, deserialize_with = "lenient_f64")]
    pub mean_b: f64,
    #[serde(rename = "max_mq135", default, deserialize_with = "lenient_f64")]
    pub max_a: f64,
    #[serde(rename = "max_mq7", default, deserialize_with = "lenient_f64")]
    pub max_b: f64,
    #[serde(rename = "test_duration", default, deserialize_with = "lenient_u64")]
    pub duration_seconds: u64,
    /// Storage timestamp as reported by the service.
    #[serde(rename = "timestamp", default)]
    pub recorded_at: Option<String>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let secs = lenient_f64(deserializer)?;
    Ok(if secs.is_finite() && secs > 0.0 { secs as u64 } else { 0 })
}
