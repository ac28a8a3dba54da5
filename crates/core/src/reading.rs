//! Reading validation.
//!
//! Turns a loosely-typed `sensor-data` payload into a [`SensorReading`].
//! Missing, non-numeric, non-finite or negative channel values read as
//! zero and anything above [`MAX_CONCENTRATION_PPM`] is capped, so
//! transport glitches never reach the session buffers as spikes.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::Timestamp;

/// Ceiling applied to every channel value.
pub const MAX_CONCENTRATION_PPM: f64 = 1000.0;

/// Field names accepted for channel A, in lookup order.
const CHANNEL_A_KEYS: &[&str] = &["mq135_ppm", "channelA", "channel_a"];

/// Field names accepted for channel B, in lookup order.
const CHANNEL_B_KEYS: &[&str] = &["mq7_ppm", "channelB", "channel_b"];

/// Only this many leading characters of a string value are scanned.
const MAX_NUMERIC_STRING_LEN: usize = 64;

/// A validated two-channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub channel_a: f64,
    pub channel_b: f64,
    pub observed_at: Timestamp,
}

/// A [`SensorReading`] projected for display, with a local `HH:MM:SS` label.
///
/// Serializes in the shape the persistence collaborator stores as
/// `test_data` entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySample {
    #[serde(rename = "time")]
    pub time_label: String,
    #[serde(rename = "MQ135")]
    pub channel_a: f64,
    #[serde(rename = "MQ7")]
    pub channel_b: f64,
    #[serde(skip)]
    pub observed_at: Timestamp,
}

impl DisplaySample {
    pub fn from_reading(reading: &SensorReading) -> Self {
        let time_label = reading
            .observed_at
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();

        Self {
            time_label,
            channel_a: reading.channel_a,
            channel_b: reading.channel_b,
            observed_at: reading.observed_at,
        }
    }
}

/// Clamp a raw concentration into `[0, MAX_CONCENTRATION_PPM]`.
///
/// `NaN`, infinities and negative values all collapse to `0`.
pub fn clamp_concentration(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return 0.0;
    }
    value.min(MAX_CONCENTRATION_PPM)
}

/// Validate a raw payload using the current time as the fallback timestamp.
pub fn validate(raw: Option<&Value>) -> Option<SensorReading> {
    validate_at(raw, Utc::now())
}

/// Validate a raw payload.
///
/// Returns `None` only when the payload itself is absent (`None` or JSON
/// `null`); heartbeat and status-only frames carry no sample. Any other
/// shape yields a reading, with unusable channels read as zero.
pub fn validate_at(raw: Option<&Value>, now: Timestamp) -> Option<SensorReading> {
    let raw = match raw {
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };

    let channel_a = clamp_concentration(channel_value(raw, CHANNEL_A_KEYS));
    let channel_b = clamp_concentration(channel_value(raw, CHANNEL_B_KEYS));

    let observed_at = raw
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    Some(SensorReading {
        channel_a,
        channel_b,
        observed_at,
    })
}

/// Look up the first present key and coerce it to a number.
fn channel_value(raw: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| raw.get(*key))
        .map(coerce_number)
        .unwrap_or(0.0)
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_numeric_prefix(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse the longest leading numeric prefix of `s`, e.g. `"12.5ppm"` -> 12.5.
fn parse_numeric_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let s = match s.char_indices().nth(MAX_NUMERIC_STRING_LEN) {
        Some((cut, _)) => &s[..cut],
        None => s,
    };
    if s.is_empty() {
        return None;
    }

    let mut ends: Vec<usize> = s.char_indices().map(|(i, _)| i).skip(1).collect();
    ends.push(s.len());

    ends.into_iter()
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn absent_payload_produces_no_reading() {
        assert!(validate_at(None, fixed_now()).is_none());
        assert!(validate_at(Some(&Value::Null), fixed_now()).is_none());
    }

    #[test]
    fn well_formed_payload_is_kept() {
        let raw = json!({"mq135_ppm": 120.5, "mq7_ppm": 33});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 120.5);
        assert_eq!(reading.channel_b, 33.0);
        assert_eq!(reading.observed_at, fixed_now());
    }

    #[test]
    fn alias_keys_are_accepted() {
        let raw = json!({"channelA": 10, "channel_b": 20});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 10.0);
        assert_eq!(reading.channel_b, 20.0);
    }

    #[test]
    fn missing_fields_read_as_zero() {
        let raw = json!({"mq7_ppm": 5});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 0.0);
        assert_eq!(reading.channel_b, 5.0);

        let reading = validate_at(Some(&json!({})), fixed_now()).unwrap();
        assert_eq!((reading.channel_a, reading.channel_b), (0.0, 0.0));
    }

    #[test]
    fn non_numeric_and_negative_values_read_as_zero() {
        let raw = json!({"mq135_ppm": "abc", "mq7_ppm": -4.2});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 0.0);
        assert_eq!(reading.channel_b, 0.0);

        let raw = json!({"mq135_ppm": true, "mq7_ppm": [1, 2]});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!((reading.channel_a, reading.channel_b), (0.0, 0.0));
    }

    #[test]
    fn non_finite_strings_read_as_zero() {
        let raw = json!({"mq135_ppm": "NaN", "mq7_ppm": "Infinity"});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 0.0);
        assert_eq!(reading.channel_b, 0.0);
    }

    #[test]
    fn numeric_strings_use_leading_number() {
        let raw = json!({"mq135_ppm": " 42.5ppm", "mq7_ppm": "7"});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, 42.5);
        assert_eq!(reading.channel_b, 7.0);
    }

    #[test]
    fn long_numeric_strings_scan_a_bounded_prefix() {
        let long_fraction = format!("123.45{}", "6".repeat(200));
        let long_integer = "9".repeat(500);
        let raw = json!({"mq135_ppm": long_fraction, "mq7_ppm": long_integer});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert!((reading.channel_a - 123.456).abs() < 1e-3, "{}", reading.channel_a);
        assert_eq!(reading.channel_b, MAX_CONCENTRATION_PPM);

        let padded = format!("{}ppm", "0".repeat(100));
        assert_eq!(parse_numeric_prefix(&padded), Some(0.0));
    }

    #[test]
    fn values_above_ceiling_are_capped() {
        let raw = json!({"mq135_ppm": 5000, "mq7_ppm": 1000.0});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.channel_a, MAX_CONCENTRATION_PPM);
        assert_eq!(reading.channel_b, MAX_CONCENTRATION_PPM);
    }

    #[test]
    fn clamp_stays_within_bounds() {
        for v in [
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            -0.0,
            -1.0,
            0.0,
            0.5,
            999.99,
            1000.0,
            1000.01,
            f64::MAX,
        ] {
            let c = clamp_concentration(v);
            assert!((0.0..=MAX_CONCENTRATION_PPM).contains(&c), "{v} -> {c}");
        }
    }

    #[test]
    fn device_timestamp_is_used_when_valid() {
        let raw = json!({"mq135_ppm": 1, "timestamp": "2024-05-01T09:00:00Z"});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(
            reading.observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
        );

        let raw = json!({"mq135_ppm": 1, "timestamp": "yesterday"});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        assert_eq!(reading.observed_at, fixed_now());
    }

    #[test]
    fn display_sample_has_clock_label() {
        let raw = json!({"mq135_ppm": 3, "mq7_ppm": 4});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        let sample = DisplaySample::from_reading(&reading);
        assert_eq!(sample.time_label.len(), 8);
        assert_eq!(sample.time_label.matches(':').count(), 2);
        assert_eq!(sample.channel_a, 3.0);
        assert_eq!(sample.channel_b, 4.0);
    }

    #[test]
    fn display_sample_serializes_in_stored_shape() {
        let raw = json!({"mq135_ppm": 3, "mq7_ppm": 4});
        let reading = validate_at(Some(&raw), fixed_now()).unwrap();
        let value = serde_json::to_value(DisplaySample::from_reading(&reading)).unwrap();
        assert_eq!(value["MQ135"], 3.0);
        assert_eq!(value["MQ7"], 4.0);
        assert!(value["time"].is_string());
        assert!(value.get("observed_at").is_none());
    }
}
