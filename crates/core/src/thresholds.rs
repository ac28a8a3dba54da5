//! Severity classification of gas concentrations.
//!
//! Thresholds live in a single versioned [`ThresholdConfig`]; every call
//! site (live readings, session aggregates, history rows) classifies
//! through it so the tiers never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::reading::clamp_concentration;

/// Version tag of the built-in threshold set.
pub const DEFAULT_THRESHOLDS_VERSION: u32 = 1;

/// The two measurement channels reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Broad-spectrum gas sensor (MQ-135).
    A,
    /// Carbon-monoxide sensor (MQ-7).
    B,
}

impl Channel {
    /// Sensor model name shown next to the value.
    pub fn sensor_name(self) -> &'static str {
        match self {
            Channel::A => "MQ-135",
            Channel::B => "MQ-7",
        }
    }
}

/// Severity tier of a concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Caution,
    Danger,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Caution => "Caution",
            Severity::Danger => "Danger",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper bounds for one channel. Comparisons are strict: a value equal to
/// `caution_above` is still [`Severity::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelThresholds {
    pub caution_above: f64,
    pub danger_above: f64,
}

impl ChannelThresholds {
    pub fn classify(&self, value: f64) -> Severity {
        let value = clamp_concentration(value);
        if value > self.danger_above {
            Severity::Danger
        } else if value > self.caution_above {
            Severity::Caution
        } else {
            Severity::Normal
        }
    }

    fn validate(&self, channel: Channel) -> Result<(), CoreError> {
        let finite = self.caution_above.is_finite() && self.danger_above.is_finite();
        if !finite || self.caution_above < 0.0 {
            return Err(CoreError::Validation(format!(
                "{} thresholds must be finite and non-negative",
                channel.sensor_name()
            )));
        }
        if self.caution_above >= self.danger_above {
            return Err(CoreError::Validation(format!(
                "{} caution threshold ({}) must be below danger threshold ({})",
                channel.sensor_name(),
                self.caution_above,
                self.danger_above
            )));
        }
        Ok(())
    }
}

/// Versioned per-channel threshold set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub version: u32,
    pub channel_a: ChannelThresholds,
    pub channel_b: ChannelThresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_THRESHOLDS_VERSION,
            channel_a: ChannelThresholds {
                caution_above: 300.0,
                danger_above: 600.0,
            },
            channel_b: ChannelThresholds {
                caution_above: 75.0,
                danger_above: 150.0,
            },
        }
    }
}

impl ThresholdConfig {
    pub fn for_channel(&self, channel: Channel) -> &ChannelThresholds {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    /// Classify `value` against the thresholds of `channel`.
    ///
    /// The value is sanitized with the reading clamp first, so `NaN` or
    /// negative inputs classify as [`Severity::Normal`].
    pub fn classify(&self, value: f64, channel: Channel) -> Severity {
        self.for_channel(channel).classify(value)
    }

    /// Reject inverted, negative or non-finite bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.channel_a.validate(Channel::A)?;
        self.channel_b.validate(Channel::B)
    }
}
