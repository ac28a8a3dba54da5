//! Session lifecycle states and the finalized session handed to persistence.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateResult;
use crate::metadata::TestMetadata;
use crate::reading::DisplaySample;
use crate::types::Timestamp;

/// Lifecycle state of the single active test session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    AwaitingMetadata,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::AwaitingMetadata => "awaiting metadata",
        })
    }
}

/// A completed session, ready for the persistence collaborator.
///
/// Serializes to the flat record shape the collaborator stores:
/// metadata fields, `test_data`, the aggregate columns and `test_duration`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedSession {
    #[serde(skip)]
    pub session_id: Uuid,
    #[serde(skip)]
    pub started_at: Timestamp,
    #[serde(flatten)]
    pub metadata: TestMetadata,
    #[serde(rename = "test_data")]
    pub samples: Vec<DisplaySample>,
    #[serde(flatten)]
    pub aggregate: AggregateResult,
}

impl FinalizedSession {
    pub fn duration_seconds(&self) -> u64 {
        self.aggregate.duration_seconds
    }
}
