//! Observer events published by the session controller.
//!
//! The presentation layer subscribes to these instead of polling shared
//! state.

use serde::Serialize;
use uuid::Uuid;

use emission_core::persistence::SubmitReceipt;
use emission_core::reading::SensorReading;
use emission_core::session::SessionState;
use emission_core::thresholds::Severity;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state.
    StateChanged { state: SessionState, epoch: u64 },

    /// A validated reading arrived. `recorded` is true when it was added
    /// to the running session.
    LiveReading {
        reading: SensorReading,
        severity_a: Severity,
        severity_b: Severity,
        recorded: bool,
    },

    /// The duration ticker fired for the running session.
    DurationTick { epoch: u64, seconds: u64 },

    /// Transport or device connectivity changed.
    Connectivity { connected: bool, link_up: bool },

    /// The transport stopped retrying.
    TransportGaveUp { attempts: u32 },

    /// The persistence collaborator stored a finalized session.
    SessionSaved {
        session_id: Uuid,
        receipt: SubmitReceipt,
    },

    /// The persistence collaborator rejected or failed to store a session.
    SaveFailed { session_id: Uuid, error: String },
}
