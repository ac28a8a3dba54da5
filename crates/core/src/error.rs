use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Recoverable, user-facing failures of a session command.
///
/// None of these leave the session in an inconsistent state; the caller
/// may simply retry the action once the cause is addressed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `start` was requested while the device reports no connectivity.
    #[error("Device is not connected")]
    NotConnected,

    /// A session was stopped (or summarized) without any accepted readings.
    #[error("No readings were recorded during the session")]
    EmptySession,

    /// `submit` was called with one or more required fields left blank.
    #[error("Missing required metadata: {}", .0.join(", "))]
    MissingMetadata(Vec<&'static str>),

    /// The command does not apply to the current session state.
    #[error("Cannot {action} while the session is {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
}
