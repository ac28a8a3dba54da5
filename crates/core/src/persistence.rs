//! Seam to the external persistence collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::FinalizedSession;
use crate::types::TestId;

/// Acknowledgement returned after a session has been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: TestId,
    /// Maintenance recommendation computed by the collaborator, if any.
    #[serde(default)]
    pub recommendation: Option<serde_json::Value>,
}

/// Persistence failure, carried as text so the session crate stays
/// independent of the concrete client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PersistenceError(pub String);

/// Anything able to store a finalized session.
#[async_trait]
pub trait SessionSink: Send + Sync + 'static {
    async fn submit(&self, session: &FinalizedSession) -> Result<SubmitReceipt, PersistenceError>;
}
