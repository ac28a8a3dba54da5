//! REST client for the records API.
//!
//! Wraps test submission, history listing, PDF retrieval, deletion and
//! recommendation lookup using [`reqwest`].

use async_trait::async_trait;

use emission_core::persistence::{PersistenceError, SessionSink, SubmitReceipt};
use emission_core::session::FinalizedSession;
use emission_core::types::TestId;

use crate::records::{Envelope, TestRecord};

/// HTTP client for one records API deployment.
#[derive(Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    api_base: String,
}

/// Errors from the records API layer.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Records API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered `success: false` or omitted a required field.
    #[error("Records API rejected the request: {0}")]
    Rejected(String),
}

impl ReportClient {
    /// Create a client for the API rooted at `api_base`,
    /// e.g. `http://localhost:3001/api`.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { client, api_base }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Store a finalized session.
    ///
    /// Sends `POST /tests` with the flat test record. Returns the assigned
    /// id and the recommendation payload, if the service computed one.
    pub async fn submit(&self, session: &FinalizedSession) -> Result<SubmitReceipt, ReportError> {
        tracing::debug!(
            session_id = %session.session_id,
            samples = session.samples.len(),
            "Submitting test record",
        );

        let response = self
            .client
            .post(self.url("tests"))
            .json(session)
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = Self::parse_response(response).await?;
        let envelope = Self::accept(envelope)?;
        let id = envelope
            .id
            .ok_or_else(|| ReportError::Rejected("response carried no test id".into()))?;

        Ok(SubmitReceipt {
            id,
            recommendation: envelope.recommendation,
        })
    }

    /// Fetch the stored test history (`GET /tests`).
    pub async fn list_tests(&self) -> Result<Vec<TestRecord>, ReportError> {
        let response = self.client.get(self.url("tests")).send().await?;
        let envelope: Envelope<Vec<TestRecord>> = Self::parse_response(response).await?;
        Ok(Self::accept(envelope)?.data.unwrap_or_default())
    }

    /// Download the rendered PDF report for a test (`GET /tests/{id}/pdf`).
    pub async fn fetch_pdf(&self, id: TestId) -> Result<Vec<u8>, ReportError> {
        let response = self
            .client
            .get(self.url(&format!("tests/{id}/pdf")))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Delete a stored test (`DELETE /tests/{id}`).
    pub async fn delete_test(&self, id: TestId) -> Result<(), ReportError> {
        let response = self
            .client
            .delete(self.url(&format!("tests/{id}")))
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = Self::parse_response(response).await?;
        Self::accept(envelope)?;
        Ok(())
    }

    /// Fetch maintenance recommendations for a test
    /// (`GET /tests/{id}/recommendations`). The payload is passed through
    /// untouched.
    pub async fn recommendations(&self, id: TestId) -> Result<serde_json::Value, ReportError> {
        let response = self
            .client
            .get(self.url(&format!("tests/{id}/recommendations")))
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = Self::parse_response(response).await?;
        let envelope = Self::accept(envelope)?;
        Ok(envelope
            .data
            .or(envelope.recommendation)
            .unwrap_or(serde_json::Value::Null))
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Turn `success: false` into [`ReportError::Rejected`].
    fn accept<T>(envelope: Envelope<T>) -> Result<Envelope<T>, ReportError> {
        if envelope.success {
            Ok(envelope)
        } else {
            Err(ReportError::Rejected(
                envelope
                    .error
                    .clone()
                    .unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ReportError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ReportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReportError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ReportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SessionSink for ReportClient {
    async fn submit(&self, session: &FinalizedSession) -> Result<SubmitReceipt, PersistenceError> {
        ReportClient::submit(self, session)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }
}
