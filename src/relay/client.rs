//! HTTP client for the dialogue relay endpoint.

use crate::config::RelayConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::ConversationTurn;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Spoken when the relay cannot produce a reply, whatever the reason.
pub const FALLBACK_REPLY: &str = "Sorry, I had trouble understanding that.";

/// A relay round trip failed. All causes collapse here; the caller speaks
/// [`FALLBACK_REPLY`] and moves on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("relay failed: {0}")]
pub struct RelayFailure(pub String);

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    message: &'a str,
    #[serde(rename = "conversationHistory")]
    conversation_history: &'a [ConversationTurn],
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    response: String,
}

/// Client for the relay endpoint.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    /// Build a client with the configured endpoint and round-trip timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AssistantError::Relay(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Send one committed transcript with the conversation so far.
    ///
    /// Timeouts, transport errors, non-success statuses, malformed bodies,
    /// and empty replies all collapse into [`RelayFailure`].
    pub async fn send(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> std::result::Result<String, RelayFailure> {
        let request = RelayRequest {
            message,
            conversation_history: history,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(%e, "relay request failed");
                RelayFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "relay returned an error status");
            return Err(RelayFailure(format!("status {status}")));
        }

        let body: RelayResponse = response.json().await.map_err(|e| {
            warn!(%e, "relay reply was malformed");
            RelayFailure(e.to_string())
        })?;

        if body.response.trim().is_empty() {
            return Err(RelayFailure("empty reply".to_owned()));
        }
        Ok(body.response)
    }
}
