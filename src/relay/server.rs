//! HTTP endpoint that relays a child's message to the upstream reply engine.
//!
//! Exposes `POST /api/chat`. The handler prepends the instruction preamble,
//! formats the conversation history, calls the upstream generative-text
//! service, and maps every failure to a child-friendly apology so the caller
//! always receives something speakable.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RelayServerConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{ConversationTurn, Role};

/// Instruction preamble used when the configured file cannot be read.
const DEFAULT_INSTRUCTIONS: &str = "You are a friendly AI robot assistant named OneRobo \
who looks after little children who were left at home by their working parents. \
Keep responses under 100 words.";

/// Reply when no upstream API key is configured.
const NO_KEY_REPLY: &str = "I heard you. Let's play a game or chat!";

/// Reply when the upstream returns a non-success status.
const UPSTREAM_ERROR_REPLY: &str = "Sorry, I'm having trouble right now.";

/// Reply when the upstream call times out.
const TIMEOUT_REPLY: &str = "Sorry, that took too long. Please try again!";

/// Reply when the upstream call fails in any other way.
const PROCESS_ERROR_REPLY: &str = "Sorry, I couldn't process that.";

/// Reply when the upstream answer carries no usable text.
const NOT_UNDERSTOOD_REPLY: &str = "I'm sorry, I didn't understand that.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The child's committed transcript.
    pub message: String,
    /// Conversation so far, oldest first.
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<ConversationTurn>,
}

/// Response body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// The assistant's reply text.
    pub response: String,
}

/// Error body returned with a 400.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatError {
    /// Human-readable description.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Upstream wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state for axum handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<RelayServerConfig>,
    http: reqwest::Client,
    api_key: Option<String>,
    instructions: Arc<String>,
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// The relay HTTP server.
pub struct RelayServer {
    config: RelayServerConfig,
    api_key: Option<String>,
}

/// Handle to a running relay server. Aborts the task on drop.
pub struct RelayServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RelayServer {
    /// Build a server, reading the API key from the configured environment
    /// variable.
    pub fn new(config: RelayServerConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self { config, api_key }
    }

    /// Override the upstream API key. `None` switches the server to the
    /// canned no-key reply.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the listener
    /// cannot bind.
    pub async fn serve(self) -> Result<RelayServerHandle> {
        let instructions = load_instructions(&self.config);
        if self.api_key.is_none() {
            warn!("no upstream API key configured, serving canned replies");
        }

        let http = reqwest::Client::builder()
            .timeout(self.config.upstream_timeout())
            .build()
            .map_err(|e| AssistantError::Relay(format!("http client: {e}")))?;

        let bind_addr = self.config.bind_addr.clone();
        let state = AppState {
            config: Arc::new(self.config),
            http,
            api_key: self.api_key,
            instructions: Arc::new(instructions),
        };

        let app = Router::new()
            .route("/api/chat", post(handle_chat))
            .with_state(state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AssistantError::Relay(format!("bind {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AssistantError::Relay(format!("local addr: {e}")))?;

        info!("relay listening on http://{addr}/api/chat");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("relay server error: {e}");
            }
        });

        Ok(RelayServerHandle { addr, handle })
    }
}

impl RelayServerHandle {
    /// The address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for RelayServerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the instruction preamble, falling back to the built-in default.
fn load_instructions(config: &RelayServerConfig) -> String {
    match std::fs::read_to_string(&config.instructions_path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
        Ok(_) => DEFAULT_INSTRUCTIONS.to_owned(),
        Err(e) => {
            warn!(
                path = %config.instructions_path.display(),
                %e,
                "instruction file unavailable, using built-in preamble"
            );
            DEFAULT_INSTRUCTIONS.to_owned()
        }
    }
}

/// Flatten the preamble, history, and new message into one prompt.
///
/// History turns are rendered under a `CONVERSATION HISTORY:` header as
/// `CHILD:` and `ONEROBO:` lines, oldest first. The new message comes last,
/// quoted, followed by the reply-length instruction.
fn build_prompt(instructions: &str, history: &[ConversationTurn], message: &str) -> String {
    let mut prompt = String::with_capacity(instructions.len() + message.len() + 96);
    prompt.push_str(instructions);
    if !history.is_empty() {
        prompt.push_str("\n\nCONVERSATION HISTORY:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "CHILD",
                Role::Assistant => "ONEROBO",
            };
            prompt.push_str(speaker);
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nCHILD: \"");
    prompt.push_str(message);
    prompt.push_str("\"\n\nONEROBO, respond as yourself in 1-3 sentences.");
    prompt
}

/// Pull the reply text out of the upstream response shape.
fn extract_reply(response: &GenerateResponse) -> Option<String> {
    let text = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .first()?
        .text
        .trim()
        .to_owned();
    if text.is_empty() { None } else { Some(text) }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `POST /api/chat`.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    if request.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: "message is required".to_owned(),
            }),
        ));
    }

    let Some(api_key) = state.api_key.as_deref() else {
        return Ok(Json(ChatReply {
            response: NO_KEY_REPLY.to_owned(),
        }));
    };

    let prompt = build_prompt(
        &state.instructions,
        &request.conversation_history,
        &request.message,
    );
    let upstream_request = GenerateRequest {
        contents: vec![Content {
            parts: vec![Part { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: state.config.temperature,
            max_output_tokens: state.config.max_output_tokens,
        },
    };

    let url = format!("{}?key={}", state.config.upstream_url, api_key);
    let sent = state.http.post(&url).json(&upstream_request).send().await;

    let response = match sent {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            warn!("upstream call timed out");
            return Ok(Json(ChatReply {
                response: TIMEOUT_REPLY.to_owned(),
            }));
        }
        Err(e) => {
            warn!(%e, "upstream call failed");
            return Ok(Json(ChatReply {
                response: PROCESS_ERROR_REPLY.to_owned(),
            }));
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "upstream returned an error status");
        return Ok(Json(ChatReply {
            response: UPSTREAM_ERROR_REPLY.to_owned(),
        }));
    }

    let reply = match response.json::<GenerateResponse>().await {
        Ok(body) => extract_reply(&body).unwrap_or_else(|| NOT_UNDERSTOOD_REPLY.to_owned()),
        Err(e) => {
            warn!(%e, "upstream reply was malformed");
            PROCESS_ERROR_REPLY.to_owned()
        }
    };

    Ok(Json(ChatReply { response: reply }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn prompt_renders_history_under_its_header() {
        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("Hi! Want to play?"),
        ];
        let prompt = build_prompt("Be kind.", &history, "yes please");
        assert!(prompt.starts_with("Be kind.\n\nCONVERSATION HISTORY:\n"));
        assert!(prompt.contains("CHILD: hello\n"));
        assert!(prompt.contains("ONEROBO: Hi! Want to play?\n"));
        assert!(
            prompt.ends_with("\nCHILD: \"yes please\"\n\nONEROBO, respond as yourself in 1-3 sentences.")
        );
    }

    #[test]
    fn prompt_without_history_omits_the_header() {
        let prompt = build_prompt("Be kind.", &[], "hi");
        assert_eq!(
            prompt,
            "Be kind.\nCHILD: \"hi\"\n\nONEROBO, respond as yourself in 1-3 sentences."
        );
    }

    #[test]
    fn extract_reply_walks_the_candidate_shape() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  Hello!  "}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_reply(&parsed), Some("Hello!".to_owned()));
    }

    #[test]
    fn extract_reply_handles_missing_pieces() {
        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_reply(&empty), None);

        let no_content: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert_eq!(extract_reply(&no_content), None);

        let blank: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert_eq!(extract_reply(&blank), None);
    }

    #[test]
    fn chat_request_accepts_missing_history() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.conversation_history.is_empty());
    }
}
