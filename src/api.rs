//! Client for the question-answering endpoint (`POST {API_URL}/ask`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

const FALLBACK_ERROR: &str = "Failed to get response";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The `Display` text is what the user sees.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{}", .detail.as_deref().unwrap_or(FALLBACK_ERROR))]
    Status { status: StatusCode, detail: Option<String> },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait AskClient: Send + Sync {
    async fn ask(&self, request: AskRequest) -> Result<String, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpAskClient {
    client: Client,
    ask_url: String,
}

impl HttpAskClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            ask_url: format!("{}/ask", base_url.trim_end_matches('/')),
        }
    }

    pub fn ask_url(&self) -> &str {
        &self.ask_url
    }
}

#[async_trait]
impl AskClient for HttpAskClient {
    async fn ask(&self, request: AskRequest) -> Result<String, ApiError> {
        let resp = self.client.post(&self.ask_url).json(&request).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let detail = error_detail(&text);
            warn!(%status, ?detail, "ask endpoint returned an error");
            return Err(ApiError::Status { status, detail });
        }

        let payload: JsonValue = serde_json::from_str(&text)?;
        debug!(bytes = text.len(), "ask endpoint answered");
        extract_answer(&payload)
    }
}

/// `detail` string from an error body, if the body is JSON and has one.
pub fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<JsonValue>(body)
        .ok()?
        .get("detail")?
        .as_str()
        .map(str::to_string)
}

/// Pulls the answer out of either deployment's envelope:
/// `{"response": ..}`, `{"body": "<json string>"}` or `{"body": {..}}`.
/// A missing answer is an empty string, which renders as nothing.
pub fn extract_answer(payload: &JsonValue) -> Result<String, ApiError> {
    if let Some(answer) = payload.get("response") {
        return Ok(answer_text(answer));
    }
    match payload.get("body") {
        Some(JsonValue::String(raw)) => {
            let inner: JsonValue = serde_json::from_str(raw)?;
            Ok(inner.get("response").map(answer_text).unwrap_or_default())
        }
        Some(inner) => Ok(inner.get("response").map(answer_text).unwrap_or_default()),
        None => {
            warn!("response carried no answer field");
            Ok(String::new())
        }
    }
}

// The backend may hand back its chat-message object instead of bare text.
fn answer_text(answer: &JsonValue) -> String {
    match answer {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(obj) => obj
            .get("content")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}
