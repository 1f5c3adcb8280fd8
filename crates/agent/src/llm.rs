//! OpenAI-compatible completion client.

use std::time::Duration;

use async_trait::async_trait;
use leadbridge_core::completion::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
use leadbridge_core::connection::truncate_error;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OpenAiClient {
    client: Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CompletionError(format!("could not build HTTP client: {error}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        api_key: &SecretString,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        let url = self.chat_completions_url();
        debug!(event_name = "completion.request", %url, model = %request.model, "requesting completion");

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .json(&ChatRequest { model: &request.model, messages: &request.messages })
            .send()
            .await
            .map_err(|error| CompletionError(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError(format!(
                "completion service returned {status}: {}",
                truncate_error(&body)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| CompletionError(format!("could not decode completion: {error}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CompletionError("completion response contained no text".to_string()))
    }
}
