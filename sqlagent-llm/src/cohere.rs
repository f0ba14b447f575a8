use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use sqlagent_core::{AgentError, Llm, LlmRequest, LlmResponse, Message};

use crate::{provider_error, DEFAULT_TIMEOUT};

pub const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// Cohere v2 chat client (`command-r-plus` and friends).
#[derive(Clone)]
pub struct CohereClient {
    base_url: String,
    model: String,
    api_key: SecretString,
    http: Client,
}

impl CohereClient {
    pub fn new(api_key: SecretString, model: String) -> Result<Self, AgentError> {
        Self::with_base_url(COHERE_BASE_URL.to_string(), api_key, model, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(
        base_url: String,
        api_key: SecretString,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(provider_error)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct CohereChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    message: CohereMessage,
}

#[derive(Debug, Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Debug, Deserialize)]
struct CohereContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait::async_trait]
impl Llm for CohereClient {
    async fn invoke(&self, input: LlmRequest) -> Result<LlmResponse, AgentError> {
        let model = if input.model.is_empty() {
            self.model.clone()
        } else {
            input.model
        };
        let request = CohereChatRequest {
            model,
            messages: input.messages,
            temperature: input.temperature,
            stream: false,
        };

        let url = format!("{}/v2/chat", self.base_url);
        tracing::debug!(%url, model = %request.model, "cohere chat request");
        let response: CohereChatResponse = self
            .http
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(provider_error)?
            .error_for_status()
            .map_err(provider_error)?
            .json()
            .await
            .map_err(provider_error)?;

        let content = response
            .message
            .content
            .into_iter()
            .filter(|part| part.kind == "text")
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse { content })
    }
}
