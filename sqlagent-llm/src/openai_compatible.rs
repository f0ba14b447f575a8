//! Generic OpenAI-compatible LLM client
//!
//! Supports any provider using OpenAI's chat completions format (OpenAI,
//! DeepSeek, Together, vLLM, LM Studio, ...).

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use sqlagent_core::{AgentError, Llm, LlmRequest, LlmResponse, Message};

use crate::{provider_error, DEFAULT_TIMEOUT};

/// Request body for chat completions endpoint
#[derive(Serialize, Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

/// Non-streaming response from chat completions
#[derive(Deserialize, Debug, Clone)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-style error response
#[derive(Deserialize, Debug, Clone)]
pub struct OpenAiError {
    pub error: ErrorDetail,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Default)]
pub struct OpenAiCompatibleBuilder {
    base_url: Option<Url>,
    api_key: Option<SecretString>,
    default_model: Option<String>,
    timeout: Option<Duration>,
}

impl fmt::Debug for OpenAiCompatibleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_some() {
            "<redacted>"
        } else {
            "<none>"
        };
        f.debug_struct("OpenAiCompatibleBuilder")
            .field("base_url", &self.base_url)
            .field("api_key", &api_key)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatibleBuilder {
    pub fn base_url(mut self, value: impl AsRef<str>) -> Result<Self, AgentError> {
        let url = Url::parse(value.as_ref())
            .map_err(|err| AgentError::InvalidConfig(format!("invalid base url: {err}")))?;
        self.base_url = Some(url);
        Ok(self)
    }

    pub fn api_key(mut self, value: SecretString) -> Self {
        self.api_key = Some(value);
        self
    }

    pub fn default_model(mut self, value: impl Into<String>) -> Self {
        self.default_model = Some(value.into());
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleClient, AgentError> {
        let base_url = self
            .base_url
            .ok_or_else(|| AgentError::InvalidConfig("base url is required".to_string()))?;
        let endpoint = chat_completions_endpoint(&base_url)?;
        let http = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(provider_error)?;

        Ok(OpenAiCompatibleClient {
            endpoint,
            api_key: self.api_key,
            default_model: self.default_model.unwrap_or_default(),
            http,
        })
    }
}

/// `https://host` and `https://host/v1` both resolve to `.../v1/chat/completions`.
fn chat_completions_endpoint(base_url: &Url) -> Result<Url, AgentError> {
    let path = base_url.path().trim_end_matches('/');
    let joined = if path.ends_with("/v1") {
        format!("{path}/chat/completions")
    } else {
        format!("{path}/v1/chat/completions")
    };
    let mut endpoint = base_url.clone();
    endpoint.set_path(&joined);
    Ok(endpoint)
}

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    endpoint: Url,
    api_key: Option<SecretString>,
    default_model: String,
    http: Client,
}

impl OpenAiCompatibleClient {
    pub fn builder() -> OpenAiCompatibleBuilder {
        OpenAiCompatibleBuilder::default()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Llm for OpenAiCompatibleClient {
    async fn invoke(&self, input: LlmRequest) -> Result<LlmResponse, AgentError> {
        let model = if input.model.is_empty() {
            self.default_model.clone()
        } else {
            input.model
        };
        let request = ChatCompletionRequest {
            model,
            messages: input.messages,
            temperature: input.temperature,
            stream: false,
        };

        tracing::debug!(endpoint = %self.endpoint, model = %request.model, "chat completion request");
        let mut builder = self.http.post(self.endpoint.clone()).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        let response = builder.send().await.map_err(provider_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiError>(&body)
                .map(|err| err.error.message)
                .unwrap_or(body);
            return Err(AgentError::LlmProvider(format!("{status}: {message}")));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(provider_error)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::LlmProvider("response contained no choices".to_string()))?;

        Ok(LlmResponse { content })
    }
}
