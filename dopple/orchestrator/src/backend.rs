use std::env;

use anyhow::Result;
use async_trait::async_trait;
use dopple_nlp::{Completion, GenerationBackend, GenerationError, GenerationPrompt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Generation backend speaking the `{prompt, max_tokens, temperature,
/// top_p}` -> `{text}` JSON protocol.
#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl HttpGenerationBackend {
    /// Backend posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            bearer_token: None,
        })
    }

    /// Backend for the configured endpoint, reading credentials from the
    /// named environment variables. `None` without an endpoint.
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        let mut backend = Self::new(endpoint.clone())?;
        backend.api_key = config.api_key_env.as_deref().and_then(|name| env::var(name).ok());
        backend.bearer_token = config
            .bearer_token_env
            .as_deref()
            .and_then(|name| env::var(name).ok());
        Ok(Some(backend))
    }

    /// Sends `x-api-key` with every request.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sends a bearer token with every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Target URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn backend_error(err: &reqwest::Error) -> GenerationError {
    GenerationError::Backend(err.to_string())
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn complete(&self, prompt: &GenerationPrompt) -> Result<Completion, GenerationError> {
        let rendered = prompt.render();
        let payload = GenerateRequest {
            prompt: &rendered,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            top_p: prompt.top_p,
        };
        let mut req = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        let response = req
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| backend_error(&err))?;
        let body: GenerateResponse = response.json().await.map_err(|err| backend_error(&err))?;
        Ok(Completion { text: body.text })
    }
}
