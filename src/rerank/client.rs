//! Hosted text-generation client.
//!
//! [`TextGenerator`] is the seam between the re-ranker and the model
//! backend. [`HfInferenceClient`] implements it for the Hugging Face
//! inference API: `POST {endpoint}/{model}` with the prompt as `inputs`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{map_http_error, map_transport_error, RerankError};
use crate::config::RerankConfig;
use crate::error::{HarnessError, Result};

/// A backend that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier recorded with each result.
    fn model(&self) -> &str;

    /// Run one generation. No internal retries.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, RerankError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f64,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

/// Inference endpoints answer with a list; some deployments return a
/// single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Many(Vec<Generation>),
    One(Generation),
}

/// Hugging Face inference API client.
pub struct HfInferenceClient {
    client: reqwest::Client,
    url: String,
    model: String,
    token: Option<String>,
    max_new_tokens: u32,
    temperature: f64,
}

impl std::fmt::Debug for HfInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfInferenceClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl HfInferenceClient {
    /// Build a client from re-ranking configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/{}", config.endpoint.trim_end_matches('/'), config.model),
            model: config.model.clone(),
            token: config.hf_token.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for HfInferenceClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, RerankError> {
        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
                return_full_text: false,
            },
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| map_transport_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| map_transport_error(&e))?;
        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }

        tracing::trace!(model = %self.model, body = %text, "generation response");
        let parsed: GenerationResponse = serde_json::from_str(&text).map_err(|e| {
            RerankError::MalformedResponse(format!("unexpected generation response: {e}"))
        })?;
        match parsed {
            GenerationResponse::One(g) => Ok(g.generated_text),
            GenerationResponse::Many(list) => list
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .ok_or_else(|| RerankError::MalformedResponse("empty generation list".into())),
        }
    }
}
