//! Embedding provider for OpenAI-compatible `/embeddings` endpoints.
//!
//! Works against any server speaking the OpenAI embeddings API, including
//! the Gemini compatibility endpoint configured by default. Calls are
//! blocking and never retried.

use crate::vector::{EmbeddingProvider, ProviderError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const PROVIDER: &str = "openai";

/// Where the API key comes from.
enum ApiKey {
    Literal(String),
    /// Read from this environment variable on every call
    Env(String),
}

/// Blocking client for an OpenAI-compatible embeddings API.
pub struct OpenAiCompatibleProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: ApiKey,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for `api_base` authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns `MissingApiKey` for an empty key and `Request` if the HTTP
    /// client cannot be built.
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey("<explicit key>".to_string()));
        }
        Self::build(api_base, ApiKey::Literal(api_key), timeout)
    }

    /// Create a provider that reads its key from `key_env` when it embeds.
    ///
    /// Construction succeeds without the variable set, so callers that never
    /// embed (clustering, stats) do not need a key.
    pub fn from_env(api_base: &str, key_env: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Self::build(api_base, ApiKey::Env(key_env.to_string()), timeout)
    }

    fn build(api_base: &str, api_key: ApiKey, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: embeddings_url(api_base),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn resolve_key(&self) -> Result<String, ProviderError> {
        match &self.api_key {
            ApiKey::Literal(key) => Ok(key.clone()),
            ApiKey::Env(name) => std::env::var(name)
                .ok()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| ProviderError::MissingApiKey(name.clone())),
        }
    }
}

fn embeddings_url(api_base: &str) -> String {
    format!("{}/embeddings", api_base.trim_end_matches('/'))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Put embeddings back into input order using the response `index` field.
///
/// Entries without an index keep their position.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::CountMismatch {
            expected,
            actual: data.len(),
        });
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
        let in_range = data
            .iter()
            .enumerate()
            .all(|(position, d)| d.index == Some(position));
        if !in_range {
            return Err(ProviderError::Decode {
                provider: PROVIDER.to_string(),
                message: "response indices do not cover the request".to_string(),
            });
        }
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn embed(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self.resolve_key()?;
        debug!(provider = PROVIDER, batch_size = texts.len(), model, "requesting embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&api_key)
            .json(&EmbeddingRequest { model, input: texts })
            .send()
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                ProviderError::Request {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, status = %status, "API error");
            return Err(ProviderError::Status {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().map_err(|e| ProviderError::Decode {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        })?;

        order_embeddings(parsed.data, texts.len())
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
