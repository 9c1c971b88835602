//! Gemini `generateContent` backend.

use super::{BackendReply, EnrichmentBackend};
use crate::error::{classify_inference_error, PipelineError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shared HTTP plumbing for the Gemini API. The base URL is swappable so
/// tests can point it at a local server.
pub(crate) struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub(crate) fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    /// POST a `generateContent` request and decode the response body.
    pub(crate) async fn generate_content(&self, body: Value) -> Result<Value> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        debug!(model = self.model, "sending generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("inference request failed to send")?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::InferenceTransient(format!("HTTP 429: {text}")).into());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_inference_error(&format!("HTTP {status}: {text}")).into());
        }

        response
            .json::<Value>()
            .await
            .context("inference response was not JSON")
    }
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_text(response: &Value) -> Result<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            PipelineError::SchemaParse("response has no candidate content parts".into())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        return Err(PipelineError::SchemaParse("candidate parts carry no text".into()).into());
    }
    Ok(text)
}

/// Plain text-generation backend.
pub struct GeminiBackend {
    client: GeminiClient,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: GeminiClient::new(api_key, model, base_url),
        }
    }
}

#[async_trait]
impl EnrichmentBackend for GeminiBackend {
    fn model_name(&self) -> &str {
        self.client.model()
    }

    async fn generate(&self, prompt: &str) -> Result<BackendReply> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });
        let response = self.client.generate_content(body).await?;
        Ok(BackendReply {
            text: extract_text(&response)?,
            links: Vec::new(),
        })
    }
}
