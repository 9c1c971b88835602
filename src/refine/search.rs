//! Search-grounded Gemini backend — same `generateContent` call with the
//! `google_search` tool enabled, surfacing the grounding sources as links.

use super::gemini::{extract_text, GeminiClient, DEFAULT_BASE_URL};
use super::{BackendReply, EnrichmentBackend};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct SearchGroundedBackend {
    client: GeminiClient,
}

impl SearchGroundedBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: GeminiClient::new(api_key, model, base_url),
        }
    }
}

/// URIs of the grounding chunks the model cited. Missing metadata is an
/// empty list, not an error — grounding is best-effort.
fn extract_grounding_links(response: &Value) -> Vec<String> {
    response
        .pointer("/candidates/0/groundingMetadata/groundingChunks")
        .and_then(|v| v.as_array())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| c.pointer("/web/uri").and_then(|u| u.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl EnrichmentBackend for SearchGroundedBackend {
    fn model_name(&self) -> &str {
        self.client.model()
    }

    async fn generate(&self, prompt: &str) -> Result<BackendReply> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "tools": [{"google_search": {}}]
        });
        let response = self.client.generate_content(body).await?;
        Ok(BackendReply {
            text: extract_text(&response)?,
            links: extract_grounding_links(&response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounding_links_extracted() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{}"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://a.example", "title": "A"}},
                        {"web": {"uri": "https://b.example"}},
                        {"retrievedContext": {"uri": "ignored"}}
                    ]
                }
            }]
        });
        assert_eq!(
            extract_grounding_links(&response),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "{}"}]}}]});
        assert!(extract_grounding_links(&response).is_empty());
    }
}
