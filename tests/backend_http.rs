//! HTTP-level backend tests against a mocked `generateContent` endpoint.

use fellowscout::error::PipelineError;
use fellowscout::refine::gemini::GeminiBackend;
use fellowscout::refine::search::SearchGroundedBackend;
use fellowscout::refine::{parse_reply, EnrichmentBackend};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-2.5-flash-lite";

fn candidate_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}]}
        }]
    })
}

#[tokio::test]
async fn generative_backend_round_trip() {
    let server = MockServer::start().await;
    let fenced = "```json\n{\"interest_rating\": 4.0}\n```";
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body(fenced)))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::with_base_url("test-key".into(), MODEL.into(), server.uri());
    let reply = backend.generate("prompt").await.unwrap();

    assert!(reply.links.is_empty());
    let payload = parse_reply(&reply.text).unwrap();
    assert_eq!(payload["interest_rating"], json!(4.0));
}

#[tokio::test]
async fn rate_limit_status_maps_to_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({
                "error": {"status": "RESOURCE_EXHAUSTED"}
            })),
        )
        .mount(&server)
        .await;

    let backend = GeminiBackend::with_base_url("k".into(), MODEL.into(), server.uri());
    let err = backend.generate("prompt").await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().unwrap();
    assert!(pipeline_err.is_transient());
}

#[tokio::test]
async fn client_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "API key not valid"}
            })),
        )
        .mount(&server)
        .await;

    let backend = GeminiBackend::with_base_url("bad".into(), MODEL.into(), server.uri());
    let err = backend.generate("prompt").await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().unwrap();
    assert!(!pipeline_err.is_transient());
}

#[tokio::test]
async fn search_backend_sends_tool_and_collects_grounding() {
    let server = MockServer::start().await;
    let body = json!({
        "candidates": [{
            "content": {"parts": [{"text": "{\"interest_rating\": 3.0}"}]},
            "groundingMetadata": {
                "groundingChunks": [
                    {"web": {"uri": "https://source.example/a"}},
                    {"web": {"uri": "https://source.example/b"}}
                ]
            }
        }]
    });
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(body_partial_json(json!({"tools": [{"google_search": {}}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        SearchGroundedBackend::with_base_url("k".into(), MODEL.into(), server.uri());
    let reply = backend.generate("prompt").await.unwrap();
    assert_eq!(
        reply.links,
        vec!["https://source.example/a", "https://source.example/b"]
    );
    assert!(parse_reply(&reply.text).is_some());
}

#[tokio::test]
async fn empty_candidates_reported_as_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let backend = GeminiBackend::with_base_url("k".into(), MODEL.into(), server.uri());
    let err = backend.generate("prompt").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::SchemaParse(_))
    ));
}
