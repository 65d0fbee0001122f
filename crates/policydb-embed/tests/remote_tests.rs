use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use policydb_core::error::Error;
use policydb_core::traits::EmbeddingService;
use policydb_core::types::TaskType;
use policydb_embed::{BatchEmbedder, RemoteEmbedder};

const BATCH: &str = "/v1beta/models/test-model:batchEmbedContents";
const SINGLE: &str = "/v1beta/models/test-model:embedContent";

fn embedder(server: &MockServer, dim: usize) -> RemoteEmbedder {
    RemoteEmbedder::new(server.uri(), "test-model", Some("secret".into()), dim, Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn single_call_sends_task_type_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SINGLE))
        .and(header("x-goog-api-key", "secret"))
        .and(body_string_contains("RETRIEVAL_QUERY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": {"values": [0.1, 0.2, 0.3]}})))
        .expect(1)
        .mount(&server)
        .await;

    let v = embedder(&server, 3).embed_one("waiting period", TaskType::Query).await.expect("embed");
    assert_eq!(v, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn batch_call_returns_vectors_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH))
        .and(body_string_contains("RETRIEVAL_DOCUMENT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [{"values": [1.0, 0.0]}, {"values": [0.0, 1.0]}]
        })))
        .mount(&server)
        .await;

    let out = embedder(&server, 2).embed_batch(&["a".into(), "b".into()], TaskType::Document).await;
    let out: Vec<_> = out.into_iter().map(|r| r.expect("vector")).collect();
    assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn http_error_fails_the_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "backend unavailable", "status": "UNAVAILABLE"}
        })))
        .mount(&server)
        .await;

    let out = embedder(&server, 2).embed_batch(&["a".into(), "b".into()], TaskType::Document).await;
    assert_eq!(out.len(), 2);
    for r in out {
        match r {
            Err(Error::EmbeddingService(msg)) => assert!(msg.contains("backend unavailable"), "{msg}"),
            other => panic!("expected embedding error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn wrong_width_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SINGLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": {"values": [0.1]}})))
        .mount(&server)
        .await;

    let err = embedder(&server, 3).embed_one("x", TaskType::Document).await.expect_err("dim check");
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 1 }));
}

#[tokio::test]
async fn one_failing_batch_zero_fills_only_its_passages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH))
        .and(body_string_contains("poison"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BATCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [{"values": [0.6, 0.8]}]})))
        .mount(&server)
        .await;

    let batcher = BatchEmbedder::new(Arc::new(embedder(&server, 2))).with_batch_size(1).with_concurrency(2);
    let input = vec!["knee surgery".to_string(), "poison pill".to_string(), "dental".to_string()];
    let out = batcher.embed(&input, TaskType::Document).await.expect("document embedding degrades");
    assert_eq!(out, vec![vec![0.6, 0.8], vec![0.0, 0.0], vec![0.6, 0.8]]);

    let err = batcher.embed_query("poison").await.expect_err("query fails");
    assert!(matches!(err, Error::EmbeddingService(_)));
}
