use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use policydb_core::error::Error;
use policydb_core::traits::IndexBackend;
use policydb_core::types::{Metric, Passage};
use policydb_vector::ManagedIndex;

fn index(server: &MockServer, metric: Metric) -> ManagedIndex {
    ManagedIndex::new(server.uri(), "policy", metric, Some(2), Some("tok".into()), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn build_creates_and_upserts_when_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/policy/stats"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({"name": "policy", "dimension": 2, "metric": "cosine"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes/policy/upsert"))
        .and(body_partial_json(json!({"vectors": [{"id": "0", "values": [1.0, 0.0]}, {"id": "1"}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut idx = index(&server, Metric::Cosine);
    let ps = vec![Passage::new("knee surgery covered", 0, "DOC1"), Passage::new("dental excluded", 1, "DOC1")];
    idx.build(ps, vec![vec![1.0, 0.0], vec![0.0, 1.0]]).await.expect("build");
}

#[tokio::test]
async fn build_is_a_no_op_when_service_has_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/policy/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vector_count": 7, "dimension": 2})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut idx = index(&server, Metric::Cosine);
    idx.build(vec![Passage::new("x", 0, "d")], vec![vec![1.0, 0.0]]).await.expect("no-op");
    assert_eq!(idx.count().await.expect("count"), 7);
}

#[tokio::test]
async fn query_maps_distances_and_sorts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/policy/query"))
        .and(body_partial_json(json!({"top_k": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": [
            {"id": "1", "distance": 0.9, "metadata": {"text": "far", "sequence_index": 1, "source": "DOC1"}},
            {"id": "0", "distance": 0.2, "metadata": {"text": "near", "sequence_index": 0, "source": "DOC1"}}
        ]})))
        .mount(&server)
        .await;

    let hits = index(&server, Metric::L2).query(&[1.0, 0.0], 2).await.expect("query");
    assert_eq!(hits[0].passage.text, "near");
    assert!((hits[0].scores.similarity - 0.8).abs() < 1e-6);
    assert!((hits[1].scores.similarity - 0.1).abs() < 1e-6);
}

#[tokio::test]
async fn unknown_index_queries_empty_and_counts_zero() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any()).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    let idx = index(&server, Metric::Cosine);
    assert!(idx.query(&[1.0, 0.0], 3).await.expect("query").is_empty());
    assert_eq!(idx.count().await.expect("count"), 0);
}

#[tokio::test]
async fn service_errors_surface_as_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/policy/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = index(&server, Metric::Cosine).query(&[1.0, 0.0], 3).await.expect_err("500");
    assert!(matches!(err, Error::Backend(ref m) if m.contains("boom")), "{err}");
    assert!(matches!(index(&server, Metric::Cosine).entries().await, Err(Error::Backend(_))));
}

#[test]
fn empty_endpoint_is_rejected() {
    let err = ManagedIndex::new(" ", "policy", Metric::Cosine, None, None, Duration::from_secs(1)).err();
    assert!(matches!(err, Some(Error::InvalidConfig(_))));
}
