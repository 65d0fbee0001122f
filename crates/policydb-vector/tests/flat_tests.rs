use policydb_core::config::IndexSettings;
use policydb_core::error::Error;
use policydb_core::traits::IndexBackend;
use policydb_core::types::{BackendKind, Metric, Passage};
use policydb_vector::{open_backend, FlatIndex};

fn passages(texts: &[&str]) -> Vec<Passage> {
    texts.iter().enumerate().map(|(i, t)| Passage::new(*t, i, "DOC1")).collect()
}

#[tokio::test]
async fn query_ranks_by_cosine_similarity() {
    let mut idx = FlatIndex::new("t", Metric::Cosine, Some(2));
    idx.build(passages(&["east", "north", "north-east"]), vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
        .await
        .expect("build");
    let hits = idx.query(&[0.0, 1.0], 2).await.expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].passage.text, "north");
    assert_eq!(hits[1].passage.text, "north-east");
    assert!(hits[0].scores.similarity >= hits[1].scores.similarity);
}

#[tokio::test]
async fn ties_break_by_sequence_index() {
    let mut idx = FlatIndex::new("t", Metric::Cosine, None);
    let mut ps = passages(&["c", "a", "b"]);
    ps.reverse();
    let seqs: Vec<usize> = ps.iter().map(|p| p.sequence_index).collect();
    assert_eq!(seqs, vec![2, 1, 0]);
    idx.build(ps, vec![vec![1.0, 0.0]; 3]).await.expect("build");
    let hits = idx.query(&[1.0, 0.0], 3).await.expect("query");
    let order: Vec<usize> = hits.iter().map(|h| h.passage.sequence_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test]
async fn empty_index_returns_empty() {
    let idx = FlatIndex::new("t", Metric::Cosine, Some(3));
    assert!(idx.query(&[1.0, 0.0, 0.0], 5).await.expect("query").is_empty());
    assert_eq!(idx.count().await.expect("count"), 0);
}

#[tokio::test]
async fn build_is_idempotent() {
    let mut idx = FlatIndex::new("t", Metric::Cosine, Some(2));
    idx.build(passages(&["a", "b"]), vec![vec![1.0, 0.0], vec![0.0, 1.0]]).await.expect("build");
    idx.build(passages(&["x", "y", "z"]), vec![vec![1.0, 0.0]; 3]).await.expect("second build is a no-op");
    assert_eq!(idx.count().await.expect("count"), 2);
    let texts: Vec<String> = idx.entries().await.expect("entries").into_iter().map(|e| e.passage.text).collect();
    assert_eq!(texts, vec!["a", "b"]);
}

#[tokio::test]
async fn k_bounds_result_count() {
    let mut idx = FlatIndex::new("t", Metric::Cosine, Some(2));
    idx.build(passages(&["a", "b", "c"]), vec![vec![1.0, 0.0]; 3]).await.expect("build");
    assert_eq!(idx.query(&[1.0, 0.0], 10).await.expect("query").len(), 3);
    assert_eq!(idx.query(&[1.0, 0.0], 1).await.expect("query").len(), 1);
    assert!(idx.query(&[1.0, 0.0], 0).await.expect("query").is_empty());
}

#[tokio::test]
async fn wrong_dimensions_are_rejected() {
    let mut idx = FlatIndex::new("t", Metric::Cosine, Some(3));
    let err = idx.build(passages(&["a"]), vec![vec![1.0, 0.0]]).await.expect_err("dim");
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
    let err = idx.build(passages(&["a", "b"]), vec![vec![1.0, 0.0, 0.0]]).await.expect_err("count");
    assert!(matches!(err, Error::CountMismatch { .. }));

    idx.build(passages(&["a"]), vec![vec![1.0, 0.0, 0.0]]).await.expect("build");
    let err = idx.query(&[1.0], 1).await.expect_err("query dim");
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 1 }));
}

#[tokio::test]
async fn l2_similarity_is_clamped_at_zero() {
    let mut idx = FlatIndex::new("t", Metric::L2, Some(2));
    idx.build(passages(&["near", "far"]), vec![vec![0.5, 0.0], vec![10.0, 10.0]]).await.expect("build");
    let hits = idx.query(&[0.0, 0.0], 2).await.expect("query");
    assert_eq!(hits[0].passage.text, "near");
    assert!((hits[0].scores.similarity - 0.5).abs() < 1e-6);
    assert_eq!(hits[1].scores.similarity, 0.0);
}

#[tokio::test]
async fn factory_selects_flat_by_default() {
    let backend = open_backend("policy", &IndexSettings::default(), 4).await.expect("backend");
    assert_eq!(backend.kind(), BackendKind::Flat);
    assert_eq!(backend.name(), "policy");
    assert_eq!(backend.dim(), Some(4));

    let managed = IndexSettings { backend: BackendKind::Managed, ..Default::default() };
    assert!(matches!(open_backend("policy", &managed, 4).await, Err(Error::InvalidConfig(_))));
    assert!(matches!(open_backend("policy", &IndexSettings::default(), 0).await, Err(Error::InvalidConfig(_))));
}
