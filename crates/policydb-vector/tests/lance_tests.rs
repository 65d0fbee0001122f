#![cfg(feature = "lance")]

use tempfile::TempDir;

use policydb_core::config::IndexSettings;
use policydb_core::traits::IndexBackend;
use policydb_core::types::{BackendKind, Metric, Passage};
use policydb_vector::{open_backend, LanceIndex};

fn corpus() -> (Vec<Passage>, Vec<Vec<f32>>) {
    let ps = vec![
        Passage::new("knee surgery is covered", 0, "DOC1").with_meta("line", 1usize),
        Passage::new("dental is excluded", 1, "DOC1").with_meta("line", 2usize),
        Passage::new("waiting period is 30 days", 2, "DOC1").with_meta("line", 3usize),
    ];
    let vs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
    (ps, vs)
}

#[tokio::test]
async fn lance_build_query_and_export() {
    let tmp = TempDir::new().expect("tempdir");
    let mut idx = LanceIndex::open(tmp.path(), "policy", Metric::Cosine, Some(3)).await.expect("open");
    assert_eq!(idx.count().await.expect("count"), 0);
    assert!(idx.query(&[1.0, 0.0, 0.0], 2).await.expect("empty query").is_empty());

    let (ps, vs) = corpus();
    idx.build(ps.clone(), vs.clone()).await.expect("build");
    assert_eq!(idx.count().await.expect("count"), 3);

    let hits = idx.query(&[0.9, 0.1, 0.0], 2).await.expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].passage.text, "knee surgery is covered");
    assert_eq!(hits[0].passage.metadata, ps[0].metadata);

    let entries = idx.entries().await.expect("entries");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].passage, ps[2]);
    assert_eq!(entries[2].vector, vs[2]);
}

#[tokio::test]
async fn lance_table_survives_reopen_and_build_stays_idempotent() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = IndexSettings {
        backend: BackendKind::Lance,
        lance_uri: tmp.path().to_string_lossy().into_owned(),
        ..Default::default()
    };
    {
        let mut b = open_backend("policy", &settings, 3).await.expect("backend");
        let (ps, vs) = corpus();
        b.build(ps, vs).await.expect("build");
    }
    let mut b = open_backend("policy", &settings, 3).await.expect("reopen");
    assert_eq!(b.kind(), BackendKind::Lance);
    assert_eq!(b.count().await.expect("count"), 3);
    b.build(vec![Passage::new("other", 0, "DOC2")], vec![vec![1.0, 0.0, 0.0]]).await.expect("no-op");
    assert_eq!(b.count().await.expect("count"), 3);
}
