use async_trait::async_trait;
use tracing::{debug, info};

use policydb_core::error::Result;
use policydb_core::traits::IndexBackend;
use policydb_core::types::{BackendKind, IndexEntry, Metric, Passage, ScoredPassage, Vector};

use crate::similarity::{check_query_dim, similarity, sort_and_truncate, validate_build};

/// Exhaustive in-memory index. Exact, and fast enough for the few hundred
/// passages a single policy document produces.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    name: String,
    metric: Metric,
    dim: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn new(name: impl Into<String>, metric: Metric, dim: Option<usize>) -> Self {
        Self { name: name.into(), metric, dim, entries: Vec::new() }
    }

    pub fn metric(&self) -> Metric { self.metric }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[async_trait]
impl IndexBackend for FlatIndex {
    fn name(&self) -> &str { &self.name }
    fn kind(&self) -> BackendKind { BackendKind::Flat }
    fn dim(&self) -> Option<usize> { self.dim }

    async fn build(&mut self, passages: Vec<Passage>, vectors: Vec<Vector>) -> Result<()> {
        if !self.entries.is_empty() {
            debug!(index = %self.name, entries = self.entries.len(), "index already built; skipping");
            return Ok(());
        }
        let dim = validate_build(&passages, &vectors, self.dim)?;
        self.entries = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| IndexEntry { passage, vector })
            .collect();
        self.entries.sort_by_key(|e| e.passage.sequence_index);
        self.dim = Some(dim);
        info!(index = %self.name, entries = self.entries.len(), dim, metric = %self.metric, "built flat index");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_query_dim(vector, self.dim)?;
        let mut hits: Vec<ScoredPassage> = self
            .entries
            .iter()
            .map(|e| ScoredPassage::from_similarity(e.passage.clone(), similarity(self.metric, vector, &e.vector)))
            .collect();
        sort_and_truncate(&mut hits, k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> { Ok(self.entries.len()) }

    async fn entries(&self) -> Result<Vec<IndexEntry>> { Ok(self.entries.clone()) }
}
