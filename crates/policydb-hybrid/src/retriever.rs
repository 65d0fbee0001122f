//! The retrieval pipeline: chunk, embed, index, then answer queries with
//! vector search, hybrid fusion and an optional rerank pass.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use policydb_core::chunker::{normalize, Chunker};
use policydb_core::config::Settings;
use policydb_core::error::Result;
use policydb_core::traits::{IndexBackend, Reranker};
use policydb_core::types::{BackendKind, Passage, ScoredPassage};
use policydb_embed::BatchEmbedder;
use policydb_store::{snapshot, IndexArtifact, OpenedIndex, PersistenceAdapter};
use policydb_text::{TfIdfModel, TfIdfReranker};

use crate::ranker::HybridRanker;

/// Questions answered concurrently by [`Retriever::retrieve_many`].
pub const MAX_CONCURRENT_QUERIES: usize = 8;

pub struct Retriever {
    backend: Box<dyn IndexBackend>,
    embedder: BatchEmbedder,
    ranker: HybridRanker,
    chunker: Chunker,
    reranker: Option<TfIdfReranker>,
    rerank: bool,
    fetch_multiplier: usize,
    shortlist_factor: usize,
}

impl Retriever {
    pub fn new(backend: Box<dyn IndexBackend>, embedder: BatchEmbedder, ranker: HybridRanker, chunker: Chunker) -> Self {
        Self { backend, embedder, ranker, chunker, reranker: None, rerank: true, fetch_multiplier: 3, shortlist_factor: 3 }
    }

    pub fn from_settings(backend: Box<dyn IndexBackend>, embedder: BatchEmbedder, settings: &Settings) -> Result<Self> {
        let h = &settings.hybrid;
        Ok(Self::new(backend, embedder, HybridRanker::from_settings(h)?, Chunker::from_settings(&settings.chunking)?)
            .with_rerank(h.rerank)
            .with_fetch_multiplier(h.fetch_multiplier)
            .with_shortlist_factor(h.shortlist_factor))
    }

    /// Wrap an index opened through the persistence adapter, restoring the
    /// saved lexical model or refitting it from the backend's entries.
    pub async fn from_opened(opened: OpenedIndex, embedder: BatchEmbedder, settings: &Settings) -> Result<Self> {
        let mut r = Self::from_settings(opened.backend, embedder, settings)?.with_lexical(opened.lexical);
        if r.rerank && r.reranker.is_none() && r.backend.count().await? > 0 {
            match r.backend.entries().await {
                Ok(entries) => r.reranker = Some(TfIdfReranker::fit(entries.iter().map(|e| e.passage.text.as_str()))),
                Err(e) => debug!(error = %e, "backend cannot export entries; reranking disabled"),
            }
        }
        info!(index = r.backend.name(), origin = %opened.origin, rerank = r.reranker.is_some(), "retriever ready");
        Ok(r)
    }

    #[must_use]
    pub fn with_rerank(mut self, enabled: bool) -> Self { self.rerank = enabled; self }
    #[must_use]
    pub fn with_fetch_multiplier(mut self, n: usize) -> Self { self.fetch_multiplier = n.max(1); self }
    #[must_use]
    pub fn with_shortlist_factor(mut self, n: usize) -> Self { self.shortlist_factor = n.max(1); self }
    #[must_use]
    pub fn with_lexical(mut self, model: Option<TfIdfModel>) -> Self {
        self.reranker = model.filter(TfIdfModel::is_fitted).map(TfIdfReranker::new);
        self
    }

    pub fn backend(&self) -> &dyn IndexBackend { self.backend.as_ref() }
    pub fn lexical(&self) -> Option<&TfIdfModel> { self.reranker.as_ref().map(TfIdfReranker::model) }

    /// Chunk, embed and index one document. Returns the number of passages
    /// indexed, or 0 when the index already holds entries.
    pub async fn index_document(&mut self, text: &str, source: &str) -> Result<usize> {
        if self.skip_populated().await? {
            return Ok(0);
        }
        let normalized = normalize(text);
        let passages: Vec<Passage> = self.chunker.split(&normalized, source)?.collect();
        self.build_from(passages).await
    }

    /// Embed and index passages that were split elsewhere.
    pub async fn index_passages(&mut self, passages: Vec<Passage>) -> Result<usize> {
        if self.skip_populated().await? {
            return Ok(0);
        }
        self.build_from(passages).await
    }

    async fn skip_populated(&self) -> Result<bool> {
        let existing = self.backend.count().await?;
        if existing > 0 {
            debug!(index = self.backend.name(), entries = existing, "index already populated; skipping ingest");
        }
        Ok(existing > 0)
    }

    async fn build_from(&mut self, passages: Vec<Passage>) -> Result<usize> {
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        let n = passages.len();
        self.backend.build(passages, vectors).await?;
        if self.rerank {
            self.reranker = Some(TfIdfReranker::fit(&texts));
        }
        info!(index = self.backend.name(), passages = n, model = self.embedder.model_id(), "indexed passages");
        Ok(n)
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> { self.retrieve_with_alpha(query, k, None).await }

    /// Ranked, deduplicated passages for `query`. `alpha` overrides the
    /// ranker's configured weight for this call.
    pub async fn retrieve_with_alpha(&self, query: &str, k: usize, alpha: Option<f32>) -> Result<Vec<ScoredPassage>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let qv = self.embedder.embed_query(query).await?;
        let fetch = k.saturating_mul(self.fetch_multiplier);
        let candidates = self.backend.query(&qv, fetch).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let ranked = match alpha {
            Some(a) => self.ranker.rank_with_alpha(query, candidates, fetch, a)?,
            None => self.ranker.rank(query, candidates, fetch),
        };
        let mut ranked = dedupe(ranked);
        if let Some(reranker) = self.reranker.as_ref().filter(|_| self.rerank) {
            ranked.truncate(k.saturating_mul(self.shortlist_factor));
            rerank(reranker, query, &mut ranked)?;
        }
        ranked.truncate(k);
        debug!(query, k, returned = ranked.len(), "retrieved passages");
        Ok(ranked)
    }

    /// Like [`retrieve`](Self::retrieve) but degrades to an empty list on
    /// recoverable failures. Configuration and dimensionality errors still
    /// surface.
    pub async fn retrieve_or_empty(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        match self.retrieve(query, k).await {
            Ok(hits) => Ok(hits),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(query, error = %e, "retrieval failed; returning no passages");
                Ok(Vec::new())
            }
        }
    }

    /// One result per question, in input order.
    pub async fn retrieve_many(&self, queries: &[String], k: usize) -> Vec<Result<Vec<ScoredPassage>>> {
        stream::iter(queries.iter().map(|q| self.retrieve_or_empty(q, k)))
            .buffered(MAX_CONCURRENT_QUERIES)
            .collect()
            .await
    }

    pub async fn snapshot(&self) -> Result<IndexArtifact> { snapshot(self.backend.as_ref(), self.lexical()).await }

    /// Write an artifact to every storage tier. Managed indexes persist on
    /// the service side, so nothing is written for them and no locations are
    /// returned.
    pub async fn save(&self, adapter: &PersistenceAdapter) -> Result<Vec<String>> {
        if self.backend.kind() == BackendKind::Managed {
            info!(index = self.backend.name(), "managed index is persisted by the service; skipping artifact save");
            return Ok(Vec::new());
        }
        let artifact = self.snapshot().await?;
        adapter.save(&artifact).await
    }
}

/// Keep the first (best-ranked) passage for each distinct trimmed text.
fn dedupe(ranked: Vec<ScoredPassage>) -> Vec<ScoredPassage> {
    let mut seen = HashSet::new();
    ranked.into_iter().filter(|c| seen.insert(c.passage.text.trim().to_string())).collect()
}

fn rerank(reranker: &dyn Reranker, query: &str, shortlist: &mut Vec<ScoredPassage>) -> Result<()> {
    let pairs: Vec<(&str, &str)> = shortlist.iter().map(|c| (query, c.passage.text.as_str())).collect();
    let scores = reranker.score(&pairs)?;
    for (c, s) in shortlist.iter_mut().zip(scores) {
        c.scores.rerank = Some(s);
    }
    shortlist.sort_by(|a, b| b.score().total_cmp(&a.score()));
    Ok(())
}
