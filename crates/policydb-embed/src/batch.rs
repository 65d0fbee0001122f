//! Batched, bounded-concurrency embedding on top of any [`EmbeddingService`].
//!
//! Texts are normalised and truncated, cut into fixed-size batches, and
//! dispatched with at most `concurrency` batches in flight. Results are
//! written back into per-input slots so output order always matches input
//! order no matter which batch finishes first.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, warn};

use policydb_core::config::EmbeddingSettings;
use policydb_core::error::{Error, Result};
use policydb_core::traits::EmbeddingService;
use policydb_core::types::{TaskType, Vector};

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

#[derive(Clone)]
pub struct BatchEmbedder {
    service: Arc<dyn EmbeddingService>,
    batch_size: usize,
    concurrency: usize,
    max_input_chars: usize,
    progress: Option<ProgressBar>,
}

impl BatchEmbedder {
    pub fn new(service: Arc<dyn EmbeddingService>) -> Self {
        Self {
            service,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            progress: None,
        }
    }

    pub fn from_settings(service: Arc<dyn EmbeddingService>, settings: &EmbeddingSettings) -> Self {
        Self::new(service)
            .with_batch_size(settings.batch_size)
            .with_concurrency(settings.concurrency)
            .with_max_input_chars(settings.max_input_chars)
    }

    pub fn with_batch_size(mut self, n: usize) -> Self { self.batch_size = n.max(1); self }
    pub fn with_concurrency(mut self, n: usize) -> Self { self.concurrency = n.max(1); self }
    pub fn with_max_input_chars(mut self, n: usize) -> Self { self.max_input_chars = n.max(1); self }

    /// Advanced after each completed batch by the number of texts in it,
    /// failed ones included, so the position counts texts processed.
    pub fn with_progress(mut self, pb: ProgressBar) -> Self { self.progress = Some(pb); self }

    pub fn dim(&self) -> usize { self.service.dim() }
    pub fn model_id(&self) -> &str { self.service.model_id() }
    pub fn service(&self) -> &Arc<dyn EmbeddingService> { &self.service }

    /// One vector per input, same order. Document texts whose embedding
    /// fails (or comes back with the wrong width) get a zero vector and a
    /// warning; any failure on a query is an error.
    pub async fn embed(&self, texts: &[String], task: TaskType) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let dim = self.service.dim();
        let prepared: Vec<String> = texts.iter().map(|t| preprocess(t, self.max_input_chars)).collect();
        let service = self.service.as_ref();

        let batches = prepared.chunks(self.batch_size).enumerate().map(|(b, chunk)| {
            let offset = b * self.batch_size;
            async move { (offset, chunk.len(), service.embed_batch(chunk, task).await) }
        });
        let mut in_flight = stream::iter(batches).buffer_unordered(self.concurrency);

        let mut slots: Vec<Option<Vector>> = vec![None; texts.len()];
        let mut failures: Vec<(usize, Error)> = Vec::new();
        while let Some((offset, len, results)) = in_flight.next().await {
            if results.len() != len {
                let err = Error::CountMismatch { passages: len, vectors: results.len() };
                debug!(offset, %err, "embedding batch returned wrong number of results");
                failures.extend((offset..offset + len).map(|i| (i, Error::EmbeddingService(err.to_string()))));
            } else {
                for (i, r) in results.into_iter().enumerate() {
                    match r {
                        Ok(v) if v.len() == dim => slots[offset + i] = Some(v),
                        Ok(v) => failures.push((offset + i, Error::DimensionMismatch { expected: dim, actual: v.len() })),
                        Err(e) => failures.push((offset + i, e)),
                    }
                }
            }
            if let Some(pb) = &self.progress { pb.inc(len as u64); }
        }

        if let Some((idx, err)) = failures.first() {
            if task == TaskType::Query {
                return Err(Error::EmbeddingService(format!("query embedding failed: {err}")));
            }
            warn!(
                failed = failures.len(),
                total = texts.len(),
                first_index = idx,
                error = %err,
                "embedding failed for some passages; substituting zero vectors"
            );
        }
        Ok(slots.into_iter().map(|s| s.unwrap_or_else(|| vec![0.0; dim])).collect())
    }

    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vector>> { self.embed(texts, TaskType::Document).await }

    pub async fn embed_query(&self, text: &str) -> Result<Vector> {
        let mut out = self.embed(&[text.to_string()], TaskType::Query).await?;
        out.pop().ok_or_else(|| Error::EmbeddingService("no vector returned for query".into()))
    }
}

/// Collapse whitespace runs to single spaces and cut to `max_chars` chars.
pub fn preprocess(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        collapsed.chars().take(max_chars).collect()
    }
}
