use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BackendKind, IndexEntry, Passage, ScoredPassage, TaskType, Vector};

/// A service that turns one text into one vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Stable identifier of the model behind the service (e.g. `hashing:d384`).
    fn model_id(&self) -> &str;
    /// Dimensionality of every vector this service returns.
    fn dim(&self) -> usize;

    async fn embed_one(&self, text: &str, task: TaskType) -> Result<Vector>;

    /// One result per input, in input order. Services with a native batch
    /// endpoint override this; the default issues one call per text.
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Vec<Result<Vector>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed_one(t, task).await);
        }
        out
    }
}

/// Storage plus nearest-neighbour search over passage vectors.
///
/// Built once by a single writer, then queried concurrently through `&self`.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> BackendKind;
    /// Dimensionality fixed by configuration or by the first build, if known.
    fn dim(&self) -> Option<usize>;

    /// No-op when the index already holds entries.
    async fn build(&mut self, passages: Vec<Passage>, vectors: Vec<Vector>) -> Result<()>;
    /// At most `k` passages by descending similarity; empty on an empty index.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>>;
    async fn count(&self) -> Result<usize>;
    /// Every stored entry ordered by `sequence_index`, for persistence.
    async fn entries(&self) -> Result<Vec<IndexEntry>>;
}

/// Second-pass relevance model over (query, passage text) pairs.
pub trait Reranker: Send + Sync {
    /// One score per pair, same order, reproducible for identical inputs.
    fn score(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>>;
}

/// Opaque key -> bytes store used for index artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short name for logs (`local`, `remote`, ...).
    fn label(&self) -> &str;
    /// Replace whatever is stored under `key`; returns where it landed.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}
