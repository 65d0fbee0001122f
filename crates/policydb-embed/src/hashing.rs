use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use policydb_core::error::{Error, Result};
use policydb_core::traits::EmbeddingService;
use policydb_core::types::{TaskType, Vector};

/// Deterministic feature-hashing embedder: every lower-cased word is hashed
/// into one of `dim` buckets and the result is L2-normalised. Texts sharing
/// words get positive cosine similarity, which is all tests and offline use
/// need.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("hashing embedder needs dim > 0".into()));
        }
        Ok(Self { dim, id: format!("hashing:d{dim}") })
    }

    pub fn embed_text(&self, text: &str) -> Vector {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_one(&self, text: &str, _task: TaskType) -> Result<Vector> { Ok(self.embed_text(text)) }
}
