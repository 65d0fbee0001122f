//! Embedding services and the batching layer that drives them.

pub mod batch;
pub mod hashing;
pub mod remote;
#[cfg(feature = "candle")]
pub mod model;

use std::sync::Arc;

use tracing::info;

use policydb_core::config::{EmbeddingProvider, EmbeddingSettings};
use policydb_core::error::Result;
use policydb_core::traits::EmbeddingService;

pub use batch::{preprocess, BatchEmbedder};
pub use hashing::HashingEmbedder;
pub use remote::RemoteEmbedder;
#[cfg(feature = "candle")]
pub use model::LocalModelEmbedder;

/// True when `APP_USE_FAKE_EMBEDDINGS` is `1` or `true`.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured embedding service. `APP_USE_FAKE_EMBEDDINGS`
/// overrides the provider with the hashing embedder.
pub fn service_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingService>> {
    if fake_embeddings_requested() {
        info!(dim = settings.dim, "using hashing embedder (APP_USE_FAKE_EMBEDDINGS)");
        return Ok(Arc::new(HashingEmbedder::new(settings.dim)?));
    }
    let service: Arc<dyn EmbeddingService> = match settings.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(settings.dim)?),
        EmbeddingProvider::Remote => Arc::new(RemoteEmbedder::from_settings(settings)?),
        EmbeddingProvider::Local => local_service(settings)?,
    };
    info!(model = service.model_id(), dim = service.dim(), "embedding service ready");
    Ok(service)
}

#[cfg(feature = "candle")]
fn local_service(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingService>> {
    Ok(Arc::new(LocalModelEmbedder::load(settings.model_dir.as_deref())?))
}

#[cfg(not(feature = "candle"))]
fn local_service(_settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingService>> {
    Err(policydb_core::error::Error::InvalidConfig("local embedding provider requires the `candle` feature".into()))
}
