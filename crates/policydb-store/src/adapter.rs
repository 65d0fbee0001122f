//! Tiered persistence with an explicit fallback chain:
//! local artifact, then remote artifact, then a fresh empty index.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use policydb_core::config::{api_key_from_env, expand_path, IndexSettings, StorageSettings};
use policydb_core::error::{Error, Result};
use policydb_core::traits::{BlobStore, IndexBackend};
use policydb_text::TfIdfModel;
use policydb_vector::open_backend;

use crate::artifact::IndexArtifact;
use crate::blob::{FsBlobStore, HttpBlobStore};

/// Where an opened index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Local,
    Remote,
    Fresh,
}

impl fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
            Self::Fresh => f.write_str("fresh"),
        }
    }
}

struct Tier {
    origin: IndexOrigin,
    store: Arc<dyn BlobStore>,
}

/// An index ready for use plus the lexical model saved alongside it.
pub struct OpenedIndex {
    pub backend: Box<dyn IndexBackend>,
    pub lexical: Option<TfIdfModel>,
    pub origin: IndexOrigin,
}

#[derive(Default)]
pub struct PersistenceAdapter {
    tiers: Vec<Tier>,
}

impl PersistenceAdapter {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_local(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.tiers.push(Tier { origin: IndexOrigin::Local, store });
        self
    }

    #[must_use]
    pub fn with_remote(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.tiers.push(Tier { origin: IndexOrigin::Remote, store });
        self
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let mut adapter = Self::new();
        if let Some(dir) = &settings.local_dir {
            adapter = adapter.with_local(Arc::new(FsBlobStore::new(expand_path(dir))));
        }
        if let Some(url) = &settings.remote_url {
            let store = HttpBlobStore::new(url, api_key_from_env(&settings.remote_api_key_env), Duration::from_secs(settings.timeout_secs))?;
            adapter = adapter.with_remote(Arc::new(store));
        }
        Ok(adapter)
    }

    pub fn tier_count(&self) -> usize { self.tiers.len() }

    /// Write to every tier. Succeeds if at least one tier took the artifact.
    pub async fn save(&self, artifact: &IndexArtifact) -> Result<Vec<String>> {
        if self.tiers.is_empty() {
            return Err(Error::Persistence("no storage tiers configured".into()));
        }
        let bytes = artifact.encode()?;
        let key = IndexArtifact::key(&artifact.index_name);
        let mut saved = Vec::new();
        let mut last_err = None;
        for tier in &self.tiers {
            match tier.store.put(&key, bytes.clone()).await {
                Ok(location) => {
                    info!(tier = tier.store.label(), %location, entries = artifact.entries.len(), "saved index artifact");
                    saved.push(location);
                }
                Err(e) => {
                    warn!(tier = tier.store.label(), error = %e, "failed to save index artifact");
                    last_err = Some(e);
                }
            }
        }
        match (saved.is_empty(), last_err) {
            (true, Some(e)) => Err(Error::Persistence(format!("artifact not saved to any tier: {e}"))),
            _ => Ok(saved),
        }
    }

    /// First valid artifact in tier order. Missing or corrupt tiers are
    /// skipped.
    pub async fn load(&self, index_name: &str) -> Result<(IndexArtifact, IndexOrigin)> {
        let key = IndexArtifact::key(index_name);
        for tier in &self.tiers {
            let label = tier.store.label();
            match tier.store.get(&key).await {
                Ok(Some(bytes)) => match IndexArtifact::decode(&bytes) {
                    Ok(artifact) => {
                        info!(tier = label, index = index_name, entries = artifact.entries.len(), "loaded index artifact");
                        return Ok((artifact, tier.origin));
                    }
                    Err(e) => warn!(tier = label, error = %e, "ignoring unreadable index artifact"),
                },
                Ok(None) => debug!(tier = label, index = index_name, "no artifact in tier"),
                Err(e) => warn!(tier = label, error = %e, "artifact tier unavailable"),
            }
        }
        Err(Error::Persistence(format!("no valid artifact for `{index_name}` in {} tier(s)", self.tiers.len())))
    }

    /// Open `index_name`: restore from the first valid tier, otherwise start
    /// fresh. Only backend construction errors are returned.
    pub async fn open_index(&self, index_name: &str, settings: &IndexSettings, dim: usize) -> Result<OpenedIndex> {
        match self.load(index_name).await {
            Ok((artifact, origin)) if artifact.dim == dim => {
                let mut backend = open_backend(index_name, settings, dim).await?;
                if artifact.backend != settings.backend {
                    debug!(from = %artifact.backend, to = %settings.backend, "restoring artifact into a different backend");
                }
                match restore(backend.as_mut(), artifact.entries).await {
                    Ok(()) => return Ok(OpenedIndex { backend, lexical: artifact.lexical, origin }),
                    Err(e) => warn!(index = index_name, error = %e, "failed to restore artifact; starting fresh"),
                }
            }
            Ok((artifact, _)) => warn!(
                index = index_name,
                artifact_dim = artifact.dim,
                embedder_dim = dim,
                "artifact dimensionality does not match embedder; starting fresh"
            ),
            Err(e) => info!(index = index_name, reason = %e, "no saved index; starting fresh"),
        }
        let backend = open_backend(index_name, settings, dim).await?;
        Ok(OpenedIndex { backend, lexical: None, origin: IndexOrigin::Fresh })
    }
}

async fn restore(backend: &mut dyn IndexBackend, entries: Vec<policydb_core::types::IndexEntry>) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let (passages, vectors) = entries.into_iter().map(|e| (e.passage, e.vector)).unzip();
    backend.build(passages, vectors).await
}

/// Capture a live backend (and its lexical model) as an artifact.
pub async fn snapshot(backend: &dyn IndexBackend, lexical: Option<&TfIdfModel>) -> Result<IndexArtifact> {
    let entries = backend.entries().await?;
    let Some(first) = entries.first() else {
        return Err(Error::EmptyIndex(backend.name().to_string()));
    };
    let dim = backend.dim().unwrap_or(first.vector.len());
    Ok(IndexArtifact::new(backend.name(), backend.kind(), dim, entries, lexical.cloned()))
}
