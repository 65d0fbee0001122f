//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_HYBRID__ALPHA=0.5`). Every setting
//! has a default so an empty environment yields a working offline setup.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{BackendKind, Metric};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("config.toml"), &env_name)
    }

    /// Load with an explicit base file; the env overlay sits next to it.
    pub fn load_from(base: &Path, env_name: &str) -> Result<Self> {
        let overlay = |suffix: &str| base.with_file_name(format!("config.{suffix}.toml"));
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(base));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(overlay("dev"))),
            "prod" | "production" => figment = figment.merge(Toml::file(overlay("prod"))),
            "test" | "testing" => figment = figment.merge(Toml::file(overlay("test"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub hybrid: HybridSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 || c.overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking: need 0 <= overlap < chunk_size (got {} / {})",
                c.overlap, c.chunk_size
            )));
        }
        let e = &self.embedding;
        if e.dim == 0 || e.batch_size == 0 || e.concurrency == 0 || e.max_input_chars == 0 {
            return Err(Error::InvalidConfig(
                "embedding: dim, batch_size, concurrency and max_input_chars must be > 0".into(),
            ));
        }
        if e.provider == EmbeddingProvider::Remote && e.endpoint.is_empty() {
            return Err(Error::InvalidConfig("embedding: remote provider needs an endpoint".into()));
        }
        if self.index.name.trim().is_empty() {
            return Err(Error::InvalidConfig("index: name cannot be empty".into()));
        }
        if self.index.backend == BackendKind::Managed && self.index.managed_endpoint.is_none() {
            return Err(Error::InvalidConfig("index: managed backend needs managed_endpoint".into()));
        }
        let h = &self.hybrid;
        if !(0.0..=1.0).contains(&h.alpha) {
            return Err(Error::InvalidConfig(format!("hybrid: alpha must be in [0, 1] (got {})", h.alpha)));
        }
        if h.fetch_multiplier == 0 || h.shortlist_factor == 0 {
            return Err(Error::InvalidConfig("hybrid: multipliers must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Character budget per passage.
    pub chunk_size: usize,
    /// Characters shared by consecutive passages.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 800, overlap: 100 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Offline feature-hashing embedder.
    #[default]
    Hashing,
    /// HTTP embedding API.
    Remote,
    /// Local transformer model (requires the `candle` feature).
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub dim: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_input_chars: usize,
    pub endpoint: String,
    pub model: String,
    /// Name of the env var holding the API key; the key itself never lives in config.
    pub api_key_env: String,
    pub model_dir: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dim: 384,
            batch_size: 32,
            concurrency: 8,
            max_input_chars: 8000,
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "text-embedding-004".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model_dir: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub name: String,
    pub backend: BackendKind,
    pub metric: Metric,
    /// LanceDB database URI for the `lance` backend.
    pub lance_uri: String,
    pub managed_endpoint: Option<String>,
    pub managed_api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "lightweight_index".to_string(),
            backend: BackendKind::Flat,
            metric: Metric::Cosine,
            lance_uri: "~/.policydb/lancedb".to_string(),
            managed_endpoint: None,
            managed_api_key_env: "VECTOR_INDEX_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordScoring {
    /// Fraction of query terms present in the passage.
    #[default]
    Overlap,
    /// Term-frequency weighted overlap.
    TfWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSettings {
    /// Weight of semantic similarity; `1 - alpha` goes to keyword relevance.
    pub alpha: f32,
    pub keyword: KeywordScoring,
    /// Candidates fetched from the backend per requested result.
    pub fetch_multiplier: usize,
    pub rerank: bool,
    /// Shortlist size handed to the reranker per requested result.
    pub shortlist_factor: usize,
    pub default_k: usize,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            keyword: KeywordScoring::Overlap,
            fetch_multiplier: 3,
            rerank: true,
            shortlist_factor: 3,
            default_k: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Local artifact directory, tried first on load.
    pub local_dir: Option<String>,
    /// Base URL of the remote blob store, tried second.
    pub remote_url: Option<String>,
    pub remote_api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            local_dir: Some("~/.policydb/artifacts".to_string()),
            remote_url: None,
            remote_api_key_env: "BLOB_STORE_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Read an API key from the env var named in config; empty when unset.
pub fn api_key_from_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}
