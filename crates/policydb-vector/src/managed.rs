//! Client for a managed vector-index service.
//!
//! Endpoints (JSON over HTTP, optional bearer token):
//! - `POST   {endpoint}/indexes`                 create `{name, dimension, metric}`; 409 means it exists
//! - `POST   {endpoint}/indexes/{name}/upsert`   `{vectors: [{id, values, metadata}]}`
//! - `POST   {endpoint}/indexes/{name}/query`    `{vector, top_k}` -> `{matches: [{id, distance, metadata}]}`
//! - `GET    {endpoint}/indexes/{name}/stats`    -> `{vector_count, dimension}`
//!
//! The service owns persistence, so `entries()` is not supported.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use policydb_core::config::{api_key_from_env, IndexSettings};
use policydb_core::error::{Error, Result};
use policydb_core::traits::IndexBackend;
use policydb_core::types::{BackendKind, IndexEntry, Metric, Passage, ScoredPassage, Vector};

use crate::similarity::{check_query_dim, from_distance, sort_and_truncate, validate_build};

const UPSERT_CHUNK: usize = 100;

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct VectorRecord<'a> {
    id: String,
    values: &'a [f32],
    metadata: &'a Passage,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    distance: f32,
    metadata: Passage,
}

#[derive(Debug, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    #[serde(default)]
    pub dimension: Option<usize>,
}

pub struct ManagedIndex {
    client: Client,
    endpoint: String,
    name: String,
    metric: Metric,
    dim: Option<usize>,
    api_key: Option<String>,
}

impl ManagedIndex {
    pub fn new(endpoint: impl Into<String>, name: impl Into<String>, metric: Metric, dim: Option<usize>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig("managed index endpoint cannot be empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.trim_end_matches('/').to_string(), name: name.into(), metric, dim, api_key })
    }

    pub fn from_settings(name: &str, settings: &IndexSettings, dim: usize) -> Result<Self> {
        let endpoint = settings
            .managed_endpoint
            .clone()
            .ok_or_else(|| Error::InvalidConfig("index.managed_endpoint is required for the managed backend".into()))?;
        Self::new(
            endpoint,
            name,
            settings.metric,
            Some(dim),
            api_key_from_env(&settings.managed_api_key_env),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn url(&self, suffix: &str) -> String { format!("{}/indexes{suffix}", self.endpoint) }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        self.authed(req).send().await.map_err(|e| Error::Backend(format!("managed index request failed: {e}")))
    }

    async fn fail(what: &str, resp: Response) -> Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Error::Backend(format!("managed index {what} failed ({status}): {body}"))
    }

    pub async fn create_index(&self, dim: usize) -> Result<()> {
        let body = CreateIndexRequest { name: &self.name, dimension: dim, metric: self.metric.to_string() };
        let resp = self.send(self.client.post(self.url("")).json(&body)).await?;
        match resp.status() {
            s if s.is_success() => {
                info!(index = %self.name, dim, "created managed index");
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!(index = %self.name, "managed index already exists");
                Ok(())
            }
            _ => Err(Self::fail("create", resp).await),
        }
    }

    /// Add or replace passages; ids are the passages' sequence indices.
    pub async fn upsert(&self, passages: &[Passage], vectors: &[Vector]) -> Result<usize> {
        let dim = validate_build(passages, vectors, self.dim)?;
        for (ps, vs) in passages.chunks(UPSERT_CHUNK).zip(vectors.chunks(UPSERT_CHUNK)) {
            let body = UpsertRequest {
                vectors: ps
                    .iter()
                    .zip(vs)
                    .map(|(p, v)| VectorRecord { id: p.sequence_index.to_string(), values: v, metadata: p })
                    .collect(),
            };
            let url = self.url(&format!("/{}/upsert", self.name));
            let resp = self.send(self.client.post(url).json(&body)).await?;
            if !resp.status().is_success() {
                return Err(Self::fail("upsert", resp).await);
            }
        }
        debug!(index = %self.name, upserted = passages.len(), dim, "upserted into managed index");
        Ok(passages.len())
    }

    /// `None` when the service does not know the index.
    pub async fn stats(&self) -> Result<Option<IndexStats>> {
        let resp = self.send(self.client.get(self.url(&format!("/{}/stats", self.name)))).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .json::<IndexStats>()
                .await
                .map(Some)
                .map_err(|e| Error::Backend(format!("managed index stats: {e}"))),
            _ => Err(Self::fail("stats", resp).await),
        }
    }
}

#[async_trait]
impl IndexBackend for ManagedIndex {
    fn name(&self) -> &str { &self.name }
    fn kind(&self) -> BackendKind { BackendKind::Managed }
    fn dim(&self) -> Option<usize> { self.dim }

    async fn build(&mut self, passages: Vec<Passage>, vectors: Vec<Vector>) -> Result<()> {
        let existing = self.count().await?;
        if existing > 0 {
            debug!(index = %self.name, vectors = existing, "managed index already populated; skipping build");
            return Ok(());
        }
        let dim = validate_build(&passages, &vectors, self.dim)?;
        self.create_index(dim).await?;
        self.dim = Some(dim);
        let n = self.upsert(&passages, &vectors).await?;
        info!(index = %self.name, vectors = n, dim, "built managed index");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        check_query_dim(vector, self.dim)?;
        let url = self.url(&format!("/{}/query", self.name));
        let resp = self.send(self.client.post(url).json(&QueryRequest { vector, top_k: k })).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s if s.is_success() => {
                let body: QueryResponse = resp.json().await.map_err(|e| Error::Backend(format!("managed index query: {e}")))?;
                let mut hits: Vec<ScoredPassage> = body
                    .matches
                    .into_iter()
                    .map(|m| ScoredPassage::from_similarity(m.metadata, from_distance(self.metric, m.distance)))
                    .collect();
                sort_and_truncate(&mut hits, k);
                Ok(hits)
            }
            _ => Err(Self::fail("query", resp).await),
        }
    }

    async fn count(&self) -> Result<usize> { Ok(self.stats().await?.map_or(0, |s| s.vector_count)) }

    async fn entries(&self) -> Result<Vec<IndexEntry>> {
        Err(Error::Backend(format!("managed index `{}` does not export entries", self.name)))
    }
}
