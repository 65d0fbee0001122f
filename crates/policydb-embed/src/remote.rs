//! HTTP embedding client for Gemini-style `embedContent` /
//! `batchEmbedContents` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use policydb_core::config::{api_key_from_env, EmbeddingSettings};
use policydb_core::error::{Error, Result};
use policydb_core::traits::EmbeddingService;
use policydb_core::types::{TaskType, Vector};

pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Values,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Debug, Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    status: Option<String>,
}

fn task_name(task: TaskType) -> &'static str {
    match task {
        TaskType::Document => "RETRIEVAL_DOCUMENT",
        TaskType::Query => "RETRIEVAL_QUERY",
    }
}

impl RemoteEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>, dim: usize, timeout: Duration) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("remote embedder needs dim > 0".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        let model = model.into();
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            id: format!("remote:{model}:d{dim}"),
            model,
            api_key,
            dim,
        })
    }

    pub fn from_settings(s: &EmbeddingSettings) -> Result<Self> {
        let key = api_key_from_env(&s.api_key_env);
        if key.is_none() {
            debug!(var = %s.api_key_env, "no embedding API key in environment");
        }
        Self::new(&s.endpoint, &s.model, key, s.dim, Duration::from_secs(s.timeout_secs))
    }

    fn request<'a>(&self, text: &'a str, task: TaskType) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content { parts: vec![Part { text }] },
            task_type: task_name(task),
            output_dimensionality: self.dim,
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(&self, method: &str, body: &B) -> Result<R> {
        let url = format!("{}/v1beta/models/{}:{method}", self.endpoint, self.model);
        let mut req = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("x-goog-api-key", key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| Error::EmbeddingService(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ApiError>(&text) {
                Ok(err) => format!("{} - {}", err.error.status.unwrap_or_default(), err.error.message),
                Err(_) => text,
            };
            return Err(Error::EmbeddingService(format!("embedding API error ({status}): {detail}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| Error::EmbeddingService(format!("failed to parse response: {e}")))
    }

    fn check(&self, values: Vec<f32>) -> Result<Vector> {
        if values.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: values.len() });
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingService for RemoteEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_one(&self, text: &str, task: TaskType) -> Result<Vector> {
        let resp: EmbedResponse = self.post("embedContent", &self.request(text, task)).await?;
        self.check(resp.embedding.values)
    }

    /// One HTTP call per batch. A failed call fails every item in it.
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Vec<Result<Vector>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let body = BatchRequest { requests: texts.iter().map(|t| self.request(t, task)).collect() };
        match self.post::<_, BatchResponse>("batchEmbedContents", &body).await {
            Ok(resp) if resp.embeddings.len() == texts.len() => {
                resp.embeddings.into_iter().map(|e| self.check(e.values)).collect()
            }
            Ok(resp) => {
                let msg = Error::CountMismatch { passages: texts.len(), vectors: resp.embeddings.len() }.to_string();
                texts.iter().map(|_| Err(Error::EmbeddingService(msg.clone()))).collect()
            }
            Err(e) => {
                let msg = e.to_string();
                texts.iter().map(|_| Err(Error::EmbeddingService(msg.clone()))).collect()
            }
        }
    }
}
