use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use policydb_core::error::{Error, Result};
use policydb_core::traits::BlobStore;

/// Keys become file names and URL segments, so keep them boring.
fn check_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok { Ok(()) } else { Err(Error::InvalidConfig(format!("invalid blob key `{key}`"))) }
}

/// Artifacts as files in one directory; writes go through a temp file and
/// an atomic rename so readers never see a half-written artifact.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
    pub fn dir(&self) -> &Path { &self.dir }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn label(&self) -> &str { "local" }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        check_key(key)?;
        let dir = self.dir.clone();
        let path = dir.join(key);
        tokio::task::spawn_blocking(move || -> Result<String> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(path.display().to_string())
        })
        .await
        .map_err(|e| Error::Persistence(format!("write task failed: {e}")))?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        match tokio::fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Remote blob store speaking plain `PUT`/`GET {base_url}/{key}`.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key })
    }

    fn url(&self, key: &str) -> String { format!("{}/{key}", self.base_url) }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k),
            None => req,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn label(&self) -> &str { "remote" }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        check_key(key)?;
        let url = self.url(key);
        let resp = self
            .authed(self.client.put(&url).header("content-type", "application/octet-stream").body(bytes))
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("upload to {url} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Persistence(format!("upload to {url} failed: {}", resp.status())));
        }
        debug!(%url, "uploaded blob");
        Ok(url)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let url = self.url(key);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("download from {url} failed: {e}")))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let bytes = resp.bytes().await.map_err(|e| Error::Persistence(format!("download from {url} failed: {e}")))?;
                Ok(Some(bytes.to_vec()))
            }
            s => Err(Error::Persistence(format!("download from {url} failed: {s}"))),
        }
    }
}

/// In-process store; handy for tests and for embedding the engine in
/// another service that manages its own storage.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    label: String,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new(label: impl Into<String>) -> Self { Self { label: label.into(), blobs: Mutex::default() } }

    pub fn len(&self) -> usize { self.blobs.lock().map(|b| b.len()).unwrap_or(0) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn label(&self) -> &str { &self.label }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        check_key(key)?;
        let mut blobs = self.blobs.lock().map_err(|_| Error::Persistence("memory store lock poisoned".into()))?;
        blobs.insert(key.to_string(), bytes);
        Ok(format!("memory://{}/{key}", self.label))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let blobs = self.blobs.lock().map_err(|_| Error::Persistence("memory store lock poisoned".into()))?;
        Ok(blobs.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_restricted() {
        assert!(check_key("lightweight_index.idx").is_ok());
        for bad in ["", "../etc", "a/b", ".hidden", "sp ace"] {
            assert!(check_key(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn fs_store_overwrites_atomically() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(tmp.path().join("nested"));
        assert_eq!(store.get("a.idx").await.expect("get"), None);
        store.put("a.idx", b"one".to_vec()).await.expect("put");
        store.put("a.idx", b"two".to_vec()).await.expect("put");
        assert_eq!(store.get("a.idx").await.expect("get").as_deref(), Some(&b"two"[..]));
        let files = std::fs::read_dir(store.dir()).expect("dir").count();
        assert_eq!(files, 1, "no temp files left behind");
    }
}
