use tracing::debug;

use policydb_core::config::IndexSettings;
use policydb_core::error::{Error, Result};
use policydb_core::traits::IndexBackend;
use policydb_core::types::BackendKind;

use crate::flat::FlatIndex;
use crate::managed::ManagedIndex;

/// Construct the backend named by `settings.backend` for index `name`.
/// A fresh backend is empty (or, for service-backed indexes, whatever the
/// service already holds under that name).
pub async fn open_backend(name: &str, settings: &IndexSettings, dim: usize) -> Result<Box<dyn IndexBackend>> {
    if dim == 0 {
        return Err(Error::InvalidConfig("embedding dimension must be > 0".into()));
    }
    debug!(index = name, backend = %settings.backend, dim, "opening index backend");
    match settings.backend {
        BackendKind::Flat => Ok(Box::new(FlatIndex::new(name, settings.metric, Some(dim)))),
        BackendKind::Lance => open_lance(name, settings, dim).await,
        BackendKind::Managed => Ok(Box::new(ManagedIndex::from_settings(name, settings, dim)?)),
    }
}

#[cfg(feature = "lance")]
async fn open_lance(name: &str, settings: &IndexSettings, dim: usize) -> Result<Box<dyn IndexBackend>> {
    let uri = policydb_core::config::expand_path(&settings.lance_uri);
    Ok(Box::new(crate::lance::LanceIndex::open(&uri, name, settings.metric, Some(dim)).await?))
}

#[cfg(not(feature = "lance"))]
async fn open_lance(_name: &str, _settings: &IndexSettings, _dim: usize) -> Result<Box<dyn IndexBackend>> {
    Err(Error::InvalidConfig("the lance backend requires the `lance` feature".into()))
}
