//! Index artifacts and the tiered stores they are saved to.

pub mod adapter;
pub mod artifact;
pub mod blob;

pub use adapter::{snapshot, IndexOrigin, OpenedIndex, PersistenceAdapter};
pub use artifact::IndexArtifact;
pub use blob::{FsBlobStore, HttpBlobStore, MemoryBlobStore};
