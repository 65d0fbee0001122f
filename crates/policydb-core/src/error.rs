use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Nothing to index or search.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Passage/vector count mismatch: {passages} passages, {vectors} vectors")]
    CountMismatch { passages: usize, vectors: usize },

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Index is empty: {0}")]
    EmptyIndex(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Index backend error: {0}")]
    Backend(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Fatal errors abort a request; everything else degrades to "no results".
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_and_dimension_errors_are_fatal() {
        assert!(Error::InvalidConfig("x".into()).is_fatal());
        assert!(Error::DimensionMismatch { expected: 3, actual: 4 }.is_fatal());
        assert!(!Error::EmbeddingService("down".into()).is_fatal());
        assert!(!Error::Persistence("corrupt".into()).is_fatal());
        assert!(!Error::EmptyInput("blank".into()).is_fatal());
        assert!(!Error::EmptyIndex("idx".into()).is_fatal());
    }
}
