//! Shared domain model for policydb: passages and scores, the error taxonomy,
//! configuration, the chunker and the traits every engine implements.

pub mod chunker;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use error::{Error, Result};
pub use types::{BackendKind, IndexEntry, Meta, MetaValue, Metric, Passage, ScoredPassage, Scores, TaskType, Vector};
