//! policydb-text
//!
//! Lexical side of retrieval: a tantivy-based analyzer, keyword overlap
//! scoring for hybrid ranking, and a TF-IDF model used by the reranker.

pub mod analyzer;
pub mod keyword;
pub mod rerank;
pub mod tfidf;

pub use analyzer::Analyzer;
pub use keyword::KeywordQuery;
pub use rerank::TfIdfReranker;
pub use tfidf::TfIdfModel;
