//! Hybrid retrieval: vector search fused with keyword relevance, optional
//! TF-IDF reranking, and the pipeline that ties indexing and querying
//! together.

pub mod context;
pub mod ranker;
pub mod retriever;

pub use context::assemble_context;
pub use ranker::HybridRanker;
pub use retriever::Retriever;
