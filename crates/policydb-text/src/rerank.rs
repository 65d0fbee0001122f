use policydb_core::error::Result;
use policydb_core::traits::Reranker;

use crate::analyzer::Analyzer;
use crate::tfidf::{cosine, TfIdfModel};

/// Lexical reranker: TF-IDF cosine between query and passage.
///
/// Fully deterministic; the only state is the fitted model.
#[derive(Debug, Clone)]
pub struct TfIdfReranker {
    analyzer: Analyzer,
    model: TfIdfModel,
}

impl TfIdfReranker {
    pub fn new(model: TfIdfModel) -> Self { Self { analyzer: Analyzer::new(), model } }

    pub fn fit<I, S>(docs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let analyzer = Analyzer::new();
        let model = TfIdfModel::fit(&analyzer, docs);
        tracing::debug!(docs = model.n_docs(), vocabulary = model.vocabulary_len(), "fitted tf-idf reranker");
        Self { analyzer, model }
    }

    pub fn model(&self) -> &TfIdfModel { &self.model }
}

impl Reranker for TfIdfReranker {
    fn score(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, passage)| {
                let q = self.model.vectorize(&self.analyzer, query);
                let p = self.model.vectorize(&self.analyzer, passage);
                cosine(&q, &p)
            })
            .collect())
    }
}
