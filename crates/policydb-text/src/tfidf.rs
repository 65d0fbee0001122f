//! TF-IDF model fitted on one document's passages.
//!
//! The fitted state (document frequencies and corpus size) is plain data so
//! it can travel inside a persisted index artifact and be restored without
//! refitting.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analyzer::Analyzer;

/// Sparse, L2-normalised term weights.
pub type SparseVector = HashMap<String, f32>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfModel {
    n_docs: usize,
    doc_freq: BTreeMap<String, usize>,
}

impl TfIdfModel {
    pub fn fit<I, S>(analyzer: &Analyzer, docs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut model = Self::default();
        for doc in docs {
            model.n_docs += 1;
            let seen: HashSet<String> = analyzer.term_set(doc.as_ref());
            for term in seen { *model.doc_freq.entry(term).or_default() += 1; }
        }
        model
    }

    pub fn n_docs(&self) -> usize { self.n_docs }
    pub fn vocabulary_len(&self) -> usize { self.doc_freq.len() }
    pub fn is_fitted(&self) -> bool { self.n_docs > 0 }

    /// Smoothed inverse document frequency: `ln((1 + n) / (1 + df)) + 1`.
    /// Unseen terms get the maximum weight.
    pub fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0);
        ((1.0 + self.n_docs as f32) / (1.0 + df as f32)).ln() + 1.0
    }

    pub fn vectorize(&self, analyzer: &Analyzer, text: &str) -> SparseVector {
        let mut tf: HashMap<String, f32> = HashMap::new();
        for t in analyzer.tokens(text) { *tf.entry(t).or_default() += 1.0; }
        let mut v: SparseVector = tf.into_iter().map(|(t, n)| { let w = n * self.idf(&t); (t, w) }).collect();
        let norm = v.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for w in v.values_mut() { *w /= norm; }
        }
        v
    }
}

/// Dot product of two normalised sparse vectors.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter_map(|(t, w)| large.get(t).map(|x| w * x)).sum()
}
