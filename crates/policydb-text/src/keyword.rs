//! Lexical relevance of a passage to a query, in `[0, 1]`-ish units that the
//! hybrid ranker clamps before fusing with vector similarity.

use std::collections::{HashMap, HashSet};

use policydb_core::config::KeywordScoring;

use crate::analyzer::Analyzer;

/// Guards the query-term denominator when a query is all stop words.
pub const EPSILON: f32 = 1e-9;

/// Query terms prepared once and scored against many passages.
#[derive(Debug, Clone)]
pub struct KeywordQuery {
    terms: HashSet<String>,
    mode: KeywordScoring,
}

impl KeywordQuery {
    pub fn new(analyzer: &Analyzer, query: &str, mode: KeywordScoring) -> Self {
        Self { terms: analyzer.term_set(query), mode }
    }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    /// Score one passage; never negative.
    pub fn score(&self, analyzer: &Analyzer, passage: &str) -> f32 {
        let doc = analyzer.tokens(passage);
        match self.mode {
            KeywordScoring::Overlap => overlap(&self.terms, &doc),
            KeywordScoring::TfWeighted => tf_weighted(&self.terms, &doc),
        }
    }
}

/// `|Q ∩ D| / |Q|`
pub fn overlap(query_terms: &HashSet<String>, doc_tokens: &[String]) -> f32 {
    let doc: HashSet<&str> = doc_tokens.iter().map(String::as_str).collect();
    let hits = query_terms.iter().filter(|t| doc.contains(t.as_str())).count();
    hits as f32 / (query_terms.len() as f32).max(EPSILON)
}

/// Each matched term contributes `tf * ln(|D| / (tf + 1))`, summed and divided
/// by the number of query terms. Terms that dominate a short passage get a
/// negative weight, so the total is floored at zero.
pub fn tf_weighted(query_terms: &HashSet<String>, doc_tokens: &[String]) -> f32 {
    if doc_tokens.is_empty() {
        return 0.0;
    }
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens { *tf.entry(t.as_str()).or_default() += 1; }
    let doc_len = doc_tokens.len() as f32;
    let total: f32 = query_terms
        .iter()
        .filter_map(|t| tf.get(t.as_str()))
        .map(|&n| {
            let n = n as f32;
            n * (doc_len / (n + 1.0)).ln()
        })
        .sum();
    (total / (query_terms.len() as f32).max(EPSILON)).max(0.0)
}
