//! Domain types shared by the chunker, embedders, index backends and rankers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self { Self::Text(v.to_string()) }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self { Self::Text(v) }
}

/// Ordered so that serialized artifacts are byte-stable.
pub type Meta = BTreeMap<String, MetaValue>;

pub type Vector = Vec<f32>;

/// A chunk of one source document.
///
/// - `text`: the passage payload, never blank
/// - `sequence_index`: 0-based position within the document's passage set
/// - `source`: identifier of the document the passage came from
/// - `metadata`: any further scalar annotations (`line`, `char_start`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub sequence_index: usize,
    pub source: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Passage {
    pub fn new(text: impl Into<String>, sequence_index: usize, source: impl Into<String>) -> Self {
        Self { text: text.into(), sequence_index, source: source.into(), metadata: Meta::new() }
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A passage and its vector as stored by an index backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub passage: Passage,
    pub vector: Vector,
}

/// Named scores attached to a passage while ranking one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    #[serde(rename = "similarity_score")]
    pub similarity: f32,
    #[serde(rename = "keyword_score", skip_serializing_if = "Option::is_none")]
    pub keyword: Option<f32>,
    #[serde(rename = "hybrid_score", skip_serializing_if = "Option::is_none")]
    pub hybrid: Option<f32>,
    #[serde(rename = "rerank_score", skip_serializing_if = "Option::is_none")]
    pub rerank: Option<f32>,
}

/// A query-time result. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub scores: Scores,
}

impl ScoredPassage {
    pub fn from_similarity(passage: Passage, similarity: f32) -> Self {
        Self { passage, scores: Scores { similarity, ..Scores::default() } }
    }

    /// The most refined score available: rerank, then hybrid, then similarity.
    pub fn score(&self) -> f32 {
        self.scores.rerank.or(self.scores.hybrid).unwrap_or(self.scores.similarity)
    }
}

/// What a text is being embedded for; remote services embed the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Document,
    Query,
}

/// Distance metric of a vector index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::L2 => f.write_str("l2"),
        }
    }
}

/// Which index backend implementation holds the vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Flat,
    Lance,
    Managed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Lance => f.write_str("lance"),
            Self::Managed => f.write_str("managed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_prefers_most_refined_stage() {
        let mut sp = ScoredPassage::from_similarity(Passage::new("a", 0, "doc"), 0.4);
        assert!((sp.score() - 0.4).abs() < f32::EPSILON);
        sp.scores.hybrid = Some(0.6);
        assert!((sp.score() - 0.6).abs() < f32::EPSILON);
        sp.scores.rerank = Some(0.1);
        assert!((sp.score() - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let p = Passage::new("text", 2, "DOC3")
            .with_meta("line", 3usize)
            .with_meta("table", true)
            .with_meta("title", "Exclusions");
        let json = serde_json::to_string(&p).expect("serialize");
        let back: Passage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, p);
    }

    #[test]
    fn scores_serialize_with_named_keys() {
        let sp = ScoredPassage {
            passage: Passage::new("x", 0, "d"),
            scores: Scores { similarity: 0.5, keyword: Some(1.0), hybrid: Some(0.65), rerank: None },
        };
        let v = serde_json::to_value(&sp).expect("serialize");
        assert!(v["scores"].get("similarity_score").is_some());
        assert!(v["scores"].get("keyword_score").is_some());
        assert!(v["scores"].get("hybrid_score").is_some());
        assert!(v["scores"].get("rerank_score").is_none());
    }
}
