//! Distance/similarity helpers shared by every backend, so a passage gets
//! the same score whichever index served it.

use std::cmp::Ordering;

use policydb_core::error::{Error, Result};
use policydb_core::types::{Metric, Passage, ScoredPassage, Vector};

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Map a backend-reported distance onto a similarity: cosine `1 - d`,
/// L2 `max(0, 1 - d)`.
pub fn from_distance(metric: Metric, d: f32) -> f32 {
    match metric {
        Metric::Cosine => 1.0 - d,
        Metric::L2 => (1.0 - d).max(0.0),
    }
}

pub fn similarity(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::L2 => from_distance(Metric::L2, l2_distance(a, b)),
    }
}

/// Similarity descending, ties by ascending `sequence_index`.
pub fn rank_order(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    b.scores
        .similarity
        .total_cmp(&a.scores.similarity)
        .then_with(|| a.passage.sequence_index.cmp(&b.passage.sequence_index))
}

pub fn sort_and_truncate(hits: &mut Vec<ScoredPassage>, k: usize) {
    hits.sort_by(rank_order);
    hits.truncate(k);
}

/// Checks shared by every `build`: equal counts, at least one passage, one
/// width for all vectors matching `expected` when known. Returns the width.
pub fn validate_build(passages: &[Passage], vectors: &[Vector], expected: Option<usize>) -> Result<usize> {
    if passages.len() != vectors.len() {
        return Err(Error::CountMismatch { passages: passages.len(), vectors: vectors.len() });
    }
    let Some(first) = vectors.first() else {
        return Err(Error::EmptyInput("no passages to index".into()));
    };
    let dim = expected.unwrap_or(first.len());
    if dim == 0 {
        return Err(Error::DimensionMismatch { expected: 1, actual: 0 });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
    }
    Ok(dim)
}

pub fn check_query_dim(vector: &[f32], dim: Option<usize>) -> Result<()> {
    match dim {
        Some(d) if d != vector.len() => Err(Error::DimensionMismatch { expected: d, actual: vector.len() }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_mapping_is_clamped() {
        assert_eq!(from_distance(Metric::L2, 2.5), 0.0);
        assert!((from_distance(Metric::L2, 0.25) - 0.75).abs() < 1e-6);
        assert!((from_distance(Metric::Cosine, 1.5) + 0.5).abs() < 1e-6);
        assert!((similarity(Metric::L2, &[0.0, 0.0], &[3.0, 4.0])).abs() < 1e-6);
    }

    #[test]
    fn build_validation() {
        let p = vec![Passage::new("a", 0, "d"), Passage::new("b", 1, "d")];
        assert!(matches!(validate_build(&p, &[vec![1.0]], None), Err(Error::CountMismatch { passages: 2, vectors: 1 })));
        assert!(matches!(validate_build(&[], &[], None), Err(Error::EmptyInput(_))));
        assert!(matches!(
            validate_build(&p, &[vec![1.0, 0.0], vec![1.0]], None),
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            validate_build(&p, &[vec![1.0, 0.0], vec![0.0, 1.0]], Some(3)),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert_eq!(validate_build(&p, &[vec![1.0, 0.0], vec![0.0, 1.0]], None).expect("valid"), 2);
    }
}
