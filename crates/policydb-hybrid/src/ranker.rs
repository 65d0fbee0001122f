use policydb_core::config::{HybridSettings, KeywordScoring};
use policydb_core::error::{Error, Result};
use policydb_core::types::ScoredPassage;
use policydb_text::{Analyzer, KeywordQuery};
use policydb_vector::similarity::rank_order;

/// Fuses vector similarity with keyword relevance:
/// `hybrid = alpha * similarity + (1 - alpha) * min(keyword, 1)`.
#[derive(Debug, Clone)]
pub struct HybridRanker {
    alpha: f32,
    keyword: KeywordScoring,
    analyzer: Analyzer,
}

fn check_alpha(alpha: f32) -> Result<()> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("alpha must be within [0, 1], got {alpha}")))
    }
}

impl HybridRanker {
    pub fn new(alpha: f32, keyword: KeywordScoring) -> Result<Self> {
        check_alpha(alpha)?;
        Ok(Self { alpha, keyword, analyzer: Analyzer::new() })
    }

    pub fn from_settings(settings: &HybridSettings) -> Result<Self> { Self::new(settings.alpha, settings.keyword) }

    pub fn alpha(&self) -> f32 { self.alpha }
    pub fn analyzer(&self) -> &Analyzer { &self.analyzer }

    pub fn rank(&self, query: &str, candidates: Vec<ScoredPassage>, k: usize) -> Vec<ScoredPassage> {
        self.fuse(query, candidates, k, self.alpha)
    }

    /// Same as [`rank`](Self::rank) with a per-call weight.
    pub fn rank_with_alpha(&self, query: &str, candidates: Vec<ScoredPassage>, k: usize, alpha: f32) -> Result<Vec<ScoredPassage>> {
        check_alpha(alpha)?;
        Ok(self.fuse(query, candidates, k, alpha))
    }

    fn fuse(&self, query: &str, mut candidates: Vec<ScoredPassage>, k: usize, alpha: f32) -> Vec<ScoredPassage> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let kq = KeywordQuery::new(&self.analyzer, query, self.keyword);
        // Establish similarity rank first; the stable sort below keeps it for ties.
        candidates.sort_by(rank_order);
        for c in &mut candidates {
            let kw = kq.score(&self.analyzer, &c.passage.text).min(1.0);
            c.scores.keyword = Some(kw);
            c.scores.hybrid = Some(alpha * c.scores.similarity + (1.0 - alpha) * kw);
        }
        candidates.sort_by(|a, b| hybrid(b).total_cmp(&hybrid(a)));
        candidates.truncate(k);
        candidates
    }
}

fn hybrid(c: &ScoredPassage) -> f32 { c.scores.hybrid.unwrap_or(c.scores.similarity) }

#[cfg(test)]
mod tests {
    use super::*;
    use policydb_core::types::Passage;

    fn cand(text: &str, seq: usize, sim: f32) -> ScoredPassage { ScoredPassage::from_similarity(Passage::new(text, seq, "DOC1"), sim) }

    fn texts(v: &[ScoredPassage]) -> Vec<&str> { v.iter().map(|c| c.passage.text.as_str()).collect() }

    fn candidates() -> Vec<ScoredPassage> {
        vec![
            cand("dental is excluded", 1, 0.9),
            cand("knee surgery is covered", 0, 0.5),
            cand("knee braces need a prescription", 2, 0.7),
        ]
    }

    #[test]
    fn alpha_one_is_similarity_order() {
        let r = HybridRanker::new(1.0, KeywordScoring::Overlap).expect("ranker");
        let out = r.rank("knee surgery", candidates(), 3);
        assert_eq!(texts(&out), vec!["dental is excluded", "knee braces need a prescription", "knee surgery is covered"]);
    }

    #[test]
    fn alpha_zero_is_keyword_order_with_similarity_tiebreak() {
        let r = HybridRanker::new(0.0, KeywordScoring::Overlap).expect("ranker");
        let out = r.rank("knee surgery", candidates(), 3);
        assert_eq!(texts(&out), vec!["knee surgery is covered", "knee braces need a prescription", "dental is excluded"]);
        assert_eq!(out[0].scores.keyword, Some(1.0));
        assert_eq!(out[2].scores.keyword, Some(0.0));
    }

    #[test]
    fn fused_score_is_weighted_sum() {
        let r = HybridRanker::new(0.7, KeywordScoring::Overlap).expect("ranker");
        let out = r.rank("knee surgery", vec![cand("knee surgery is covered", 0, 0.5)], 1);
        let h = out[0].scores.hybrid.expect("hybrid");
        assert!((h - (0.7 * 0.5 + 0.3)).abs() < 1e-6);
    }

    #[test]
    fn empty_query_and_bad_alpha() {
        let r = HybridRanker::new(0.7, KeywordScoring::Overlap).expect("ranker");
        assert!(r.rank("   ", candidates(), 3).is_empty());
        assert!(matches!(r.rank_with_alpha("knee", candidates(), 3, 1.5), Err(Error::InvalidConfig(_))));
        assert!(HybridRanker::new(-0.1, KeywordScoring::Overlap).is_err());
        assert!(HybridRanker::new(f32::NAN, KeywordScoring::Overlap).is_err());
    }

    #[test]
    fn truncates_to_k() {
        let r = HybridRanker::new(0.7, KeywordScoring::TfWeighted).expect("ranker");
        assert_eq!(r.rank("knee", candidates(), 2).len(), 2);
        assert!(r.rank("knee", candidates(), 0).is_empty());
    }
}
