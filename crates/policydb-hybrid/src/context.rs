use policydb_core::types::ScoredPassage;

/// Join passage texts, best first, separated by blank lines. This is the
/// block handed to the completion service.
pub fn assemble_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.passage.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use policydb_core::types::Passage;

    #[test]
    fn joins_in_rank_order_and_skips_blanks() {
        let ps = vec![
            ScoredPassage::from_similarity(Passage::new(" second-indexed but best ", 1, "d"), 0.9),
            ScoredPassage::from_similarity(Passage::new("   ", 2, "d"), 0.5),
            ScoredPassage::from_similarity(Passage::new("first", 0, "d"), 0.1),
        ];
        assert_eq!(assemble_context(&ps), "second-indexed but best\n\nfirst");
        assert_eq!(assemble_context(&[]), "");
    }
}
