use std::collections::HashSet;

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Lower-casing word tokenizer with English stop words removed. Shared by
/// keyword scoring and the TF-IDF model so both see the same terms.
#[derive(Clone)]
pub struct Analyzer {
	inner: TextAnalyzer,
}

impl Default for Analyzer {
	fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Analyzer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("Analyzer") }
}

impl Analyzer {
	pub fn new() -> Self {
		let inner = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Self { inner }
	}

	/// Tokens in document order, duplicates kept.
	pub fn tokens(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.inner.clone();
		let mut stream = analyzer.token_stream(text);
		let mut out = Vec::new();
		while stream.advance() { out.push(stream.token().text.clone()); }
		out
	}

	pub fn term_set(&self, text: &str) -> HashSet<String> { self.tokens(text).into_iter().collect() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lowercases_and_drops_stop_words() {
		let a = Analyzer::new();
		assert_eq!(a.tokens("What is the coverage for Knee Surgery?"), vec!["coverage", "knee", "surgery"]);
	}

	#[test]
	fn keeps_numbers_and_duplicates() {
		let a = Analyzer::new();
		assert_eq!(a.tokens("30 days, 30 days"), vec!["30", "days", "30", "days"]);
		assert!(a.tokens("   ").is_empty());
	}
}
