//! Overlapping character-window chunking of a single document.

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::Passage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self { chunk_size: 800, overlap: 100 }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunker needs 0 <= overlap < chunk_size (got overlap={overlap}, chunk_size={chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap)
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn overlap(&self) -> usize { self.overlap }

    /// Lazily split `text` into passages tagged with `source`.
    ///
    /// The returned iterator can be cloned to restart from the beginning.
    pub fn split<'a>(&self, text: &'a str, source: &str) -> Result<Passages<'a>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput(format!("document '{source}' has no text")));
        }
        Ok(Passages {
            text,
            source: source.to_string(),
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            cursor: Some((0, 0)),
            next_index: 0,
        })
    }
}

/// Iterator over the windows of one document. The cursor pairs a byte offset
/// (always on a char boundary) with the matching char offset; budgets and the
/// `char_start`/`char_end` metadata are counted in chars.
#[derive(Debug, Clone)]
pub struct Passages<'a> {
    text: &'a str,
    source: String,
    chunk_size: usize,
    overlap: usize,
    cursor: Option<(usize, usize)>,
    next_index: usize,
}

impl Passages<'_> {
    /// End of the window starting at `start`, preferring a whitespace boundary
    /// past both the overlap region and half of the budget.
    fn window_end(&self, start: usize) -> usize {
        let hard_end = advance(self.text, start, self.chunk_size);
        if hard_end >= self.text.len() {
            return self.text.len();
        }
        let min_chars = (self.overlap + 1).max(self.chunk_size / 2);
        let min_end = advance(self.text, start, min_chars);
        if min_end >= hard_end {
            return hard_end;
        }
        self.text[min_end..hard_end]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(hard_end, |(i, c)| min_end + i + c.len_utf8())
    }
}

impl Iterator for Passages<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        loop {
            let (start, char_start) = self.cursor?;
            let end = self.window_end(start);
            let slice = &self.text[start..end];
            let char_end = char_start + slice.chars().count();
            self.cursor = if end >= self.text.len() {
                None
            } else {
                let next = retreat(self.text, end, self.overlap);
                Some((next, char_end - self.text[next..end].chars().count()))
            };

            if slice.trim().is_empty() {
                debug!(source = %self.source, char_start, char_end, "skipping blank window");
                continue;
            }
            let idx = self.next_index;
            self.next_index += 1;
            return Some(
                Passage::new(slice, idx, self.source.as_str())
                    .with_meta("line", idx + 1)
                    .with_meta("char_start", char_start)
                    .with_meta("char_end", char_end),
            );
        }
    }
}

impl std::iter::FusedIterator for Passages<'_> {}

/// Byte offset `n` chars after `pos`, clamped to the end of `text`.
fn advance(text: &str, pos: usize, n: usize) -> usize {
    text[pos..].char_indices().nth(n).map_or(text.len(), |(i, _)| pos + i)
}

/// Byte offset `n` chars before `pos`, clamped to the start of `text`.
fn retreat(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    text[..pos].char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i)
}

/// Normalise extracted document text before chunking: unify line endings,
/// drop control characters, trim line ends and squeeze long blank runs.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.split('\n') {
        let cleaned: String = line.chars().filter(|c| *c == '\t' || !c.is_control()).collect();
        let cleaned = cleaned.trim_end();
        if cleaned.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(cleaned);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_and_retreat_respect_multibyte_chars() {
        let s = "aé€b";
        assert_eq!(advance(s, 0, 2), 3);
        assert_eq!(advance(s, 0, 10), s.len());
        assert_eq!(retreat(s, s.len(), 2), 3);
        assert_eq!(retreat(s, 3, 5), 0);
        assert_eq!(retreat(s, 3, 0), 3);
    }

    #[test]
    fn invalid_budgets_are_rejected() {
        assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(10, 10), Err(Error::InvalidConfig(_))));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn normalize_unifies_line_endings_and_blank_runs() {
        let raw = "Section 1\r\nCover\x07age  \r\n\r\n\r\n\r\nSection 2\n";
        assert_eq!(normalize(raw), "Section 1\nCoverage\n\nSection 2");
    }
}
