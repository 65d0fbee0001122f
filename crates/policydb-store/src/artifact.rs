//! Serialized form of a built index.
//!
//! Layout:
//! ```text
//! policydb-artifact/1
//! <hex blake3 of body>
//! <JSON body>
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use policydb_core::error::{Error, Result};
use policydb_core::types::{BackendKind, IndexEntry};
use policydb_text::TfIdfModel;

pub const MAGIC: &str = "policydb-artifact";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub format_version: u32,
    pub index_name: String,
    /// Backend that produced the snapshot; restore may target another one.
    pub backend: BackendKind,
    pub dim: usize,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
    #[serde(default)]
    pub lexical: Option<TfIdfModel>,
}

impl IndexArtifact {
    pub fn new(index_name: impl Into<String>, backend: BackendKind, dim: usize, entries: Vec<IndexEntry>, lexical: Option<TfIdfModel>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            index_name: index_name.into(),
            backend,
            dim,
            saved_at: Utc::now(),
            entries,
            lexical,
        }
    }

    /// Blob key under which the artifact for `index_name` is stored.
    pub fn key(index_name: &str) -> String { format!("{index_name}.idx") }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let header = format!("{MAGIC}/{FORMAT_VERSION}\n{}\n", blake3::hash(&body).to_hex());
        let mut out = Vec::with_capacity(header.len() + body.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (tag, rest) = split_line(bytes).ok_or_else(|| corrupt("missing header"))?;
        let expected_tag = format!("{MAGIC}/{FORMAT_VERSION}");
        if tag != expected_tag.as_bytes() {
            return Err(corrupt(&format!("unexpected header `{}`", String::from_utf8_lossy(tag))));
        }
        let (checksum, body) = split_line(rest).ok_or_else(|| corrupt("missing checksum"))?;
        if checksum != blake3::hash(body).to_hex().as_bytes() {
            return Err(corrupt("checksum mismatch"));
        }
        let artifact: Self = serde_json::from_slice(body).map_err(|e| corrupt(&e.to_string()))?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported format version {}", artifact.format_version)));
        }
        if let Some(bad) = artifact.entries.iter().find(|e| e.vector.len() != artifact.dim) {
            return Err(corrupt(&format!("entry {} has {} dims, header says {}", bad.passage.sequence_index, bad.vector.len(), artifact.dim)));
        }
        Ok(artifact)
    }
}

fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b'\n')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

fn corrupt(why: &str) -> Error { Error::Persistence(format!("corrupt index artifact: {why}")) }

#[cfg(test)]
mod tests {
    use super::*;
    use policydb_core::types::Passage;

    fn sample() -> IndexArtifact {
        let entries = vec![
            IndexEntry { passage: Passage::new("knee surgery is covered", 0, "DOC1"), vector: vec![1.0, 0.0] },
            IndexEntry { passage: Passage::new("dental is excluded", 1, "DOC1"), vector: vec![0.0, 1.0] },
        ];
        IndexArtifact::new("policy", BackendKind::Flat, 2, entries, None)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let a = sample();
        let bytes = a.encode().expect("encode");
        assert!(bytes.starts_with(b"policydb-artifact/1\n"));
        assert_eq!(IndexArtifact::decode(&bytes).expect("decode"), a);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = sample().encode().expect("encode");
        let last = bytes.len() - 3;
        bytes[last] ^= 0x01;
        let err = IndexArtifact::decode(&bytes).expect_err("corrupt");
        assert!(matches!(err, Error::Persistence(ref m) if m.contains("checksum")), "{err}");
    }

    #[test]
    fn garbage_and_truncation_are_persistence_errors() {
        for bytes in [&b""[..], b"not an artifact", b"policydb-artifact/1\n", b"policydb-artifact/9\nabc\n{}"] {
            assert!(matches!(IndexArtifact::decode(bytes), Err(Error::Persistence(_))));
        }
    }
}
