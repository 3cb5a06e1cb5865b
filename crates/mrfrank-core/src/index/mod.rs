//! # Index Layer
//!
//! The postings side of the engine. Everything the ranker knows about the
//! collection comes through the `IndexReader` trait:
//! - `MemoryIndex`: fully resident, built in-process or loaded from a file
//! - `RedbIndex`: disk-backed (redb), postings loaded on demand
//!
//! Postings lists are immutable and shared behind `Arc`; cursors are cheap
//! per-clique views over them.

mod memory;
pub mod postings;
pub mod proximity;
mod redb_index;

pub use memory::{IndexBuilder, MemoryIndex, SerializableIndex};
pub use postings::{Posting, PostingsCursor, PostingsList};
pub use redb_index::RedbIndex;

use crate::primitives::MAX_TOKEN_LENGTH;
use crate::{DocId, MrfError};
use std::sync::Arc;

// =============================================================================
// INDEX READER TRAIT
// =============================================================================

/// Read-only access to an inverted index.
///
/// Implementations must be safe to share across query threads; all methods
/// take `&self` and return owned or `Arc`-shared data.
pub trait IndexReader: Send + Sync + std::fmt::Debug {
    /// Postings list for a single term, `None` if the term is not indexed.
    fn postings(&self, term: &str) -> Result<Option<Arc<PostingsList>>, MrfError>;

    /// Document length table (memory resident).
    fn document_lengths(&self) -> Arc<DocumentLengths>;

    /// Number of documents.
    fn document_count(&self) -> u64;

    /// Total number of tokens in the collection.
    fn collection_size(&self) -> u64;

    /// External document number for an internal id.
    fn docno(&self, doc: DocId) -> Option<String>;

    /// Internal id for an external document number.
    fn docid(&self, docno: &str) -> Option<DocId>;

    /// (term, tf) pairs of a document, sorted by term.
    fn document_vector(&self, doc: DocId) -> Result<Option<Vec<(String, u32)>>, MrfError>;

    /// Number of distinct terms.
    fn term_count(&self) -> Result<usize, MrfError>;
}

// =============================================================================
// DOCUMENT LENGTHS
// =============================================================================

/// Dense document length table indexed by doc id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentLengths {
    lengths: Vec<u32>,
    total: u64,
    max: u32,
}

impl DocumentLengths {
    /// Create a table from per-document lengths.
    #[must_use]
    pub fn new(lengths: Vec<u32>) -> Self {
        let total = lengths.iter().map(|&l| u64::from(l)).sum();
        let max = lengths.iter().copied().max().unwrap_or(0);
        Self {
            lengths,
            total,
            max,
        }
    }

    /// Length of a document; 0 for unknown ids.
    #[must_use]
    pub fn get(&self, doc: DocId) -> u32 {
        self.lengths.get(doc.index()).copied().unwrap_or(0)
    }

    /// Sum of all lengths.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Longest document.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Raw lengths.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.lengths
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

/// Lowercase, alphanumeric tokenizer shared by indexing and querying.
///
/// Tokens longer than `MAX_TOKEN_LENGTH` bytes are dropped.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && t.len() <= MAX_TOKEN_LENGTH)
        .map(str::to_lowercase)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Information-Retrieval, the MRF way!"),
            vec!["information", "retrieval", "the", "mrf", "way"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn tokenize_drops_overlong_tokens() {
        let long = "x".repeat(MAX_TOKEN_LENGTH + 1);
        assert_eq!(tokenize(&format!("ok {}", long)), vec!["ok"]);
    }

    #[test]
    fn document_lengths_summary() {
        let lengths = DocumentLengths::new(vec![10, 5, 8]);
        assert_eq!(lengths.total(), 23);
        assert_eq!(lengths.max(), 10);
        assert_eq!(lengths.get(DocId(1)), 5);
        assert_eq!(lengths.get(DocId(9)), 0);
    }
}
