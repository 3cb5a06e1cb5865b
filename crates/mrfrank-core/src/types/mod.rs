//! # Core Type Definitions
//!
//! This module contains the small value types shared by every layer of the
//! ranking engine:
//! - Document identifiers (`DocId`) with the end-of-postings sentinel
//! - Collection and term statistics (`GlobalEvidence`, `GlobalTermEvidence`)
//! - Ranked output units (`Accumulator`)
//! - Error types (`MrfError`)
//!
//! ## Determinism Guarantees
//!
//! - `DocId` implements `Ord` so candidate selection is a plain `min`
//! - `Accumulator` ordering is total: score descending, then doc id ascending
//! - Float comparisons go through `f32::total_cmp`, never `partial_cmp`

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

// =============================================================================
// DOCUMENT IDENTIFIERS
// =============================================================================

/// Internal document identifier assigned by the index.
///
/// Document ids are dense and start at 0. `DocId::END` is the "infinity"
/// sentinel returned by exhausted cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    /// Sentinel for an exhausted cursor. No real document uses this id.
    pub const END: DocId = DocId(u32::MAX);

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this id is the end-of-postings sentinel.
    #[must_use]
    pub const fn is_end(self) -> bool {
        self.0 == u32::MAX
    }

    /// The smallest id strictly greater than this one (saturates at `END`).
    #[must_use]
    pub const fn next(self) -> DocId {
        DocId(self.0.saturating_add(1))
    }

    /// Index into dense per-document tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// EVIDENCE
// =============================================================================

/// Collection-level statistics handed to scoring functions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalEvidence {
    /// Number of documents in the collection.
    pub document_count: u64,
    /// Total number of term occurrences in the collection.
    pub collection_length: u64,
    /// Number of terms in the query being ranked.
    pub query_length: usize,
    /// Length of the longest document (used for score lower bounds).
    pub max_document_length: u32,
}

impl GlobalEvidence {
    /// Create a new evidence record.
    #[must_use]
    pub const fn new(
        document_count: u64,
        collection_length: u64,
        query_length: usize,
        max_document_length: u32,
    ) -> Self {
        Self {
            document_count,
            collection_length,
            query_length,
            max_document_length,
        }
    }

    /// Average document length. Returns 1.0 for an empty collection so
    /// length normalisation never divides by zero.
    #[must_use]
    pub fn average_document_length(&self) -> f32 {
        if self.document_count == 0 || self.collection_length == 0 {
            return 1.0;
        }
        self.collection_length as f32 / self.document_count as f32
    }
}

/// Term-level statistics for a single expression (term or window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalTermEvidence {
    /// Document frequency.
    pub df: u64,
    /// Collection frequency.
    pub cf: u64,
}

impl GlobalTermEvidence {
    /// Create a new term evidence record.
    #[must_use]
    pub const fn new(df: u64, cf: u64) -> Self {
        Self { df, cf }
    }
}

// =============================================================================
// ACCUMULATOR
// =============================================================================

/// A (document, score) pair produced by ranking.
///
/// The `Ord` implementation is the ranking order: an accumulator is
/// "greater" when it ranks higher, i.e. it has the larger score, or the same
/// score and the smaller document id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Accumulator {
    /// The scored document.
    pub doc: DocId,
    /// Accumulated MRF score.
    pub score: f32,
}

impl Accumulator {
    /// Create a new accumulator.
    #[must_use]
    pub const fn new(doc: DocId, score: f32) -> Self {
        Self { doc, score }
    }
}

impl PartialEq for Accumulator {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Accumulator {}

impl PartialOrd for Accumulator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Accumulator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.doc.cmp(&self.doc))
    }
}

/// Sort accumulators into final ranked order (best first).
pub fn sort_ranked(results: &mut [Accumulator]) {
    results.sort_unstable_by(|a, b| b.cmp(a));
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading models or ranking.
///
/// - Configuration errors are fatal at load time and never retried
/// - Retrieval errors abort the current query only
/// - Missing postings are NOT errors; they degrade to a zero potential
#[derive(Debug, Error)]
pub enum MrfError {
    /// A model, feature, or run configuration is malformed or incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An inconsistency detected while ranking a query.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// An I/O error occurred (message carries the path or expression).
    #[error("I/O error: {0}")]
    Io(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The per-query deadline expired in the middle of a scan.
    #[error("Deadline exceeded after {elapsed_ms} ms (limit {limit_ms} ms)")]
    DeadlineExceeded { elapsed_ms: u64, limit_ms: u64 },
}

impl MrfError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a retrieval error.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// Whether this error must abort a whole batch rather than one query.
    #[must_use]
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Io(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_sentinel() {
        assert!(DocId::END.is_end());
        assert!(!DocId(0).is_end());
        assert_eq!(DocId::END.next(), DocId::END);
        assert_eq!(DocId(4).next(), DocId(5));
    }

    #[test]
    fn accumulator_orders_by_score_then_doc() {
        let a = Accumulator::new(DocId(3), 2.0);
        let b = Accumulator::new(DocId(1), 2.0);
        let c = Accumulator::new(DocId(0), 1.0);

        assert!(b > a, "equal score, smaller doc ranks higher");
        assert!(a > c);

        let mut ranked = vec![c, a, b];
        sort_ranked(&mut ranked);
        let docs: Vec<_> = ranked.iter().map(|r| r.doc).collect();
        assert_eq!(docs, vec![DocId(1), DocId(3), DocId(0)]);
    }

    #[test]
    fn average_length_guards_empty_collection() {
        let empty = GlobalEvidence::new(0, 0, 2, 0);
        assert!((empty.average_document_length() - 1.0).abs() < f32::EPSILON);

        let evidence = GlobalEvidence::new(4, 20, 2, 9);
        assert!((evidence.average_document_length() - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn batch_fatality() {
        assert!(MrfError::config("x").is_fatal_for_batch());
        assert!(!MrfError::retrieval("x").is_fatal_for_batch());
        assert!(
            !MrfError::DeadlineExceeded {
                elapsed_ms: 5,
                limit_ms: 1
            }
            .is_fatal_for_batch()
        );
    }
}
