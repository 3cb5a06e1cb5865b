//! # Postings Lists and Cursors
//!
//! A postings list is the per-expression list of `(doc, tf, positions)`
//! entries, sorted by strictly increasing document id. Lists are immutable
//! once built and shared behind `Arc`; every clique reads one through its
//! own `PostingsCursor`, so cursor state is never shared between cliques or
//! threads.

use crate::{DocId, GlobalTermEvidence, MrfError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// POSTING
// =============================================================================

/// A single postings entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The document this entry belongs to.
    pub doc: DocId,
    /// Term (or window) frequency in the document.
    pub tf: u32,
    /// Sorted token positions of the occurrences (window start positions for
    /// proximity postings).
    pub positions: Vec<u32>,
}

impl Posting {
    /// Create a posting from its positions; tf is the number of positions.
    #[must_use]
    pub fn with_positions(doc: DocId, positions: Vec<u32>) -> Self {
        Self {
            doc,
            tf: positions.len() as u32,
            positions,
        }
    }
}

// =============================================================================
// POSTINGS LIST
// =============================================================================

/// An immutable, doc-id-sorted postings list with cached statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostingsList {
    postings: Vec<Posting>,
    cf: u64,
}

impl PostingsList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from postings, validating strict doc id order.
    ///
    /// Postings with `tf == 0` are dropped; they carry no evidence.
    pub fn from_postings(postings: Vec<Posting>) -> Result<Self, MrfError> {
        let mut list = Self::new();
        for posting in postings {
            list.push(posting)?;
        }
        Ok(list)
    }

    /// Append a posting. Document ids must be strictly increasing and must
    /// not be the end sentinel.
    pub fn push(&mut self, posting: Posting) -> Result<(), MrfError> {
        if posting.tf == 0 {
            return Ok(());
        }
        if posting.doc.is_end() {
            return Err(MrfError::Deserialization(
                "posting uses the end-of-postings sentinel as a doc id".to_string(),
            ));
        }
        if let Some(last) = self.postings.last()
            && last.doc >= posting.doc
        {
            return Err(MrfError::Deserialization(format!(
                "postings out of order: doc {} after doc {}",
                posting.doc, last.doc
            )));
        }
        self.cf = self.cf.saturating_add(u64::from(posting.tf));
        self.postings.push(posting);
        Ok(())
    }

    /// Document frequency.
    #[must_use]
    pub fn df(&self) -> u64 {
        self.postings.len() as u64
    }

    /// Collection frequency.
    #[must_use]
    pub fn cf(&self) -> u64 {
        self.cf
    }

    /// Term statistics of this list.
    #[must_use]
    pub fn evidence(&self) -> GlobalTermEvidence {
        GlobalTermEvidence::new(self.df(), self.cf)
    }

    /// Number of postings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    /// Whether the list has no postings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Iterate postings in doc id order.
    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    /// Find the posting for a document, if any.
    #[must_use]
    pub fn get(&self, doc: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc, |p| p.doc)
            .ok()
            .map(|i| &self.postings[i])
    }

    pub(crate) fn postings(&self) -> &[Posting] {
        &self.postings
    }
}

// =============================================================================
// CURSOR
// =============================================================================

/// Sequential cursor over a shared postings list.
///
/// Invariant: the cursor only moves forward. `doc()` is monotone
/// non-decreasing across calls to `advance` and `skip_to`.
#[derive(Debug, Clone)]
pub struct PostingsCursor {
    list: Arc<PostingsList>,
    position: usize,
}

impl PostingsCursor {
    /// Create a cursor positioned on the first posting.
    #[must_use]
    pub fn new(list: Arc<PostingsList>) -> Self {
        Self { list, position: 0 }
    }

    /// Document id under the cursor, or `DocId::END` when exhausted.
    #[must_use]
    pub fn doc(&self) -> DocId {
        self.current().map_or(DocId::END, |p| p.doc)
    }

    /// Term frequency under the cursor, or 0 when exhausted.
    #[must_use]
    pub fn tf(&self) -> u32 {
        self.current().map_or(0, |p| p.tf)
    }

    /// Posting under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Posting> {
        self.list.postings().get(self.position)
    }

    /// Move to the next posting.
    pub fn advance(&mut self) {
        if self.position < self.list.len() {
            self.position += 1;
        }
    }

    /// Move to the first posting with `doc >= target`.
    ///
    /// Never moves backwards: a target behind the cursor is a no-op.
    pub fn skip_to(&mut self, target: DocId) {
        let rest = &self.list.postings()[self.position.min(self.list.len())..];
        self.position += rest.partition_point(|p| p.doc < target);
    }

    /// Rewind to the first posting.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Statistics of the underlying list.
    #[must_use]
    pub fn evidence(&self) -> GlobalTermEvidence {
        self.list.evidence()
    }

    /// The shared list this cursor reads.
    #[must_use]
    pub fn list(&self) -> &Arc<PostingsList> {
        &self.list
    }
}

// =============================================================================
// TESTS
// =============================================================================
