//! # In-Memory Index
//!
//! `MemoryIndex` keeps every postings list, the document length table, the
//! docno mapping and per-document term vectors resident. It is built with
//! `IndexBuilder` and round-trips through `SerializableIndex` for the file
//! backend.

use super::postings::{Posting, PostingsList};
use super::{DocumentLengths, IndexReader};
use crate::{DocId, MrfError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// MEMORY INDEX
// =============================================================================

/// A fully memory-resident inverted index.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    /// Term -> postings list.
    postings: BTreeMap<String, Arc<PostingsList>>,
    /// Document lengths in tokens, indexed by doc id.
    lengths: Arc<DocumentLengths>,
    /// External document numbers, indexed by doc id.
    docnos: Vec<String>,
    /// Reverse lookup: docno -> doc id.
    docno_index: BTreeMap<String, DocId>,
    /// Term vectors (term, tf) per document, sorted by term.
    vectors: Vec<Vec<(String, u32)>>,
}

impl MemoryIndex {
    /// Create a new empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from its serializable form, validating every list.
    pub fn from_serializable(data: SerializableIndex) -> Result<Self, MrfError> {
        let doc_count = data.docnos.len();
        if data.lengths.len() != doc_count || data.vectors.len() != doc_count {
            return Err(MrfError::Deserialization(format!(
                "document tables disagree: {} docnos, {} lengths, {} vectors",
                doc_count,
                data.lengths.len(),
                data.vectors.len()
            )));
        }

        let mut postings = BTreeMap::new();
        for (term, entries) in data.terms {
            if let Some(last) = entries.last()
                && last.doc.index() >= doc_count
            {
                return Err(MrfError::Deserialization(format!(
                    "postings for '{}' reference doc {} beyond {} documents",
                    term, last.doc, doc_count
                )));
            }
            postings.insert(term, Arc::new(PostingsList::from_postings(entries)?));
        }

        let mut docno_index = BTreeMap::new();
        for (i, docno) in data.docnos.iter().enumerate() {
            if docno_index.insert(docno.clone(), DocId(i as u32)).is_some() {
                return Err(MrfError::Deserialization(format!(
                    "duplicate docno '{}'",
                    docno
                )));
            }
        }

        Ok(Self {
            postings,
            lengths: Arc::new(DocumentLengths::new(data.lengths)),
            docnos: data.docnos,
            docno_index,
            vectors: data.vectors,
        })
    }

    /// Number of distinct terms.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }
}

impl IndexReader for MemoryIndex {
    fn postings(&self, term: &str) -> Result<Option<Arc<PostingsList>>, MrfError> {
        Ok(self.postings.get(term).cloned())
    }

    fn document_lengths(&self) -> Arc<DocumentLengths> {
        Arc::clone(&self.lengths)
    }

    fn document_count(&self) -> u64 {
        self.docnos.len() as u64
    }

    fn collection_size(&self) -> u64 {
        self.lengths.total()
    }

    fn docno(&self, doc: DocId) -> Option<String> {
        self.docnos.get(doc.index()).cloned()
    }

    fn docid(&self, docno: &str) -> Option<DocId> {
        self.docno_index.get(docno).copied()
    }

    fn document_vector(&self, doc: DocId) -> Result<Option<Vec<(String, u32)>>, MrfError> {
        Ok(self.vectors.get(doc.index()).cloned())
    }

    fn term_count(&self) -> Result<usize, MrfError> {
        Ok(self.postings.len())
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Accumulates tokenised documents into a `MemoryIndex`.
///
/// Documents receive dense ids in insertion order.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    postings: BTreeMap<String, Vec<Posting>>,
    lengths: Vec<u32>,
    docnos: Vec<String>,
    docno_index: BTreeMap<String, DocId>,
    vectors: Vec<Vec<(String, u32)>>,
}

impl IndexBuilder {
    /// Create a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Returns its internal id.
    ///
    /// Empty docnos and duplicate docnos are rejected.
    pub fn add_document(&mut self, docno: &str, tokens: &[String]) -> Result<DocId, MrfError> {
        if docno.is_empty() {
            return Err(MrfError::config("document number must not be empty"));
        }
        if self.docno_index.contains_key(docno) {
            return Err(MrfError::config(format!("duplicate docno '{}'", docno)));
        }
        if self.docnos.len() >= DocId::END.index() {
            return Err(MrfError::config("document id space exhausted"));
        }

        let doc = DocId(self.docnos.len() as u32);

        let mut positions: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (pos, token) in tokens.iter().enumerate() {
            positions.entry(token.as_str()).or_default().push(pos as u32);
        }

        let mut vector = Vec::with_capacity(positions.len());
        for (term, term_positions) in positions {
            vector.push((term.to_string(), term_positions.len() as u32));
            self.postings
                .entry(term.to_string())
                .or_default()
                .push(Posting::with_positions(doc, term_positions));
        }

        self.lengths.push(tokens.len() as u32);
        self.docnos.push(docno.to_string());
        self.docno_index.insert(docno.to_string(), doc);
        self.vectors.push(vector);
        Ok(doc)
    }

    /// Number of documents added so far.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.docnos.len()
    }

    /// Finish building.
    pub fn build(self) -> Result<MemoryIndex, MrfError> {
        MemoryIndex::from_serializable(SerializableIndex {
            terms: self.postings.into_iter().collect(),
            lengths: self.lengths,
            docnos: self.docnos,
            vectors: self.vectors,
        })
    }
}

// =============================================================================
// SERIALIZABLE FORM
// =============================================================================

/// Plain-data snapshot of a `MemoryIndex`, in deterministic term order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializableIndex {
    /// (term, postings) in term order.
    pub terms: Vec<(String, Vec<Posting>)>,
    /// Document lengths by doc id.
    pub lengths: Vec<u32>,
    /// Docnos by doc id.
    pub docnos: Vec<String>,
    /// Term vectors by doc id.
    pub vectors: Vec<Vec<(String, u32)>>,
}

impl From<&MemoryIndex> for SerializableIndex {
    fn from(index: &MemoryIndex) -> Self {
        Self {
            terms: index
                .postings
                .iter()
                .map(|(term, list)| (term.clone(), list.iter().cloned().collect()))
                .collect(),
            lengths: index.lengths.as_slice().to_vec(),
            docnos: index.docnos.clone(),
            vectors: index.vectors.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
