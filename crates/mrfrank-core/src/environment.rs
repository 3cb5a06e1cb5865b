//! # Retrieval Environment
//!
//! The environment is everything the MRF layer knows about the collection:
//! an index backend, the tokenizer, named document priors and named
//! importance models. It is read-only during ranking and may be shared
//! behind `Arc` across query threads.
//!
//! ## Storage Backends
//!
//! - `InMemory`: a resident `MemoryIndex` (built in-process or loaded from
//!   an index file)
//! - `Persistent`: a `RedbIndex`, postings read on demand
//!
//! ## Postings Reader Cache
//!
//! Proximity postings are derived from term positions, which is the
//! expensive part of query setup. Derived lists are cached per query in a
//! `PostingsReaderCache` keyed by the expression string. The cache is owned
//! by the query's MRF, never by the environment, so concurrent queries
//! never see each other's cursors.

use crate::expression::Expression;
use crate::formats::load_index;
use crate::importance::ImportanceModel;
use crate::index::{
    DocumentLengths, IndexReader, MemoryIndex, PostingsCursor, PostingsList, RedbIndex, proximity,
    tokenize,
};
use crate::{DocId, GlobalEvidence, GlobalTermEvidence, MrfError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Index backend for a retrieval environment.
#[derive(Debug)]
pub enum StorageBackend {
    /// Fully resident index.
    InMemory(MemoryIndex),
    /// Disk-backed index using redb.
    Persistent(RedbIndex),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryIndex::new())
    }
}

impl StorageBackend {
    /// The backend as a trait object.
    #[must_use]
    pub fn reader(&self) -> &dyn IndexReader {
        match self {
            Self::InMemory(index) => index,
            Self::Persistent(index) => index,
        }
    }

    /// Short backend name for status output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            Self::Persistent(_) => "redb",
        }
    }
}

// =============================================================================
// POSTINGS READER CACHE
// =============================================================================

/// Per-query cache of resolved postings, keyed by expression string.
#[derive(Debug, Default)]
pub struct PostingsReaderCache {
    entries: BTreeMap<String, Arc<PostingsList>>,
    hits: u64,
}

impl PostingsReaderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached list.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
    }

    /// Number of cached expressions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups served from the cache since the last clear.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

// =============================================================================
// DOCUMENT PRIORS
// =============================================================================

/// A static per-document score, indexed by internal doc id.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPrior {
    values: Vec<f32>,
    default: f32,
    max: f32,
    min: f32,
}

impl DocumentPrior {
    /// Create a prior from dense values. Documents beyond the table get
    /// `default`.
    #[must_use]
    pub fn new(values: Vec<f32>, default: f32) -> Self {
        let max = values.iter().copied().fold(default, f32::max);
        let min = values.iter().copied().fold(default, f32::min);
        Self {
            values,
            default,
            max,
            min,
        }
    }

    /// Prior value for a document.
    #[must_use]
    pub fn value(&self, doc: DocId) -> f32 {
        self.values.get(doc.index()).copied().unwrap_or(self.default)
    }

    /// Largest value any document can receive.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Smallest value any document can receive.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }
}

// =============================================================================
// RETRIEVAL ENVIRONMENT
// =============================================================================

/// Read-only view of a collection used by every query.
#[derive(Debug, Default)]
pub struct RetrievalEnvironment {
    backend: StorageBackend,
    lengths: Arc<DocumentLengths>,
    priors: BTreeMap<String, Arc<DocumentPrior>>,
    importance_models: BTreeMap<String, Arc<dyn ImportanceModel>>,
}

impl RetrievalEnvironment {
    /// Create an environment over a backend.
    #[must_use]
    pub fn new(backend: StorageBackend) -> Self {
        let lengths = backend.reader().document_lengths();
        Self {
            backend,
            lengths,
            priors: BTreeMap::new(),
            importance_models: BTreeMap::new(),
        }
    }

    /// Create an environment over a resident index.
    #[must_use]
    pub fn in_memory(index: MemoryIndex) -> Self {
        Self::new(StorageBackend::InMemory(index))
    }

    /// Load an index file (`MRFX` format) into memory.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, MrfError> {
        let index = load_index(path.as_ref())?;
        Ok(Self::in_memory(index))
    }

    /// Open a redb index.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, MrfError> {
        let index = RedbIndex::open(path)?;
        Ok(Self::new(StorageBackend::Persistent(index)))
    }

    /// The index backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// The index as a trait object.
    #[must_use]
    pub fn reader(&self) -> &dyn IndexReader {
        self.backend.reader()
    }

    // -------------------------------------------------------------------------
    // Collection statistics
    // -------------------------------------------------------------------------

    /// Length of a document in tokens (0 if unknown).
    #[must_use]
    pub fn document_length(&self, doc: DocId) -> u32 {
        self.lengths.get(doc)
    }

    /// Shared document length table.
    #[must_use]
    pub fn document_lengths(&self) -> Arc<DocumentLengths> {
        Arc::clone(&self.lengths)
    }

    /// Number of documents.
    #[must_use]
    pub fn document_count(&self) -> u64 {
        self.reader().document_count()
    }

    /// Total number of tokens in the collection.
    #[must_use]
    pub fn collection_size(&self) -> u64 {
        self.reader().collection_size()
    }

    /// Length of the longest document.
    #[must_use]
    pub fn max_document_length(&self) -> u32 {
        self.lengths.max()
    }

    /// Collection evidence for a query of `query_length` terms.
    #[must_use]
    pub fn global_evidence(&self, query_length: usize) -> GlobalEvidence {
        GlobalEvidence::new(
            self.document_count(),
            self.collection_size(),
            query_length,
            self.max_document_length(),
        )
    }

    /// External document number for an internal id.
    #[must_use]
    pub fn docno(&self, doc: DocId) -> Option<String> {
        self.reader().docno(doc)
    }

    /// Internal id for an external document number.
    #[must_use]
    pub fn docid(&self, docno: &str) -> Option<DocId> {
        self.reader().docid(docno)
    }

    /// Term vector of a document.
    pub fn document_vector(&self, doc: DocId) -> Result<Option<Vec<(String, u32)>>, MrfError> {
        self.reader().document_vector(doc)
    }

    /// Tokenize query or document text.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        tokenize(text)
    }

    // -------------------------------------------------------------------------
    // Postings access
    // -------------------------------------------------------------------------

    /// Resolve an expression to a fresh cursor.
    ///
    /// A term that is not indexed, or a window that never matches, yields a
    /// cursor over an empty list; that is not an error.
    pub fn postings_reader(
        &self,
        expression: &Expression,
        cache: &mut PostingsReaderCache,
    ) -> Result<PostingsCursor, MrfError> {
        let key = expression.to_string();
        if let Some(list) = cache.entries.get(&key) {
            cache.hits += 1;
            return Ok(PostingsCursor::new(Arc::clone(list)));
        }

        let list = self.resolve(expression)?;
        if list.is_empty() {
            tracing::debug!(expression = %key, "no postings");
        }
        cache.entries.insert(key, Arc::clone(&list));
        Ok(PostingsCursor::new(list))
    }

    /// df / cf of an expression.
    pub fn term_evidence(
        &self,
        expression: &Expression,
        cache: &mut PostingsReaderCache,
    ) -> Result<GlobalTermEvidence, MrfError> {
        Ok(self.postings_reader(expression, cache)?.evidence())
    }

    fn resolve(&self, expression: &Expression) -> Result<Arc<PostingsList>, MrfError> {
        match expression {
            Expression::Term(term) => Ok(self.term_postings(term)?),
            Expression::Ordered { gap, terms } => {
                let lists = self.term_lists(terms)?;
                Ok(Arc::new(proximity::ordered_window(&lists, *gap)?))
            }
            Expression::Unordered { width, terms } => {
                let lists = self.term_lists(terms)?;
                Ok(Arc::new(proximity::unordered_window(&lists, *width)?))
            }
        }
    }

    fn term_postings(&self, term: &str) -> Result<Arc<PostingsList>, MrfError> {
        Ok(self
            .reader()
            .postings(term)?
            .unwrap_or_else(|| Arc::new(PostingsList::new())))
    }

    fn term_lists(&self, terms: &[String]) -> Result<Vec<Arc<PostingsList>>, MrfError> {
        terms.iter().map(|t| self.term_postings(t)).collect()
    }

    // -------------------------------------------------------------------------
    // Priors and importance models
    // -------------------------------------------------------------------------

    /// Register a document prior under a name.
    pub fn add_prior(&mut self, name: impl Into<String>, prior: DocumentPrior) {
        self.priors.insert(name.into(), Arc::new(prior));
    }

    /// Load a prior from `docno value` lines.
    ///
    /// Unknown docnos are skipped (logged once with a count); documents
    /// missing from the file receive the smallest value seen.
    pub fn load_prior(&mut self, name: &str, path: &Path) -> Result<(), MrfError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;

        let mut values: Vec<Option<f32>> = vec![None; self.lengths.len()];
        let mut unknown = 0usize;
        for (line_no, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            let [docno, value] = fields[..] else {
                return Err(MrfError::Deserialization(format!(
                    "{}:{}: expected 'docno value'",
                    path.display(),
                    line_no + 1
                )));
            };
            let value: f32 = value.parse().map_err(|_| {
                MrfError::Deserialization(format!(
                    "{}:{}: bad prior value '{}'",
                    path.display(),
                    line_no + 1,
                    value
                ))
            })?;
            match self.docid(docno).and_then(|d| values.get_mut(d.index())) {
                Some(slot) => *slot = Some(value),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            tracing::warn!(prior = name, unknown, "prior file names unknown documents");
        }

        let floor = values
            .iter()
            .flatten()
            .copied()
            .reduce(f32::min)
            .unwrap_or(0.0);
        let dense = values.into_iter().map(|v| v.unwrap_or(floor)).collect();
        self.add_prior(name, DocumentPrior::new(dense, floor));
        Ok(())
    }

    /// Look up a prior by name.
    #[must_use]
    pub fn prior(&self, name: &str) -> Option<Arc<DocumentPrior>> {
        self.priors.get(name).cloned()
    }

    /// Names of all registered priors.
    pub fn prior_names(&self) -> impl Iterator<Item = &str> {
        self.priors.keys().map(String::as_str)
    }

    /// Register an importance model under an id.
    pub fn add_importance_model(&mut self, id: impl Into<String>, model: Arc<dyn ImportanceModel>) {
        self.importance_models.insert(id.into(), model);
    }

    /// Look up an importance model by id.
    #[must_use]
    pub fn importance_model(&self, id: &str) -> Option<Arc<dyn ImportanceModel>> {
        self.importance_models.get(id).cloned()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use std::io::Write;

    fn env() -> RetrievalEnvironment {
        let mut builder = IndexBuilder::new();
        for (docno, text) in [
            ("d0", "new york city new york"),
            ("d1", "york new"),
            ("d2", "city lights"),
        ] {
            builder.add_document(docno, &tokenize(text)).expect("add");
        }
        RetrievalEnvironment::in_memory(builder.build().expect("build"))
    }

    #[test]
    fn resolves_terms_and_windows() {
        let env = env();
        let mut cache = PostingsReaderCache::new();

        let term = env
            .postings_reader(&Expression::Term("york".into()), &mut cache)
            .expect("term");
        assert_eq!(term.evidence(), GlobalTermEvidence::new(2, 3));

        let od = Expression::Ordered {
            gap: 1,
            terms: vec!["new".into(), "york".into()],
        };
        let cursor = env.postings_reader(&od, &mut cache).expect("od");
        assert_eq!(cursor.doc(), DocId(0));
        assert_eq!(cursor.tf(), 2);
        assert_eq!(cursor.evidence().df, 1);

        let uw = Expression::Unordered {
            width: 2,
            terms: vec!["new".into(), "york".into()],
        };
        assert_eq!(env.term_evidence(&uw, &mut cache).expect("uw").df, 2);
    }

    #[test]
    fn cache_serves_repeat_lookups_until_cleared() {
        let env = env();
        let mut cache = PostingsReaderCache::new();
        let expr = Expression::Term("city".into());

        env.postings_reader(&expr, &mut cache).expect("first");
        env.postings_reader(&expr, &mut cache).expect("second");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn missing_term_is_empty_not_error() {
        let env = env();
        let mut cache = PostingsReaderCache::new();
        let cursor = env
            .postings_reader(&Expression::Term("absent".into()), &mut cache)
            .expect("lookup");
        assert!(cursor.doc().is_end());
    }

    #[test]
    fn global_evidence_reflects_collection() {
        let env = env();
        let evidence = env.global_evidence(2);
        assert_eq!(evidence.document_count, 3);
        assert_eq!(evidence.collection_length, 9);
        assert_eq!(evidence.max_document_length, 5);
        assert_eq!(evidence.query_length, 2);
    }

    #[test]
    fn prior_file_fills_missing_documents_with_floor() {
        let mut env = env();
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "d0 -1.5\nd2 -0.5\nunknown 3.0").expect("write");

        env.load_prior("pagerank", file.path()).expect("load");
        let prior = env.prior("pagerank").expect("registered");
        assert_eq!(prior.value(DocId(0)), -1.5);
        assert_eq!(prior.value(DocId(1)), -1.5);
        assert_eq!(prior.value(DocId(2)), -0.5);
        assert_eq!(prior.max(), -0.5);
        assert_eq!(prior.min(), -1.5);
    }
}
