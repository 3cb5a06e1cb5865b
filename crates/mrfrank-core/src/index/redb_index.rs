//! # redb-backed Index Storage
//!
//! A disk-backed inverted index using the redb embedded database:
//! - ACID writes (the whole index is written in one transaction)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, so query threads can share one handle)
//!
//! Document tables (lengths, docnos) are loaded into memory at open time.
//! Postings are read on demand; the per-query postings cache keeps them
//! resident for the duration of a ranking pass, so no disk access happens
//! mid-scan.

use super::memory::{MemoryIndex, SerializableIndex};
use super::postings::{Posting, PostingsList};
use super::{DocumentLengths, IndexReader};
use crate::{DocId, MrfError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Table for postings: term -> postcard-serialized Vec<Posting>
const POSTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("postings");

/// Table for document lengths: doc id -> length
const DOC_LENGTHS: TableDefinition<u32, u32> = TableDefinition::new("doc_lengths");

/// Table for docnos: doc id -> external document number
const DOCNOS: TableDefinition<u32, &str> = TableDefinition::new("docnos");

/// Table for term vectors: doc id -> postcard-serialized Vec<(String, u32)>
const VECTORS: TableDefinition<u32, &[u8]> = TableDefinition::new("vectors");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn io_err(path: &str) -> impl Fn(redb::Error) -> MrfError + '_ {
    move |e| MrfError::Io(format!("{}: {}", path, e))
}

/// A disk-backed inverted index using redb.
pub struct RedbIndex {
    /// The redb database handle.
    db: Database,
    /// Path the database was opened from (for error context).
    path: String,
    /// In-memory document length table.
    lengths: Arc<DocumentLengths>,
    /// In-memory docno table.
    docnos: Vec<String>,
    /// Reverse docno lookup.
    docno_index: BTreeMap<String, DocId>,
}

impl std::fmt::Debug for RedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbIndex")
            .field("path", &self.path)
            .field("documents", &self.docnos.len())
            .finish_non_exhaustive()
    }
}

impl RedbIndex {
    /// Open an existing index database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MrfError> {
        let display = path.as_ref().display().to_string();
        if !path.as_ref().exists() {
            return Err(MrfError::Io(format!("{}: index not found", display)));
        }
        let db = Database::open(path.as_ref()).map_err(|e| io_err(&display)(e.into()))?;
        Self::load(db, display)
    }

    /// Create (or overwrite) an index database from an in-memory index.
    ///
    /// All tables are rewritten in a single transaction.
    pub fn create(path: impl AsRef<Path>, index: &MemoryIndex) -> Result<Self, MrfError> {
        let display = path.as_ref().display().to_string();
        let err = io_err(&display);
        let db = Database::create(path.as_ref()).map_err(|e| err(e.into()))?;
        let data = SerializableIndex::from(index);

        let write_txn = db.begin_write().map_err(|e| err(e.into()))?;
        {
            let _ = write_txn.delete_table(POSTINGS).map_err(|e| err(e.into()))?;
            let _ = write_txn.delete_table(DOC_LENGTHS).map_err(|e| err(e.into()))?;
            let _ = write_txn.delete_table(DOCNOS).map_err(|e| err(e.into()))?;
            let _ = write_txn.delete_table(VECTORS).map_err(|e| err(e.into()))?;
            let _ = write_txn.delete_table(METADATA).map_err(|e| err(e.into()))?;

            let mut postings = write_txn.open_table(POSTINGS).map_err(|e| err(e.into()))?;
            for (term, entries) in &data.terms {
                let bytes = postcard::to_allocvec(entries)
                    .map_err(|e| MrfError::Serialization(e.to_string()))?;
                postings
                    .insert(term.as_str(), bytes.as_slice())
                    .map_err(|e| err(e.into()))?;
            }

            let mut lengths = write_txn.open_table(DOC_LENGTHS).map_err(|e| err(e.into()))?;
            let mut docnos = write_txn.open_table(DOCNOS).map_err(|e| err(e.into()))?;
            let mut vectors = write_txn.open_table(VECTORS).map_err(|e| err(e.into()))?;
            for (i, ((length, docno), vector)) in data
                .lengths
                .iter()
                .zip(&data.docnos)
                .zip(&data.vectors)
                .enumerate()
            {
                let id = i as u32;
                lengths.insert(id, *length).map_err(|e| err(e.into()))?;
                docnos.insert(id, docno.as_str()).map_err(|e| err(e.into()))?;
                let bytes = postcard::to_allocvec(vector)
                    .map_err(|e| MrfError::Serialization(e.to_string()))?;
                vectors
                    .insert(id, bytes.as_slice())
                    .map_err(|e| err(e.into()))?;
            }

            let mut meta = write_txn.open_table(METADATA).map_err(|e| err(e.into()))?;
            meta.insert("document_count", data.docnos.len() as u64)
                .map_err(|e| err(e.into()))?;
            meta.insert("term_count", data.terms.len() as u64)
                .map_err(|e| err(e.into()))?;
        }
        write_txn.commit().map_err(|e| err(e.into()))?;

        Self::load(db, display.clone())
    }

    fn load(db: Database, path: String) -> Result<Self, MrfError> {
        let err = io_err(&path);
        let read_txn = db.begin_read().map_err(|e| err(e.into()))?;

        let document_count = {
            let table = read_txn.open_table(METADATA).map_err(|e| err(e.into()))?;
            table
                .get("document_count")
                .map_err(|e| err(e.into()))?
                .map(|v| v.value())
                .ok_or_else(|| MrfError::Io(format!("{}: missing document_count", path)))?
        };

        let lengths = {
            let table = read_txn.open_table(DOC_LENGTHS).map_err(|e| err(e.into()))?;
            let mut lengths = Vec::with_capacity(document_count as usize);
            for entry in table.iter().map_err(|e| err(e.into()))? {
                let (_, value) = entry.map_err(|e| err(e.into()))?;
                lengths.push(value.value());
            }
            lengths
        };

        let docnos = {
            let table = read_txn.open_table(DOCNOS).map_err(|e| err(e.into()))?;
            let mut docnos = Vec::with_capacity(document_count as usize);
            for entry in table.iter().map_err(|e| err(e.into()))? {
                let (_, value) = entry.map_err(|e| err(e.into()))?;
                docnos.push(value.value().to_string());
            }
            docnos
        };

        if lengths.len() as u64 != document_count || docnos.len() as u64 != document_count {
            return Err(MrfError::Deserialization(format!(
                "{}: document tables disagree with metadata ({} documents)",
                path, document_count
            )));
        }

        let docno_index = docnos
            .iter()
            .enumerate()
            .map(|(i, d)| (d.clone(), DocId(i as u32)))
            .collect();

        drop(read_txn);
        Ok(Self {
            db,
            path: path.clone(),
            lengths: Arc::new(DocumentLengths::new(lengths)),
            docnos,
            docno_index,
        })
    }

    /// Load the whole index into memory.
    pub fn to_memory(&self) -> Result<MemoryIndex, MrfError> {
        let err = io_err(&self.path);
        let read_txn = self.db.begin_read().map_err(|e| err(e.into()))?;
        let table = read_txn.open_table(POSTINGS).map_err(|e| err(e.into()))?;

        let mut terms = Vec::new();
        for entry in table.iter().map_err(|e| err(e.into()))? {
            let (key, value) = entry.map_err(|e| err(e.into()))?;
            let postings: Vec<Posting> = postcard::from_bytes(value.value())
                .map_err(|e| MrfError::Deserialization(e.to_string()))?;
            terms.push((key.value().to_string(), postings));
        }

        let mut vectors = Vec::with_capacity(self.docnos.len());
        for i in 0..self.docnos.len() {
            vectors.push(self.document_vector(DocId(i as u32))?.unwrap_or_default());
        }

        MemoryIndex::from_serializable(SerializableIndex {
            terms,
            lengths: self.lengths.as_slice().to_vec(),
            docnos: self.docnos.clone(),
            vectors,
        })
    }
}

impl IndexReader for RedbIndex {
    fn postings(&self, term: &str) -> Result<Option<Arc<PostingsList>>, MrfError> {
        let context = format!("{} [{}]", self.path, term);
        let err = io_err(&context);
        let read_txn = self.db.begin_read().map_err(|e| err(e.into()))?;
        let table = read_txn.open_table(POSTINGS).map_err(|e| err(e.into()))?;
        let Some(bytes) = table.get(term).map_err(|e| err(e.into()))? else {
            return Ok(None);
        };
        let postings: Vec<Posting> = postcard::from_bytes(bytes.value())
            .map_err(|e| MrfError::Deserialization(format!("{}: {}", context, e)))?;
        Ok(Some(Arc::new(PostingsList::from_postings(postings)?)))
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
        let err = io_err(&self.path);
        let read_txn = self.db.begin_read().map_err(|e| err(e.into()))?;
        let table = read_txn.open_table(VECTORS).map_err(|e| err(e.into()))?;
        let Some(bytes) = table.get(doc.value()).map_err(|e| err(e.into()))? else {
            return Ok(None);
        };
        let vector = postcard::from_bytes(bytes.value())
            .map_err(|e| MrfError::Deserialization(e.to_string()))?;
        Ok(Some(vector))
    }

    fn term_count(&self) -> Result<usize, MrfError> {
        let err = io_err(&self.path);
        let read_txn = self.db.begin_read().map_err(|e| err(e.into()))?;
        let table = read_txn.open_table(POSTINGS).map_err(|e| err(e.into()))?;
        Ok(table.len().map_err(|e| err(e.into()))? as usize)
    }
}

// =============================================================================
// TESTS
// =============================================================================
