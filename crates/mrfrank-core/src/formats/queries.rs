//! # Query Files
//!
//! Queries are read either from a JSON array of `{"qid": .., "text": ..}`
//! objects or from TSV lines `qid<TAB>text`. The format is chosen by file
//! extension (`.json` vs anything else).

use crate::MrfError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A single query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Query identifier, copied verbatim into run files.
    pub qid: String,
    /// Raw query text, tokenised by the retrieval environment.
    pub text: String,
}

impl QueryRecord {
    /// Create a new query record.
    pub fn new(qid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            qid: qid.into(),
            text: text.into(),
        }
    }
}

/// Parse a JSON query array.
pub fn parse_json_queries(text: &str) -> Result<Vec<QueryRecord>, MrfError> {
    let queries: Vec<QueryRecord> = serde_json::from_str(text)
        .map_err(|e| MrfError::config(format!("invalid query JSON: {}", e)))?;
    check_unique(queries)
}

/// Parse TSV query lines. Blank lines and lines starting with `#` are skipped.
pub fn parse_tsv_queries(text: &str) -> Result<Vec<QueryRecord>, MrfError> {
    let mut queries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((qid, query)) = line.split_once('\t') else {
            return Err(MrfError::config(format!(
                "query line {}: expected 'qid<TAB>text'",
                line_no + 1
            )));
        };
        queries.push(QueryRecord::new(qid.trim(), query.trim()));
    }
    check_unique(queries)
}

/// Load queries from a file, choosing the parser by extension.
pub fn load_queries(path: &Path) -> Result<Vec<QueryRecord>, MrfError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json_queries(&text),
        _ => parse_tsv_queries(&text),
    }
}

fn check_unique(queries: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, MrfError> {
    let mut seen = BTreeSet::new();
    for query in &queries {
        if query.qid.is_empty() {
            return Err(MrfError::config("query with empty qid"));
        }
        if !seen.insert(query.qid.as_str()) {
            return Err(MrfError::config(format!("duplicate qid '{}'", query.qid)));
        }
    }
    Ok(queries)
}
