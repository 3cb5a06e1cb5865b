//! # Run Files
//!
//! Two whitespace-delimited text formats:
//! - TREC result lines: `qid Q0 docno rank score runtag` (rank starts at 1)
//! - Internal staging lines: `qid internal_docid score`, used to hand results
//!   from one cascade stage (or one process) to the next

use crate::{Accumulator, DocId, MrfError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Format one TREC result line (no trailing newline).
#[must_use]
pub fn format_trec_line(qid: &str, docno: &str, rank: usize, score: f32, runtag: &str) -> String {
    format!("{} Q0 {} {} {:.6} {}", qid, docno, rank, score, runtag)
}

/// Write ranked results for one query as TREC lines.
///
/// `docno` maps internal ids to external document numbers; an unmapped id
/// is an index inconsistency and fails the write.
pub fn write_trec_results<W, F>(
    out: &mut W,
    qid: &str,
    results: &[Accumulator],
    runtag: &str,
    docno: F,
) -> Result<(), MrfError>
where
    W: Write,
    F: Fn(DocId) -> Option<String>,
{
    for (i, acc) in results.iter().enumerate() {
        let name = docno(acc.doc).ok_or_else(|| {
            MrfError::retrieval(format!("query {}: no docno for internal doc {}", qid, acc.doc))
        })?;
        writeln!(out, "{}", format_trec_line(qid, &name, i + 1, acc.score, runtag))
            .map_err(|e| MrfError::Io(e.to_string()))?;
    }
    Ok(())
}

/// Write ranked results for one query as internal staging lines.
pub fn write_internal_results<W: Write>(
    out: &mut W,
    qid: &str,
    results: &[Accumulator],
) -> Result<(), MrfError> {
    for acc in results {
        writeln!(out, "{} {} {}", qid, acc.doc, acc.score)
            .map_err(|e| MrfError::Io(e.to_string()))?;
    }
    Ok(())
}

/// Parse internal staging lines into per-query accumulators.
///
/// Blank lines are skipped. Lines keep their file order within a query.
pub fn parse_internal_run(text: &str) -> Result<BTreeMap<String, Vec<Accumulator>>, MrfError> {
    let mut runs: BTreeMap<String, Vec<Accumulator>> = BTreeMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let [qid, doc, score] = fields[..] else {
            return Err(MrfError::Deserialization(format!(
                "line {}: expected 'qid docid score', got {} fields",
                line_no + 1,
                fields.len()
            )));
        };
        let doc: u32 = doc.parse().map_err(|_| {
            MrfError::Deserialization(format!("line {}: bad doc id '{}'", line_no + 1, doc))
        })?;
        let score: f32 = score.parse().map_err(|_| {
            MrfError::Deserialization(format!("line {}: bad score '{}'", line_no + 1, score))
        })?;
        runs.entry(qid.to_string())
            .or_default()
            .push(Accumulator::new(DocId(doc), score));
    }
    Ok(runs)
}

/// Read an internal staging file.
pub fn read_internal_input_file(path: &Path) -> Result<BTreeMap<String, Vec<Accumulator>>, MrfError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;
    parse_internal_run(&text)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trec_line_layout() {
        assert_eq!(
            format_trec_line("51", "FT911-1", 1, 3.25, "mrf"),
            "51 Q0 FT911-1 1 3.250000 mrf"
        );
    }

    #[test]
    fn trec_results_need_docnos() {
        let results = vec![Accumulator::new(DocId(0), 1.0), Accumulator::new(DocId(7), 0.5)];
        let mut out = Vec::new();
        let err = write_trec_results(&mut out, "1", &results, "run", |d| {
            (d.value() == 0).then(|| "doc-0".to_string())
        });
        assert!(matches!(err, Err(MrfError::Retrieval(_))));
    }

    #[test]
    fn internal_round_trip() {
        let results = vec![Accumulator::new(DocId(4), 2.5), Accumulator::new(DocId(1), -0.75)];
        let mut out = Vec::new();
        write_internal_results(&mut out, "q7", &results).expect("write");
        let text = String::from_utf8(out).expect("utf8");

        let parsed = parse_internal_run(&text).expect("parse");
        let q7 = parsed.get("q7").expect("query present");
        assert_eq!(q7.len(), 2);
        assert_eq!(q7[0].doc, DocId(4));
        assert!((q7[1].score + 0.75).abs() < 1e-6);
    }

    #[test]
    fn internal_parse_accepts_tabs_and_blank_lines() {
        let parsed = parse_internal_run("1\t3\t0.5\n\n2 9 1.0\n").expect("parse");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn internal_parse_rejects_malformed_lines() {
        assert!(parse_internal_run("1 3\n").is_err());
        assert!(parse_internal_run("1 x 0.5\n").is_err());
        assert!(parse_internal_run("1 3 nan-ish\n").is_err());
    }
}
