//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{IndexBackend, RunConfig, RunOverrides};
use mrfrank_core::formats::write_trec_results;
use mrfrank_core::{
    BatchQueryRunner, ConceptBinType, ConceptBins, IndexBuilder, IndexReader, ModelSpec, MrfError,
    QueryRecord, RankingOptions, RedbIndex, RetrievalEnvironment, RunSummary,
    check_model_resources, load_queries, rank_query, read_internal_input_file, save_index,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum corpus file size (2 GB).
const MAX_CORPUS_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), MrfError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;

    if metadata.len() > max_size {
        return Err(MrfError::config(format!(
            "{}: file size {} bytes exceeds maximum allowed {} bytes",
            path.display(),
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> MrfError {
    MrfError::Io(format!("{}: {}", path.display(), e))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Open an index with the given backend.
pub fn open_environment(path: &Path, backend: IndexBackend) -> Result<RetrievalEnvironment, MrfError> {
    if !path.exists() {
        return Err(MrfError::config(format!("index '{}' does not exist", path.display())));
    }
    match backend {
        IndexBackend::File => RetrievalEnvironment::open_file(path),
        IndexBackend::Redb => RetrievalEnvironment::open_redb(path),
    }
}

/// Parse `name=path` prior arguments.
pub fn parse_prior_args(args: &[String]) -> Result<BTreeMap<String, PathBuf>, MrfError> {
    let mut priors = BTreeMap::new();
    for arg in args {
        let Some((name, path)) = arg.split_once('=') else {
            return Err(MrfError::config(format!("prior '{}': expected name=path", arg)));
        };
        if name.is_empty() || path.is_empty() {
            return Err(MrfError::config(format!("prior '{}': expected name=path", arg)));
        }
        priors.insert(name.to_string(), PathBuf::from(path));
    }
    Ok(priors)
}

fn load_priors(
    env: &mut RetrievalEnvironment,
    priors: &BTreeMap<String, PathBuf>,
) -> Result<(), MrfError> {
    for (name, path) in priors {
        env.load_prior(name, path)?;
        tracing::info!(prior = %name, path = %path.display(), "prior loaded");
    }
    Ok(())
}

// =============================================================================
// INDEX COMMAND
// =============================================================================

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    docno: String,
    text: String,
}

/// Read a corpus: a JSON array of `{docno, text}` for `.json` files,
/// otherwise TSV lines `docno<TAB>text`.
pub fn load_corpus(path: &Path) -> Result<Vec<(String, String)>, MrfError> {
    validate_file_size(path, MAX_CORPUS_FILE_SIZE)?;
    let text = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let docs: Vec<CorpusDocument> = serde_json::from_str(&text).map_err(|e| {
            MrfError::Deserialization(format!("{}: invalid corpus JSON: {}", path.display(), e))
        })?;
        return Ok(docs.into_iter().map(|d| (d.docno, d.text)).collect());
    }

    let mut docs = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((docno, body)) = line.split_once('\t') else {
            return Err(MrfError::Deserialization(format!(
                "{}:{}: expected 'docno<TAB>text'",
                path.display(),
                line_no + 1
            )));
        };
        docs.push((docno.trim().to_string(), body.to_string()));
    }
    Ok(docs)
}

/// Build an index from a corpus file.
pub fn cmd_index(
    index_path: &Path,
    backend: IndexBackend,
    json_mode: bool,
    corpus: &Path,
    force: bool,
) -> Result<(), MrfError> {
    if index_path.exists() {
        if !force {
            return Err(MrfError::config(format!(
                "index '{}' already exists (use --force to replace it)",
                index_path.display()
            )));
        }
        std::fs::remove_file(index_path).map_err(|e| io_error(index_path, e))?;
    }

    let docs = load_corpus(corpus)?;
    let mut builder = IndexBuilder::new();
    for (docno, text) in &docs {
        builder.add_document(docno, &mrfrank_core::tokenize(text))?;
    }
    let index = builder.build()?;
    let documents = index.document_count();
    let tokens = index.collection_size();
    let terms = index.vocabulary_size();

    match backend {
        IndexBackend::File => save_index(&index, index_path)?,
        IndexBackend::Redb => {
            RedbIndex::create(index_path, &index)?;
        }
    }
    tracing::info!(
        index = %index_path.display(),
        documents,
        tokens,
        terms,
        "index built"
    );

    if json_mode {
        print_json(&serde_json::json!({
            "index": index_path.to_string_lossy(),
            "backend": format!("{:?}", backend).to_lowercase(),
            "documents": documents,
            "tokens": tokens,
            "terms": terms
        }));
    } else {
        println!("Indexed {} documents ({} tokens, {} terms)", documents, tokens, terms);
        println!("Index: {}", index_path.display());
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show index statistics.
pub fn cmd_status(index_path: &Path, backend: IndexBackend, json_mode: bool) -> Result<(), MrfError> {
    let env = open_environment(index_path, backend)?;
    let documents = env.document_count();
    let tokens = env.collection_size();
    let terms = env.reader().term_count()?;
    let average = env.global_evidence(0).average_document_length();

    if json_mode {
        print_json(&serde_json::json!({
            "index": index_path.to_string_lossy(),
            "backend": env.backend().kind(),
            "documents": documents,
            "tokens": tokens,
            "terms": terms,
            "average_document_length": average,
            "max_document_length": env.max_document_length()
        }));
        return Ok(());
    }

    println!("mrfrank Index Status");
    println!("====================");
    println!("Index:   {}", index_path.display());
    println!("Backend: {}", env.backend().kind());
    println!();
    println!("Documents:          {}", documents);
    println!("Tokens:             {}", tokens);
    println!("Terms:              {}", terms);
    println!("Avg. doc length:    {:.2}", average);
    println!("Max. doc length:    {}", env.max_document_length());

    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Batch-rank queries on a bounded worker pool.
///
/// Each (query, model) pair is ranked inside `spawn_blocking`; at most
/// `workers` pairs run at once. Results are written in submission order.
pub async fn cmd_run(
    config_path: Option<&Path>,
    overrides: &RunOverrides,
    json_mode: bool,
) -> Result<(), MrfError> {
    let config = RunConfig::load(config_path, Some(overrides))?;
    let summary = run_batch(&config).await?;

    if json_mode {
        print_json(&serde_json::json!({
            "completed": summary.completed,
            "failed": summary.failed.iter().map(|f| serde_json::json!({
                "qid": f.qid,
                "model": f.model,
                "error": f.error
            })).collect::<Vec<_>>(),
            "results": summary.results,
            "cost": summary.cost
        }));
    } else {
        eprintln!(
            "Ranked {} queries ({} failed, {} results)",
            summary.completed,
            summary.failed.len(),
            summary.results
        );
    }
    Ok(())
}

/// Execute a validated run configuration.
pub async fn run_batch(config: &RunConfig) -> Result<RunSummary, MrfError> {
    let index_path = config
        .index
        .as_deref()
        .ok_or_else(|| MrfError::config("run: no index given"))?;
    let mut env = open_environment(index_path, config.backend)?;
    load_priors(&mut env, &config.priors)?;

    let models = config
        .models
        .iter()
        .map(|path| ModelSpec::load(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut queries: Vec<QueryRecord> = Vec::new();
    for path in &config.queries {
        queries.extend(load_queries(path)?);
    }
    if queries.is_empty() {
        return Err(MrfError::config("run: query files contain no queries"));
    }

    let seeds = match &config.seed_run {
        Some(path) => read_internal_input_file(path)?,
        None => BTreeMap::new(),
    };

    let runner = Arc::new(
        BatchQueryRunner::new(Arc::new(env), models)?
            .with_options(config.ranking_options())
            .with_seeds(seeds),
    );
    tracing::info!(
        queries = queries.len(),
        models = runner.models().len(),
        workers = config.workers,
        "batch started"
    );

    let semaphore = Arc::new(Semaphore::new(config.workers));
    let abort = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(queries.len() * runner.models().len());
    'submit: for model in runner.models() {
        for query in &queries {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| MrfError::retrieval(format!("worker pool closed: {}", e)))?;
            if abort.load(Ordering::Acquire) {
                break 'submit;
            }
            let runner = Arc::clone(&runner);
            let abort = Arc::clone(&abort);
            let model = model.clone();
            let query = query.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if abort.load(Ordering::Acquire) {
                    return Ok(None);
                }
                let outcome = runner.run_query_logged(&query, &model);
                if outcome.is_err() {
                    abort.store(true, Ordering::Release);
                }
                outcome.map(Some)
            }));
        }
    }

    let mut out: Box<dyn Write> = match &config.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path).map_err(|e| io_error(path, e))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    // Handles are awaited in submission order, so the first batch-fatal
    // error returned is the earliest one submitted.
    let format = config.format.into();
    let mut summary = RunSummary::default();
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| MrfError::retrieval(format!("worker failed: {}", e)))??;
        match outcome {
            Some(Ok(outcome)) => {
                runner.write_outcome(&mut out, &outcome, format, config.runtag.as_deref())?;
                summary.record(&outcome);
            }
            Some(Err(failed)) => summary.failed.push(failed),
            None => {}
        }
    }
    out.flush().map_err(|e| MrfError::Io(format!("flushing results: {}", e)))?;

    tracing::info!(
        completed = summary.completed,
        failed = summary.failed.len(),
        results = summary.results,
        cost = summary.cost,
        "batch finished"
    );
    Ok(summary)
}

// =============================================================================
// RANK COMMAND
// =============================================================================

/// Rank one query and print the results.
pub fn cmd_rank(
    index_path: &Path,
    backend: IndexBackend,
    json_mode: bool,
    model_path: &Path,
    query: &str,
    hits: Option<usize>,
    priors: &[String],
) -> Result<(), MrfError> {
    let mut env = open_environment(index_path, backend)?;
    load_priors(&mut env, &parse_prior_args(priors)?)?;
    let model = ModelSpec::load(model_path)?;
    check_model_resources(&env, &model)?;
    let terms = env.tokenize(query);
    if terms.is_empty() {
        return Err(MrfError::config("query has no terms"));
    }

    let options = RankingOptions {
        hits,
        deadline: None,
    };
    let ranked = rank_query(&env, &model, &terms, &options, None)?;

    if json_mode {
        let results: Vec<serde_json::Value> = ranked
            .results
            .iter()
            .enumerate()
            .map(|(i, acc)| {
                serde_json::json!({
                    "rank": i + 1,
                    "docno": env.docno(acc.doc),
                    "doc": acc.doc.value(),
                    "score": acc.score
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "model": model.id,
            "terms": terms,
            "results": results,
            "cost": ranked.cost
        }));
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_trec_results(&mut out, "0", &ranked.results, &model.id, |doc| env.docno(doc))?;
    if let Some(cost) = ranked.cost {
        eprintln!("Cascade cost: {:.1}", cost);
    }
    Ok(())
}

// =============================================================================
// BINS COMMAND
// =============================================================================

/// Show the boundaries of every bin of a bin spec.
///
/// The selected bin (second parameter) is marked.
pub fn cmd_bins(bin_type: &str, params: &str, total: usize, json_mode: bool) -> Result<(), MrfError> {
    let selected = ConceptBins::parse(bin_type, params)?;
    let count = match selected.bin_type {
        ConceptBinType::Impact => selected.size,
        ConceptBinType::Default if selected.size == 0 => 0,
        ConceptBinType::Default => total.div_ceil(selected.size),
    };
    let bins: Vec<(usize, std::ops::Range<usize>)> = (0..count)
        .map(|which| {
            let bin = ConceptBins { which, ..selected };
            (which, bin.range(total))
        })
        .collect();

    if json_mode {
        let values: Vec<serde_json::Value> = bins
            .iter()
            .map(|(which, range)| {
                serde_json::json!({
                    "bin": which,
                    "start": range.start,
                    "end": range.end,
                    "selected": *which == selected.which
                })
            })
            .collect();
        print_json(&serde_json::json!({ "total": total, "bins": values }));
        return Ok(());
    }

    for (which, range) in &bins {
        let marker = if *which == selected.which { "*" } else { " " };
        println!("{} bin {:>3}: [{}, {})", marker, which, range.start, range.end);
    }
    Ok(())
}
