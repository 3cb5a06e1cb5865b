//! Integration tests for the CLI commands, driven through the library
//! target against on-disk indexes in temporary directories.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use mrfrank::cli::{cmd_bins, cmd_index, cmd_rank, cmd_status, load_corpus, parse_prior_args, run_batch};
use mrfrank::config::{IndexBackend, RunConfig, RunFormat};
use mrfrank_core::MrfError;
use std::path::{Path, PathBuf};

// =============================================================================
// FIXTURES
// =============================================================================

const CORPUS: &str = "\
FT-1\tinformation retrieval systems rank documents
FT-2\tretrieval of information from text collections
FT-3\tcooking recipes and kitchen tips
FT-4\tinformation theory and coding
";

const QUERIES: &str = "\
101\tinformation retrieval
102\tcooking
103\tunseenword
";

const SD_MODEL: &str = r#"
id = "sd"
[[features]]
id = "term"
weight = 0.85
clique_set = "term"
potential = "query"
scoring_function = "dirichlet"
params = { mu = 50.0 }
[[features]]
id = "od"
weight = 0.15
clique_set = "ordered"
potential = "query"
scoring_function = "dirichlet"
params = { mu = 50.0 }
"#;

const PRIOR_MODEL: &str = r#"
id = "prior"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
[[features]]
id = "quality"
clique_set = "document"
potential = "document"
prior = "quality"
"#;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        ws.write("corpus.tsv", CORPUS);
        ws.write("topics.tsv", QUERIES);
        ws.write("sd.toml", SD_MODEL);
        ws
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn index(&self, backend: IndexBackend) -> PathBuf {
        let path = self.path(match backend {
            IndexBackend::File => "collection.mrfx",
            IndexBackend::Redb => "collection.redb",
        });
        cmd_index(&path, backend, true, &self.path("corpus.tsv"), false).unwrap();
        path
    }

    fn run_config(&self, index: &Path, extra: &str) -> PathBuf {
        let text = format!(
            "index = \"{}\"\nqueries = [\"topics.tsv\"]\nmodels = [\"sd.toml\"]\noutput = \"run.txt\"\n{}",
            index.display(),
            extra
        );
        self.write("mrfrank.toml", &text)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// INDEX / STATUS
// =============================================================================

#[test]
fn test_corpus_tsv_parsing() {
    let ws = Workspace::new();
    let docs = load_corpus(&ws.path("corpus.tsv")).unwrap();
    assert_eq!(docs.len(), 4);
    assert_eq!(docs[0].0, "FT-1");
}

#[test]
fn test_corpus_json_parsing() {
    let ws = Workspace::new();
    let path = ws.write(
        "corpus.json",
        r#"[{"docno": "A", "text": "alpha beta"}, {"docno": "B", "text": "beta"}]"#,
    );
    let docs = load_corpus(&path).unwrap();
    assert_eq!(docs, vec![("A".into(), "alpha beta".into()), ("B".into(), "beta".into())]);
}

#[test]
fn test_malformed_corpus_rejected() {
    let ws = Workspace::new();
    let path = ws.write("bad.tsv", "no tab here\n");
    assert!(matches!(load_corpus(&path), Err(MrfError::Deserialization(_))));
}

#[test]
fn test_index_then_status_both_backends() {
    let ws = Workspace::new();
    for backend in [IndexBackend::File, IndexBackend::Redb] {
        let index = ws.index(backend);
        assert!(index.exists());
        cmd_status(&index, backend, true).unwrap();
    }
}

#[test]
fn test_index_refuses_to_overwrite() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let again = cmd_index(&index, IndexBackend::File, true, &ws.path("corpus.tsv"), false);
    assert!(matches!(again, Err(MrfError::Configuration(_))));
    cmd_index(&index, IndexBackend::File, true, &ws.path("corpus.tsv"), true).unwrap();
}

#[test]
fn test_status_missing_index() {
    let ws = Workspace::new();
    let result = cmd_status(&ws.path("missing.mrfx"), IndexBackend::File, true);
    assert!(matches!(result, Err(MrfError::Configuration(_))));
}

// =============================================================================
// RANK / BINS
// =============================================================================

#[test]
fn test_rank_single_query() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    cmd_rank(&index, IndexBackend::File, true, &ws.path("sd.toml"), "information retrieval", Some(5), &[])
        .unwrap();
}

#[test]
fn test_rank_with_prior() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let model = ws.write("prior.toml", PRIOR_MODEL);
    let prior = ws.write("quality.prior", "FT-1 0.5\nFT-2 0.9\nFT-9 1.0\n");
    let arg = format!("quality={}", prior.display());
    cmd_rank(&index, IndexBackend::File, true, &model, "information", None, &[arg]).unwrap();

    let missing = cmd_rank(&index, IndexBackend::File, true, &model, "information", None, &[]);
    assert!(matches!(missing, Err(MrfError::Configuration(_))));
}

#[test]
fn test_rank_empty_query_rejected() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let result = cmd_rank(&index, IndexBackend::File, true, &ws.path("sd.toml"), " ... ", None, &[]);
    assert!(result.is_err());
}

#[test]
fn test_prior_args() {
    let priors = parse_prior_args(&["pr=/tmp/pr.txt".to_string()]).unwrap();
    assert_eq!(priors["pr"], PathBuf::from("/tmp/pr.txt"));
    assert!(parse_prior_args(&["nonsense".to_string()]).is_err());
    assert!(parse_prior_args(&["=x".to_string()]).is_err());
}

#[test]
fn test_bins_command() {
    cmd_bins("impact", "3 0", 10, true).unwrap();
    cmd_bins("default", "2 1", 5, false).unwrap();
    assert!(cmd_bins("fancy", "2 1", 5, false).is_err());
    assert!(cmd_bins("default", "2", 5, false).is_err());
}

// =============================================================================
// RUN
// =============================================================================

#[tokio::test]
async fn test_batch_run_writes_trec_file() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let config_path = ws.run_config(&index, "runtag = \"test\"\nworkers = 2\n");
    let config = RunConfig::load(Some(&config_path), None).unwrap();

    let summary = run_batch(&config).await.unwrap();
    assert_eq!(summary.completed, 3);
    assert!(summary.failed.is_empty());

    let lines = read_lines(&ws.path("run.txt"));
    assert!(!lines.is_empty());
    // Submission order is preserved: query 101 first, then 102.
    assert!(lines[0].starts_with("101 Q0 "));
    assert!(lines.last().unwrap().starts_with("102 Q0 FT-3 1 "));
    for line in &lines {
        let fields: Vec<&str> = line.split(' ').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[5], "test");
    }
}

#[tokio::test]
async fn test_batch_run_on_redb_matches_file() {
    let ws = Workspace::new();
    let file_index = ws.index(IndexBackend::File);
    let redb_index = ws.index(IndexBackend::Redb);

    let config = RunConfig::load(Some(&ws.run_config(&file_index, "")), None).unwrap();
    run_batch(&config).await.unwrap();
    let from_file = read_lines(&ws.path("run.txt"));

    let config = RunConfig::load(
        Some(&ws.run_config(&redb_index, "backend = \"redb\"\nworkers = 3\n")),
        None,
    )
    .unwrap();
    run_batch(&config).await.unwrap();
    assert_eq!(read_lines(&ws.path("run.txt")), from_file);
}

#[tokio::test]
async fn test_internal_output_seeds_cascade() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let config = RunConfig::load(Some(&ws.run_config(&index, "format = \"internal\"\n")), None).unwrap();
    assert_eq!(config.format, RunFormat::Internal);
    run_batch(&config).await.unwrap();
    let staged = ws.write("stage0.run", &std::fs::read_to_string(ws.path("run.txt")).unwrap());

    ws.write(
        "cascade.toml",
        r#"
id = "cascade"
kind = "greedy_constrained"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
cascade_stage = 0
[[features]]
id = "od"
clique_set = "ordered"
potential = "query"
scoring_function = "bm25"
cascade_stage = 1
"#,
    );
    let text = format!(
        "index = \"{}\"\nqueries = [\"topics.tsv\"]\nmodels = [\"cascade.toml\"]\noutput = \"final.txt\"\nseed_run = \"{}\"\n",
        index.display(),
        staged.display()
    );
    let config = RunConfig::load(Some(&ws.write("cascade_run.toml", &text)), None).unwrap();
    let summary = run_batch(&config).await.unwrap();
    assert_eq!(summary.completed, 3);

    // Only seeded documents can appear in the final run.
    let seeded: Vec<String> = read_lines(&staged);
    let final_lines = read_lines(&ws.path("final.txt"));
    assert_eq!(final_lines.len(), seeded.len());
    assert!(final_lines.iter().all(|l| l.ends_with(" cascade")));
}

#[tokio::test]
async fn test_missing_model_file_aborts() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    let text = format!(
        "index = \"{}\"\nqueries = [\"topics.tsv\"]\nmodels = [\"nope.toml\"]\n",
        index.display()
    );
    let config = RunConfig::load(Some(&ws.write("bad.toml", &text)), None).unwrap();
    assert!(matches!(run_batch(&config).await, Err(MrfError::Io(_))));
}

#[tokio::test]
async fn test_empty_query_file_aborts() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    ws.write("topics.tsv", "\n# nothing here\n");
    let config = RunConfig::load(Some(&ws.run_config(&index, "")), None).unwrap();
    assert!(matches!(run_batch(&config).await, Err(MrfError::Configuration(_))));
}

#[tokio::test]
async fn test_missing_prior_aborts_before_ranking() {
    let ws = Workspace::new();
    let index = ws.index(IndexBackend::File);
    ws.write("prior.toml", PRIOR_MODEL);
    let text = format!(
        "index = \"{}\"\nqueries = [\"topics.tsv\"]\nmodels = [\"sd.toml\", \"prior.toml\"]\noutput = \"run.txt\"\nworkers = 2\n",
        index.display()
    );
    let config = RunConfig::load(Some(&ws.write("prior_run.toml", &text)), None).unwrap();

    let result = run_batch(&config).await;
    assert!(matches!(&result, Err(MrfError::Configuration(msg)) if msg.contains("quality")));
    // Nothing was ranked, so no result file was opened.
    assert!(!ws.path("run.txt").exists());
}
