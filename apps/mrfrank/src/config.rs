//! # Run Configuration
//!
//! A batch run is described by a TOML file (`mrfrank.toml`):
//!
//! ```toml
//! index = "robust04.mrfx"
//! backend = "file"
//! queries = ["topics.tsv"]
//! models = ["sd.toml", "cascade.toml"]
//! output = "run.txt"
//! runtag = "mrf"
//! hits = 1000
//! workers = 4
//! timeout_ms = 5000
//!
//! [priors]
//! pagerank = "pagerank.prior"
//! ```
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (`RunOverrides`)
//! 2. Environment variables (`MRFRANK_INDEX`, `MRFRANK_WORKERS`)
//! 3. The run file
//! 4. Compiled defaults
//!
//! Relative paths in the run file are resolved against the file's directory.

use clap::ValueEnum;
use mrfrank_core::{MrfError, OutputFormat, RankingOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// ENUMS
// =============================================================================

/// Where an index lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Single `MRFX` file loaded into memory.
    #[default]
    File,
    /// redb database, postings read on demand.
    Redb,
}

/// Result line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunFormat {
    #[default]
    Trec,
    Internal,
}

impl From<RunFormat> for OutputFormat {
    fn from(format: RunFormat) -> Self {
        match format {
            RunFormat::Trec => OutputFormat::Trec,
            RunFormat::Internal => OutputFormat::Internal,
        }
    }
}

// =============================================================================
// RUN CONFIG
// =============================================================================

fn default_workers() -> usize {
    1
}

/// A complete batch run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub index: Option<PathBuf>,
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default)]
    pub queries: Vec<PathBuf>,
    #[serde(default)]
    pub models: Vec<PathBuf>,
    /// Prior name → `docno value` file.
    #[serde(default)]
    pub priors: BTreeMap<String, PathBuf>,
    /// Overrides every model's `hits`.
    pub hits: Option<usize>,
    /// Overrides the per-model run tag.
    pub runtag: Option<String>,
    /// Result file; stdout when unset.
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: RunFormat,
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub timeout_ms: Option<u64>,
    /// Internal run file seeding the first cascade stage.
    pub seed_run: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            index: None,
            backend: IndexBackend::default(),
            queries: Vec::new(),
            models: Vec::new(),
            priors: BTreeMap::new(),
            hits: None,
            runtag: None,
            output: None,
            format: RunFormat::default(),
            workers: default_workers(),
            timeout_ms: None,
            seed_run: None,
        }
    }
}

/// CLI flags that override the run file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub index: Option<PathBuf>,
    pub backend: Option<IndexBackend>,
    pub queries: Vec<PathBuf>,
    pub models: Vec<PathBuf>,
    pub hits: Option<usize>,
    pub runtag: Option<String>,
    pub output: Option<PathBuf>,
    pub format: Option<RunFormat>,
    pub workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub seed_run: Option<PathBuf>,
}

impl RunConfig {
    /// Load with full resolution. Without a run file only environment
    /// variables and overrides apply.
    pub fn load(path: Option<&Path>, overrides: Option<&RunOverrides>) -> Result<Self, MrfError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a run file, resolving relative paths against its directory.
    pub fn from_file(path: &Path) -> Result<Self, MrfError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| MrfError::config(format!("{}: {}", path.display(), e)))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    /// Parse a run file from a string.
    pub fn from_toml(text: &str) -> Result<Self, MrfError> {
        toml::from_str(text).map_err(|e| MrfError::config(format!("invalid run TOML: {}", e)))
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.index.iter_mut().for_each(resolve);
        self.output.iter_mut().for_each(resolve);
        self.seed_run.iter_mut().for_each(resolve);
        self.queries.iter_mut().for_each(resolve);
        self.models.iter_mut().for_each(resolve);
        self.priors.values_mut().for_each(resolve);
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(index) = std::env::var("MRFRANK_INDEX")
            && !index.is_empty()
        {
            self.index = Some(PathBuf::from(index));
        }
        if let Ok(workers) = std::env::var("MRFRANK_WORKERS") {
            match workers.parse() {
                Ok(workers) => self.workers = workers,
                Err(_) => tracing::warn!(value = %workers, "ignoring invalid MRFRANK_WORKERS"),
            }
        }
    }

    /// Apply CLI flags. Query and model lists given on the command line
    /// replace the file's lists.
    pub fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(index) = &overrides.index {
            self.index = Some(index.clone());
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if !overrides.queries.is_empty() {
            self.queries = overrides.queries.clone();
        }
        if !overrides.models.is_empty() {
            self.models = overrides.models.clone();
        }
        if overrides.hits.is_some() {
            self.hits = overrides.hits;
        }
        if overrides.runtag.is_some() {
            self.runtag = overrides.runtag.clone();
        }
        if overrides.output.is_some() {
            self.output = overrides.output.clone();
        }
        if let Some(format) = overrides.format {
            self.format = format;
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if overrides.timeout_ms.is_some() {
            self.timeout_ms = overrides.timeout_ms;
        }
        if overrides.seed_run.is_some() {
            self.seed_run = overrides.seed_run.clone();
        }
    }

    /// Reject runs that cannot start.
    pub fn validate(&self) -> Result<(), MrfError> {
        if self.index.is_none() {
            return Err(MrfError::config("run: no index given"));
        }
        if self.queries.is_empty() {
            return Err(MrfError::config("run: no query files given"));
        }
        if self.models.is_empty() {
            return Err(MrfError::config("run: no model files given"));
        }
        if self.workers == 0 {
            return Err(MrfError::config("run: workers must be at least 1"));
        }
        if self.hits == Some(0) {
            return Err(MrfError::config("run: hits must be at least 1"));
        }
        if self.timeout_ms == Some(0) {
            return Err(MrfError::config("run: timeout_ms must be at least 1"));
        }
        Ok(())
    }

    /// Ranking options derived from this run.
    #[must_use]
    pub fn ranking_options(&self) -> RankingOptions {
        RankingOptions {
            hits: self.hits,
            deadline: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
