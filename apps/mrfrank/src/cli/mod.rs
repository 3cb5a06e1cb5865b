//! # mrfrank CLI Module
//!
//! ## Available Commands
//!
//! - `index` - Build an index from a corpus file
//! - `status` - Show index statistics
//! - `run` - Batch-rank query files with one or more models
//! - `rank` - Rank a single query and print the results
//! - `bins` - Show the concept bin boundaries for a bin spec

mod commands;

use crate::config::{IndexBackend, RunFormat, RunOverrides};
use clap::{Parser, Subcommand};
use mrfrank_core::MrfError;
use std::path::PathBuf;

pub use commands::*;

/// Index path used when `--index` is not given.
pub const DEFAULT_INDEX: &str = "mrfrank.mrfx";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// mrfrank - Markov Random Field retrieval
///
/// Ranks documents with term, phrase and proximity cliques over an
/// inverted index, optionally through a multi-stage cascade.
#[derive(Parser, Debug)]
#[command(name = "mrfrank")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the index [default: mrfrank.mrfx]
    #[arg(short = 'I', long, global = true)]
    pub index: Option<PathBuf>,

    /// Index backend [default: file]
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<IndexBackend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an index from a corpus (TSV `docno<TAB>text` or JSON array)
    Index {
        /// Corpus file
        #[arg(short, long)]
        corpus: PathBuf,

        /// Replace an existing index
        #[arg(short, long)]
        force: bool,
    },

    /// Show index statistics
    Status,

    /// Batch-rank queries as described by a run file
    Run {
        /// Run configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Query files (replace the run file's list)
        #[arg(long = "queries")]
        queries: Vec<PathBuf>,

        /// Model files (replace the run file's list)
        #[arg(short, long = "model")]
        models: Vec<PathBuf>,

        /// Results per query
        #[arg(short = 'k', long)]
        hits: Option<usize>,

        /// Run tag written in TREC output
        #[arg(short = 't', long)]
        runtag: Option<String>,

        /// Output file (stdout when unset)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output layout
        #[arg(long, value_enum)]
        format: Option<RunFormat>,

        /// Queries ranked concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-query time budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Internal run file seeding the first cascade stage
        #[arg(long)]
        seed_run: Option<PathBuf>,
    },

    /// Rank a single query
    Rank {
        /// Model file (TOML or JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Query text
        #[arg(short = 'Q', long)]
        query: String,

        /// Results to show
        #[arg(short = 'k', long)]
        hits: Option<usize>,

        /// Document prior as `name=path` (repeatable)
        #[arg(short, long = "prior")]
        priors: Vec<String>,
    },

    /// Show concept bin boundaries
    Bins {
        /// Bin type (default, impact)
        #[arg(short = 't', long, default_value = "default")]
        bin_type: String,

        /// Bin parameters, e.g. "3 0"
        #[arg(short, long)]
        params: String,

        /// Number of concepts
        #[arg(short = 'n', long)]
        total: usize,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), MrfError> {
    let json_mode = cli.json_mode;
    let index = cli.index.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX));
    let backend = cli.backend.unwrap_or_default();

    match cli.command {
        Some(Commands::Index { corpus, force }) => {
            cmd_index(&index, backend, json_mode, &corpus, force)
        }
        Some(Commands::Status) => cmd_status(&index, backend, json_mode),
        Some(Commands::Run {
            config,
            queries,
            models,
            hits,
            runtag,
            output,
            format,
            workers,
            timeout_ms,
            seed_run,
        }) => {
            let overrides = RunOverrides {
                index: cli.index,
                backend: cli.backend,
                queries,
                models,
                hits,
                runtag,
                output,
                format,
                workers,
                timeout_ms,
                seed_run,
            };
            cmd_run(config.as_deref(), &overrides, json_mode).await
        }
        Some(Commands::Rank {
            model,
            query,
            hits,
            priors,
        }) => cmd_rank(&index, backend, json_mode, &model, &query, hits, &priors),
        Some(Commands::Bins {
            bin_type,
            params,
            total,
        }) => cmd_bins(&bin_type, &params, total, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&index, backend, json_mode)
        }
    }
}
