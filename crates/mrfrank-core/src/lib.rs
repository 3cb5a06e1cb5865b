//! # mrfrank-core
//!
//! The Markov Random Field ranking engine for mrfrank.
//!
//! A query is turned into a graph of cliques (single terms, ordered and
//! unordered term windows, document priors), each clique carries a
//! potential function and a learned weight, and documents are ranked by
//! the weighted sum of potentials over an inverted index.
//!
//! ## Layers
//!
//! - `types`, `primitives`: value types, errors and compiled-in constants
//! - `index`, `formats`: postings access (in-memory or redb) and file formats
//! - `environment`: the shared, read-only retrieval environment
//! - `expression`, `scoring`, `potential`, `importance`: per-clique scoring
//! - `graph`, `clique_set`, `model`, `builder`, `mrf`: building the MRF
//! - `ranker`, `cascade`, `expander`, `runner`: ranking strategies
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Deterministic: same index, model and query give bit-identical output
//! - The environment is shared read-only; each MRF owns its cursors

// =============================================================================
// MODULES
// =============================================================================

pub mod builder;
pub mod cascade;
pub mod clique_set;
pub mod environment;
pub mod expander;
pub mod expression;
pub mod formats;
pub mod graph;
pub mod importance;
pub mod index;
pub mod model;
pub mod mrf;
pub mod potential;
pub mod primitives;
pub mod ranker;
pub mod runner;
pub mod scoring;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Accumulator, DocId, GlobalEvidence, GlobalTermEvidence, MrfError, sort_ranked};

// =============================================================================
// RE-EXPORTS: Index and Environment
// =============================================================================

pub use environment::{DocumentPrior, PostingsReaderCache, RetrievalEnvironment, StorageBackend};
pub use index::{
    DocumentLengths, IndexBuilder, IndexReader, MemoryIndex, PostingsCursor, PostingsList,
    RedbIndex, tokenize,
};

// =============================================================================
// RE-EXPORTS: Model Graph
// =============================================================================

pub use builder::FeatureBasedMrfBuilder;
pub use clique_set::{CliqueSetKind, Dependence, build_clique_set};
pub use expression::{Expression, ExpressionGenerator};
pub use graph::{Clique, CliqueType, GraphNode, Parameter};
pub use importance::{ImportanceModel, LinearImportanceModel, MetaFeature};
pub use model::{ExpanderSpec, FeatureSpec, ImportanceModelSpec, ModelKind, ModelSpec};
pub use mrf::MarkovRandomField;
pub use potential::{DocumentPotential, PotentialFunction, PotentialKind, QueryPotential};
pub use scoring::{ScoringFunction, build_scoring_function};

// =============================================================================
// RE-EXPORTS: Ranking
// =============================================================================

pub use cascade::{CascadeOutcome, CascadeRanker, ConceptBinType, ConceptBins, Pruner, StageReport};
pub use expander::UnigramLatentConceptExpander;
pub use ranker::{DocumentRanker, RankerConfig};
pub use runner::{
    BatchQueryRunner, FailedQuery, OutputFormat, QueryOutcome, RankedQuery, RankingOptions,
    RunSummary, check_model_resources, rank_query,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{QueryRecord, load_index, load_queries, read_internal_input_file, save_index};
