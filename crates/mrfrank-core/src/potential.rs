//! # Potential Functions
//!
//! A potential is the scoring logic bound to a clique. It is split into two
//! capabilities:
//! - `CandidateCursor`: which documents the potential can still contribute to
//! - `Scoreable`: the contribution for a given document, plus bounds
//!
//! The ranker passes the current document explicitly to
//! `compute_potential(doc)`; no node state is shared between cliques.
//!
//! Cursor invariant: after `set_next_candidate(d)` the underlying cursor
//! points at the first posting with doc id >= `d`, so `next_candidate` is
//! O(1).

use crate::environment::{DocumentPrior, PostingsReaderCache, RetrievalEnvironment};
use crate::expression::{Expression, ExpressionGenerator};
use crate::graph::GraphNode;
use crate::index::{DocumentLengths, PostingsCursor};
use crate::scoring::ScoringFunction;
use crate::{DocId, GlobalEvidence, MrfError};
use std::sync::Arc;

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Document-at-a-time candidate generation.
pub trait CandidateCursor {
    /// Smallest doc id this potential can still contribute to, or
    /// `DocId::END` when exhausted.
    fn next_candidate(&self) -> DocId;

    /// Move forward so that `next_candidate() >= doc`. Never moves back.
    fn set_next_candidate(&mut self, doc: DocId);
}

/// Score contribution with known bounds.
pub trait Scoreable {
    /// Contribution for `doc`. `doc` must not precede the last
    /// `set_next_candidate` target.
    fn compute_potential(&self, doc: DocId) -> f32;

    /// Upper bound of `compute_potential` over all documents.
    fn max_score(&self) -> f32;

    /// Lower bound of `compute_potential` over all documents.
    fn min_score(&self) -> f32;
}

/// A clique's bound scoring logic.
pub trait PotentialFunction: CandidateCursor + Scoreable + Send + std::fmt::Debug {
    /// Bind to postings for the clique's nodes. Called once per query.
    ///
    /// Fails with a configuration error when the nodes do not fit the
    /// potential (terms on a document potential, no terms on a query
    /// potential).
    fn initialize(
        &mut self,
        nodes: &[GraphNode],
        env: &RetrievalEnvironment,
        cache: &mut PostingsReaderCache,
        global: &GlobalEvidence,
    ) -> Result<(), MrfError>;

    /// Rewind to the first candidate.
    fn reset(&mut self);

    /// The bound expression, if this potential reads postings.
    fn expression(&self) -> Option<&Expression> {
        None
    }
}

/// Potential kinds that can be named in a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotentialKind {
    /// Expression postings scored by a scoring function.
    Query,
    /// Static per-document prior.
    Document,
}

impl PotentialKind {
    /// Resolve by name (`query`, `document`).
    pub fn from_name(name: &str) -> Result<Self, MrfError> {
        match name {
            "query" => Ok(Self::Query),
            "document" => Ok(Self::Document),
            other => Err(MrfError::config(format!("unknown potential '{}'", other))),
        }
    }
}

// =============================================================================
// QUERY POTENTIAL
// =============================================================================

/// Scores an expression's postings with a scoring function.
///
/// An expression without postings contributes 0.0 everywhere and never
/// produces candidates.
#[derive(Debug)]
pub struct QueryPotential {
    generator: ExpressionGenerator,
    scoring: Box<dyn ScoringFunction>,
    expression: Option<Expression>,
    cursor: Option<PostingsCursor>,
    lengths: Arc<DocumentLengths>,
}

impl QueryPotential {
    /// Create an unbound potential.
    #[must_use]
    pub fn new(generator: ExpressionGenerator, scoring: Box<dyn ScoringFunction>) -> Self {
        Self {
            generator,
            scoring,
            expression: None,
            cursor: None,
            lengths: Arc::default(),
        }
    }

    fn live_cursor(&self) -> Option<&PostingsCursor> {
        self.cursor.as_ref().filter(|c| !c.list().is_empty())
    }
}

impl PotentialFunction for QueryPotential {
    fn initialize(
        &mut self,
        nodes: &[GraphNode],
        env: &RetrievalEnvironment,
        cache: &mut PostingsReaderCache,
        global: &GlobalEvidence,
    ) -> Result<(), MrfError> {
        let terms: Vec<String> = nodes
            .iter()
            .filter_map(|n| n.as_term().map(str::to_string))
            .collect();
        if terms.is_empty() {
            return Err(MrfError::config("query potential requires at least one term node"));
        }

        let expression = self.generator.expression(&terms)?;
        let cursor = env.postings_reader(&expression, cache)?;
        self.scoring.initialize(&cursor.evidence(), global);
        self.lengths = env.document_lengths();
        self.expression = Some(expression);
        self.cursor = Some(cursor);
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.reset();
        }
    }

    fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }
}

impl CandidateCursor for QueryPotential {
    fn next_candidate(&self) -> DocId {
        self.cursor.as_ref().map_or(DocId::END, PostingsCursor::doc)
    }

    fn set_next_candidate(&mut self, doc: DocId) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.skip_to(doc);
        }
    }
}

impl Scoreable for QueryPotential {
    fn compute_potential(&self, doc: DocId) -> f32 {
        let Some(cursor) = self.live_cursor() else {
            return 0.0;
        };
        let tf = if cursor.doc() == doc { cursor.tf() } else { 0 };
        self.scoring.score(tf, self.lengths.get(doc))
    }

    fn max_score(&self) -> f32 {
        match self.live_cursor() {
            Some(_) => self.scoring.max_score(),
            None => 0.0,
        }
    }

    fn min_score(&self) -> f32 {
        match self.live_cursor() {
            Some(_) => self.scoring.min_score(),
            None => 0.0,
        }
    }
}

// =============================================================================
// DOCUMENT POTENTIAL
// =============================================================================

/// Reads a named document prior. Never drives candidate selection.
#[derive(Debug)]
pub struct DocumentPotential {
    prior_name: String,
    prior: Option<Arc<DocumentPrior>>,
}

impl DocumentPotential {
    /// Create an unbound prior potential.
    pub fn new(prior_name: impl Into<String>) -> Self {
        Self {
            prior_name: prior_name.into(),
            prior: None,
        }
    }
}

impl PotentialFunction for DocumentPotential {
    fn initialize(
        &mut self,
        nodes: &[GraphNode],
        env: &RetrievalEnvironment,
        _cache: &mut PostingsReaderCache,
        _global: &GlobalEvidence,
    ) -> Result<(), MrfError> {
        if nodes.iter().any(|n| n.as_term().is_some()) {
            return Err(MrfError::config(format!(
                "document potential '{}' cannot take term nodes",
                self.prior_name
            )));
        }
        let prior = env.prior(&self.prior_name).ok_or_else(|| {
            MrfError::config(format!("prior '{}' is not loaded", self.prior_name))
        })?;
        self.prior = Some(prior);
        Ok(())
    }

    fn reset(&mut self) {}
}

impl CandidateCursor for DocumentPotential {
    fn next_candidate(&self) -> DocId {
        DocId::END
    }

    fn set_next_candidate(&mut self, _doc: DocId) {}
}

impl Scoreable for DocumentPotential {
    fn compute_potential(&self, doc: DocId) -> f32 {
        self.prior.as_ref().map_or(0.0, |p| p.value(doc))
    }

    fn max_score(&self) -> f32 {
        self.prior.as_ref().map_or(0.0, |p| p.max())
    }

    fn min_score(&self) -> f32 {
        self.prior.as_ref().map_or(0.0, |p| p.min())
    }
}

// =============================================================================
// TESTS
// =============================================================================
