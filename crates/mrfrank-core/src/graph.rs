//! # Graph Model
//!
//! Nodes, parameters and cliques of the query MRF.
//!
//! A clique is an ordered list of nodes (at most one document node, any
//! number of term nodes) bound to a potential function. Its contribution to
//! a document's score is `weight × importance × potential(doc)`.

use crate::environment::{PostingsReaderCache, RetrievalEnvironment};
use crate::potential::PotentialFunction;
use crate::{DocId, GlobalEvidence, MrfError};

// =============================================================================
// NODES
// =============================================================================

/// A node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphNode {
    /// The document being scored.
    Document,
    /// A query term.
    Term(String),
}

impl GraphNode {
    /// Create a term node.
    pub fn term(term: impl Into<String>) -> Self {
        Self::Term(term.into())
    }

    /// The term, for term nodes.
    #[must_use]
    pub fn as_term(&self) -> Option<&str> {
        match self {
            Self::Document => None,
            Self::Term(t) => Some(t),
        }
    }
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// A named clique weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name, normally the id of the feature that produced the clique.
    pub name: String,
    /// Learned or static weight.
    pub weight: f32,
}

impl Parameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// What kind of dependency a clique models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CliqueType {
    /// Document-only (priors).
    Document,
    /// Single term.
    Term,
    /// Ordered window over several terms.
    Ordered,
    /// Unordered window over several terms.
    Unordered,
}

// =============================================================================
// CLIQUE
// =============================================================================

/// A scored subset of graph nodes.
#[derive(Debug)]
pub struct Clique {
    nodes: Vec<GraphNode>,
    potential: Box<dyn PotentialFunction>,
    parameter: Parameter,
    importance: f32,
    clique_type: CliqueType,
    cascade_stage: u32,
    pruner: Option<String>,
}

impl Clique {
    /// Create a clique. Fails if more than one document node is given.
    pub fn new(
        nodes: Vec<GraphNode>,
        potential: Box<dyn PotentialFunction>,
        parameter: Parameter,
        clique_type: CliqueType,
    ) -> Result<Self, MrfError> {
        let documents = nodes.iter().filter(|n| **n == GraphNode::Document).count();
        if documents > 1 {
            return Err(MrfError::config(format!(
                "clique '{}' has {} document nodes",
                parameter.name, documents
            )));
        }
        Ok(Self {
            nodes,
            potential,
            parameter,
            importance: 1.0,
            clique_type,
            cascade_stage: 0,
            pruner: None,
        })
    }

    /// Bind the potential to postings for the current query.
    pub fn initialize(
        &mut self,
        env: &RetrievalEnvironment,
        cache: &mut PostingsReaderCache,
        global: &GlobalEvidence,
    ) -> Result<(), MrfError> {
        self.potential
            .initialize(&self.nodes, env, cache, global)
            .map_err(|e| match e {
                MrfError::Configuration(msg) => MrfError::Configuration(format!(
                    "clique '{}' [{}]: {}",
                    self.parameter.name,
                    self.concept(),
                    msg
                )),
                other => other,
            })
    }

    // -------------------------------------------------------------------------
    // Ranking path
    // -------------------------------------------------------------------------

    /// Smallest doc id this clique can still contribute to.
    #[must_use]
    pub fn next_candidate(&self) -> DocId {
        self.potential.next_candidate()
    }

    /// Advance so that `next_candidate() >= doc`.
    pub fn set_next_candidate(&mut self, doc: DocId) {
        self.potential.set_next_candidate(doc);
    }

    /// Unweighted potential for `doc`.
    #[must_use]
    pub fn potential(&self, doc: DocId) -> f32 {
        self.potential.compute_potential(doc)
    }

    /// Weighted contribution for `doc`.
    #[must_use]
    pub fn score(&self, doc: DocId) -> f32 {
        self.weight() * self.potential(doc)
    }

    /// Upper bound of `score` over all documents. A negative weight flips
    /// which potential bound applies.
    #[must_use]
    pub fn max_contribution(&self) -> f32 {
        let weight = self.weight();
        if weight >= 0.0 {
            weight * self.potential.max_score()
        } else {
            weight * self.potential.min_score()
        }
    }

    /// Rewind the potential's cursor.
    pub fn reset(&mut self) {
        self.potential.reset();
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Combined weight: parameter weight × importance.
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.parameter.weight * self.importance
    }

    /// The clique's parameter.
    #[must_use]
    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    /// Replace the parameter weight.
    pub fn set_parameter_weight(&mut self, weight: f32) {
        self.parameter.weight = weight;
    }

    /// Query-dependent importance.
    #[must_use]
    pub fn importance(&self) -> f32 {
        self.importance
    }

    /// Set the query-dependent importance.
    pub fn set_importance(&mut self, importance: f32) {
        self.importance = importance;
    }

    /// Dependency kind.
    #[must_use]
    pub fn clique_type(&self) -> CliqueType {
        self.clique_type
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Term nodes in order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(GraphNode::as_term)
    }

    /// Space-joined terms.
    #[must_use]
    pub fn concept(&self) -> String {
        self.terms().collect::<Vec<_>>().join(" ")
    }

    /// Cascade stage in which this clique becomes active.
    #[must_use]
    pub fn cascade_stage(&self) -> u32 {
        self.cascade_stage
    }

    /// Set the cascade stage.
    pub fn set_cascade_stage(&mut self, stage: u32) {
        self.cascade_stage = stage;
    }

    /// Pruner declared on this clique, raw form.
    #[must_use]
    pub fn pruner(&self) -> Option<&str> {
        self.pruner.as_deref()
    }

    /// Declare a pruner for this clique's stage.
    pub fn set_pruner(&mut self, pruner: Option<String>) {
        self.pruner = pruner;
    }

    /// Relative cost of scoring one document: 1 for document and term
    /// cliques, the number of terms for windows.
    #[must_use]
    pub fn unit_cost(&self) -> f64 {
        match self.clique_type {
            CliqueType::Document | CliqueType::Term => 1.0,
            CliqueType::Ordered | CliqueType::Unordered => self.terms().count().max(1) as f64,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
