//! # Clique Sets
//!
//! A clique set turns one feature declaration and the query terms into
//! cliques:
//! - `document`: one document-only clique
//! - `term`: one clique per query term
//! - `ordered` / `unordered`: term dependencies, either `sequential`
//!   (adjacent pairs) or `full` (every multi-term subset; contiguous spans
//!   only for `ordered`)
//!
//! Full dependence enumerates bitmasks `1..2^N` in increasing order, so the
//! clique order is fixed by bit position. It is exponential in N; queries
//! longer than `MAX_FULL_DEPENDENCE_TERMS` fall back to sequential pairs.

use crate::graph::{Clique, CliqueType, GraphNode, Parameter};
use crate::model::FeatureSpec;
use crate::primitives::MAX_FULL_DEPENDENCE_TERMS;
use crate::MrfError;

/// Clique set types that can be named in a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliqueSetKind {
    Document,
    Term,
    Ordered,
    Unordered,
}

impl CliqueSetKind {
    /// Resolve by name.
    pub fn from_name(name: &str) -> Result<Self, MrfError> {
        match name {
            "document" => Ok(Self::Document),
            "term" => Ok(Self::Term),
            "ordered" => Ok(Self::Ordered),
            "unordered" => Ok(Self::Unordered),
            other => Err(MrfError::config(format!("unknown clique set '{}'", other))),
        }
    }

    fn clique_type(self) -> CliqueType {
        match self {
            Self::Document => CliqueType::Document,
            Self::Term => CliqueType::Term,
            Self::Ordered => CliqueType::Ordered,
            Self::Unordered => CliqueType::Unordered,
        }
    }
}

/// Which term subsets a dependence clique set covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependence {
    /// Adjacent pairs: N-1 cliques.
    Sequential,
    /// Every subset of two or more terms.
    Full,
}

impl Dependence {
    /// Resolve by name.
    pub fn from_name(name: &str) -> Result<Self, MrfError> {
        match name {
            "sequential" => Ok(Self::Sequential),
            "full" => Ok(Self::Full),
            other => Err(MrfError::config(format!("unknown dependence '{}'", other))),
        }
    }
}

/// Build the cliques one feature contributes for a query.
pub fn build_clique_set(feature: &FeatureSpec, terms: &[String]) -> Result<Vec<Clique>, MrfError> {
    let kind = feature.clique_set_kind()?;
    let subsets = match kind {
        CliqueSetKind::Document => {
            let clique = Clique::new(
                vec![GraphNode::Document],
                feature.build_potential()?,
                Parameter::new(&feature.id, feature.weight),
                CliqueType::Document,
            )?;
            return Ok(vec![configure(clique, feature)]);
        }
        CliqueSetKind::Term => (0..terms.len()).map(|i| vec![i]).collect(),
        CliqueSetKind::Ordered => dependence_subsets(feature, terms.len(), true)?,
        CliqueSetKind::Unordered => dependence_subsets(feature, terms.len(), false)?,
    };

    let mut cliques = Vec::with_capacity(subsets.len());
    for subset in subsets {
        let mut nodes = Vec::with_capacity(subset.len() + 1);
        if feature.doc_dependent {
            nodes.push(GraphNode::Document);
        }
        nodes.extend(subset.iter().map(|&i| GraphNode::term(terms[i].as_str())));

        let clique = Clique::new(
            nodes,
            feature.build_potential()?,
            Parameter::new(&feature.id, feature.weight),
            kind.clique_type(),
        )?;
        cliques.push(configure(clique, feature));
    }
    Ok(cliques)
}

fn configure(mut clique: Clique, feature: &FeatureSpec) -> Clique {
    clique.set_cascade_stage(feature.cascade_stage);
    clique.set_pruner(feature.prune.clone());
    clique
}

fn dependence_subsets(
    feature: &FeatureSpec,
    n: usize,
    contiguous: bool,
) -> Result<Vec<Vec<usize>>, MrfError> {
    match feature.dependence()? {
        Dependence::Sequential => Ok(sequential_subsets(n)),
        Dependence::Full if n > MAX_FULL_DEPENDENCE_TERMS => {
            tracing::warn!(
                feature = %feature.id,
                terms = n,
                limit = MAX_FULL_DEPENDENCE_TERMS,
                "query too long for full dependence, using sequential pairs"
            );
            Ok(sequential_subsets(n))
        }
        Dependence::Full => Ok(full_subsets(n, contiguous)),
    }
}

/// Adjacent index pairs `(i, i+1)`.
#[must_use]
pub fn sequential_subsets(n: usize) -> Vec<Vec<usize>> {
    (1..n).map(|i| vec![i - 1, i]).collect()
}

/// Every subset of at least two indices, in bitmask order. With
/// `contiguous`, only runs of adjacent indices are kept.
#[must_use]
pub fn full_subsets(n: usize, contiguous: bool) -> Vec<Vec<usize>> {
    let n = n.min(MAX_FULL_DEPENDENCE_TERMS);
    let mut subsets = Vec::new();
    for mask in 1u32..(1u32 << n) {
        if mask.count_ones() < 2 {
            continue;
        }
        // A contiguous run shifted down to bit 0 is 2^k - 1.
        let run = mask >> mask.trailing_zeros();
        if contiguous && run & (run + 1) != 0 {
            continue;
        }
        subsets.push((0..n).filter(|&i| mask & (1 << i) != 0).collect());
    }
    subsets
}

// =============================================================================
// TESTS
// =============================================================================
