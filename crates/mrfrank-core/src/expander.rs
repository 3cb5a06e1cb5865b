//! # Latent Concept Expansion
//!
//! Pseudo-relevance feedback over single terms. The top `fb_docs` results
//! of a first ranking are treated as relevant with
//! `P(d|Q) ∝ exp(score(d))`; every non-query term is then weighted by
//! `Σ_d P(d|Q) · tf(t, d) / |d|` and the best `fb_terms` become new term
//! cliques whose importances are the normalised feedback weights.

use crate::environment::RetrievalEnvironment;
use crate::expression::ExpressionGenerator;
use crate::graph::{Clique, CliqueType, GraphNode, Parameter};
use crate::model::ExpanderSpec;
use crate::potential::QueryPotential;
use crate::scoring::build_scoring_function;
use crate::{Accumulator, MrfError};
use std::collections::{BTreeMap, BTreeSet};

/// Parameter name given to expansion cliques.
pub const EXPANSION_PARAMETER: &str = "expansion";

/// Unigram latent concept expander.
#[derive(Debug, Clone, PartialEq)]
pub struct UnigramLatentConceptExpander {
    fb_docs: usize,
    fb_terms: usize,
    weight: f32,
    scoring_function: String,
    params: BTreeMap<String, f32>,
}

impl UnigramLatentConceptExpander {
    /// Build from a validated model declaration.
    pub fn from_spec(spec: &ExpanderSpec) -> Result<Self, MrfError> {
        spec.validate()?;
        Ok(Self {
            fb_docs: spec.fb_docs,
            fb_terms: spec.fb_terms,
            weight: spec.weight,
            scoring_function: spec.scoring_function.clone(),
            params: spec.params.clone(),
        })
    }

    /// Feedback terms with normalised weights, best first.
    pub fn feedback_terms(
        &self,
        env: &RetrievalEnvironment,
        query_terms: &[String],
        ranked: &[Accumulator],
    ) -> Result<Vec<(String, f32)>, MrfError> {
        let docs = &ranked[..ranked.len().min(self.fb_docs)];
        let Some(top) = docs.iter().map(|acc| acc.score).reduce(f32::max) else {
            return Ok(Vec::new());
        };

        let relevance: Vec<f32> = docs.iter().map(|acc| (acc.score - top).exp()).collect();
        let norm: f32 = relevance.iter().sum();

        let query: BTreeSet<&str> = query_terms.iter().map(String::as_str).collect();
        let mut weights: BTreeMap<String, f32> = BTreeMap::new();
        for (acc, rel) in docs.iter().zip(&relevance) {
            let length = env.document_length(acc.doc);
            let Some(vector) = env.document_vector(acc.doc)? else {
                continue;
            };
            if length == 0 {
                continue;
            }
            let p_doc = rel / norm;
            for (term, tf) in vector {
                if query.contains(term.as_str()) {
                    continue;
                }
                *weights.entry(term).or_default() += p_doc * tf as f32 / length as f32;
            }
        }

        let mut terms: Vec<(String, f32)> = weights.into_iter().collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(self.fb_terms);

        let total: f32 = terms.iter().map(|(_, w)| w).sum();
        if total > 0.0 {
            for (_, w) in &mut terms {
                *w /= total;
            }
        }
        Ok(terms)
    }

    /// Term cliques for the feedback terms, unbound.
    pub fn expansion_cliques(
        &self,
        env: &RetrievalEnvironment,
        query_terms: &[String],
        ranked: &[Accumulator],
    ) -> Result<Vec<Clique>, MrfError> {
        let terms = self.feedback_terms(env, query_terms, ranked)?;
        tracing::debug!(
            feedback_docs = ranked.len().min(self.fb_docs),
            terms = terms.len(),
            "latent concept expansion"
        );

        let mut cliques = Vec::with_capacity(terms.len());
        for (term, importance) in terms {
            let scoring = build_scoring_function(&self.scoring_function, &self.params)?;
            let mut clique = Clique::new(
                vec![GraphNode::Document, GraphNode::term(term)],
                Box::new(QueryPotential::new(ExpressionGenerator::Term, scoring)),
                Parameter::new(EXPANSION_PARAMETER, self.weight),
                CliqueType::Term,
            )?;
            clique.set_importance(importance);
            cliques.push(clique);
        }
        Ok(cliques)
    }
}

// =============================================================================
// TESTS
// =============================================================================
