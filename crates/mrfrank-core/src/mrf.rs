//! # Markov Random Field
//!
//! The cliques of one query plus the collection evidence they were bound
//! with. An MRF is built per (query, model) pair and dropped after ranking.
//! It owns its postings reader cache, so nothing query-scoped is shared.

use crate::environment::{PostingsReaderCache, RetrievalEnvironment};
use crate::graph::Clique;
use crate::{DocId, GlobalEvidence, MrfError};

/// The query graph handed to a ranker.
#[derive(Debug, Default)]
pub struct MarkovRandomField {
    cliques: Vec<Clique>,
    query_terms: Vec<String>,
    global: Option<GlobalEvidence>,
    cache: PostingsReaderCache,
}

impl MarkovRandomField {
    /// Create an MRF for a tokenised query.
    #[must_use]
    pub fn new(query_terms: Vec<String>) -> Self {
        Self {
            query_terms,
            ..Self::default()
        }
    }

    /// Add a clique. Cliques added after `initialize` must be initialised
    /// again before ranking.
    pub fn add_clique(&mut self, clique: Clique) {
        self.global = None;
        self.cliques.push(clique);
    }

    /// Bind every clique to postings.
    ///
    /// Clears the postings reader cache first, then binds each clique at
    /// query scope. Any clique failure aborts the query.
    pub fn initialize(&mut self, env: &RetrievalEnvironment) -> Result<(), MrfError> {
        self.cache.clear();
        let global = env.global_evidence(self.query_terms.len());
        for clique in &mut self.cliques {
            clique.initialize(env, &mut self.cache, &global)?;
        }
        tracing::debug!(
            cliques = self.cliques.len(),
            cached_expressions = self.cache.len(),
            cache_hits = self.cache.hits(),
            "mrf initialized"
        );
        self.global = Some(global);
        Ok(())
    }

    /// Whether `initialize` has run since the last clique was added.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.global.is_some()
    }

    /// Collection evidence from the last `initialize`.
    #[must_use]
    pub fn global_evidence(&self) -> Option<&GlobalEvidence> {
        self.global.as_ref()
    }

    /// Query terms the MRF was built for.
    #[must_use]
    pub fn query_terms(&self) -> &[String] {
        &self.query_terms
    }

    /// All cliques.
    #[must_use]
    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    /// All cliques, mutably.
    pub fn cliques_mut(&mut self) -> &mut [Clique] {
        &mut self.cliques
    }

    /// Number of cliques.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cliques.len()
    }

    /// Whether the MRF has no cliques.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cliques.is_empty()
    }

    /// Smallest next candidate over all cliques.
    #[must_use]
    pub fn next_candidate(&self) -> DocId {
        self.cliques
            .iter()
            .map(Clique::next_candidate)
            .min()
            .unwrap_or(DocId::END)
    }

    /// Rewind every clique's cursor.
    pub fn reset(&mut self) {
        for clique in &mut self.cliques {
            clique.reset();
        }
    }

    /// Distinct cascade stages, ascending.
    #[must_use]
    pub fn stages(&self) -> Vec<u32> {
        let mut stages: Vec<u32> = self.cliques.iter().map(Clique::cascade_stage).collect();
        stages.sort_unstable();
        stages.dedup();
        stages
    }
}
