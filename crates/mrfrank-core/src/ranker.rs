//! # Document Ranker
//!
//! Document-at-a-time ranking over the cliques of an MRF.
//!
//! ## Algorithm
//!
//! ```text
//! candidate = min over cliques of next_candidate()
//! while candidate != END:
//!     check deadline
//!     for each clique: set_next_candidate(candidate); score += weight × potential(candidate)
//!         stop early if score + remaining upper bound < k-th best score
//!     offer (candidate, score) to the bounded top-k heap
//!     for each clique: set_next_candidate(candidate + 1)
//!     candidate = min over cliques of next_candidate()
//! ```
//!
//! ## Determinism
//!
//! Candidates are visited in increasing doc id order and the heap uses the
//! total `Accumulator` order (score, then smaller doc id), so the same index
//! and query always give bit-identical output. Abandoning a document early
//! never changes the result: a later document only enters a full heap by
//! strictly beating its worst entry.

use crate::graph::Clique;
use crate::mrf::MarkovRandomField;
use crate::primitives::{DEFAULT_HITS, SCORE_BOUND_SLACK};
use crate::types::sort_ranked;
use crate::{Accumulator, DocId, MrfError};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Per-run ranking settings, threaded explicitly through every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankerConfig {
    /// Number of results to keep.
    pub hits: usize,
    /// Wall-clock budget per query.
    pub deadline: Option<Duration>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            hits: DEFAULT_HITS,
            deadline: None,
        }
    }
}

impl RankerConfig {
    /// Config keeping `hits` results and no deadline.
    #[must_use]
    pub fn with_hits(hits: usize) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Set the per-query deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Wall-clock budget for one query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub(crate) fn check(&self) -> Result<(), MrfError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let elapsed = self.start.elapsed();
        if elapsed >= limit {
            return Err(MrfError::DeadlineExceeded {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: limit.as_millis() as u64,
            });
        }
        Ok(())
    }
}

// =============================================================================
// SCAN
// =============================================================================

/// Result of one document-at-a-time pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScanOutcome {
    /// Ranked results, best first.
    pub results: Vec<Accumulator>,
    /// Documents visited.
    pub candidates: u64,
    /// Documents abandoned by the upper-bound test.
    pub abandoned: u64,
}

/// Rank with the given cliques. `hits = None` keeps every candidate.
pub(crate) fn scan(
    cliques: &mut [&mut Clique],
    hits: Option<usize>,
    deadline: &Deadline,
) -> Result<ScanOutcome, MrfError> {
    // remaining[i] bounds what cliques i.. can still add.
    let mut remaining = vec![0.0f32; cliques.len() + 1];
    for i in (0..cliques.len()).rev() {
        remaining[i] = remaining[i + 1] + cliques[i].max_contribution();
    }

    let mut heap: BinaryHeap<Reverse<Accumulator>> = BinaryHeap::new();
    let mut unbounded = Vec::new();
    let mut outcome = ScanOutcome::default();

    let mut candidate = next_candidate(cliques);
    while !candidate.is_end() {
        deadline.check()?;
        outcome.candidates += 1;

        let threshold = match hits {
            Some(k) if heap.len() >= k => heap.peek().map(|worst| worst.0.score),
            _ => None,
        };

        let mut score = 0.0f32;
        let mut abandoned = false;
        for (i, clique) in cliques.iter_mut().enumerate() {
            clique.set_next_candidate(candidate);
            score += clique.score(candidate);
            if let Some(threshold) = threshold
                && score + remaining[i + 1] < threshold - SCORE_BOUND_SLACK
            {
                abandoned = true;
                break;
            }
        }

        if abandoned {
            outcome.abandoned += 1;
        } else {
            let acc = Accumulator::new(candidate, score);
            match hits {
                None => unbounded.push(acc),
                Some(k) if heap.len() < k => heap.push(Reverse(acc)),
                Some(_) => {
                    if let Some(worst) = heap.peek()
                        && acc > worst.0
                    {
                        heap.pop();
                        heap.push(Reverse(acc));
                    }
                }
            }
        }

        let next = candidate.next();
        for clique in cliques.iter_mut() {
            clique.set_next_candidate(next);
        }
        candidate = next_candidate(cliques);
    }

    outcome.results = match hits {
        None => unbounded,
        Some(_) => heap.into_iter().map(|r| r.0).collect(),
    };
    sort_ranked(&mut outcome.results);
    Ok(outcome)
}

/// Add the cliques' contributions to already-scored documents.
///
/// Documents are visited in doc id order so every cursor only moves
/// forward; the output is re-sorted into ranking order.
pub(crate) fn rescore(
    cliques: &mut [&mut Clique],
    documents: &mut [Accumulator],
    deadline: &Deadline,
) -> Result<(), MrfError> {
    documents.sort_by_key(|acc| acc.doc);
    for acc in documents.iter_mut() {
        deadline.check()?;
        for clique in cliques.iter_mut() {
            clique.set_next_candidate(acc.doc);
            acc.score += clique.score(acc.doc);
        }
    }
    sort_ranked(documents);
    Ok(())
}

fn next_candidate(cliques: &[&mut Clique]) -> DocId {
    cliques
        .iter()
        .map(|c| c.next_candidate())
        .min()
        .unwrap_or(DocId::END)
}

// =============================================================================
// DOCUMENT RANKER
// =============================================================================

/// Single-pass ranker over every clique of an MRF.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentRanker {
    config: RankerConfig,
}

impl DocumentRanker {
    /// Create a ranker.
    #[must_use]
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// The ranker's settings.
    #[must_use]
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rank an initialised MRF. Returns at most `hits` results, best first.
    pub fn rank(&self, mrf: &mut MarkovRandomField) -> Result<Vec<Accumulator>, MrfError> {
        if !mrf.is_initialized() {
            return Err(MrfError::retrieval("ranking an MRF that was not initialized"));
        }
        let deadline = Deadline::start(self.config.deadline);
        let mut cliques: Vec<&mut Clique> = mrf.cliques_mut().iter_mut().collect();
        let outcome = scan(&mut cliques, Some(self.config.hits), &deadline)?;
        tracing::debug!(
            candidates = outcome.candidates,
            abandoned = outcome.abandoned,
            results = outcome.results.len(),
            "ranked"
        );
        Ok(outcome.results)
    }
}

// =============================================================================
// TESTS
// =============================================================================
