//! # Cascade Ranking
//!
//! Multi-stage ranking. Cliques are grouped by `cascade_stage`; the first
//! stage scans the whole collection with its (cheap) cliques, every later
//! stage re-scores only the survivors of the previous one and adds its
//! cliques' contributions to their running scores.
//!
//! After each stage the stage's pruner, if any, cuts the candidate list:
//! - `rank K`: keep the top K
//! - `fraction P`: keep the top `ceil(P × n)`
//! - `score T`: keep documents scoring at least T
//! - `mean_max A`: keep documents scoring at least `mean + A × (max − mean)`
//!
//! The running cost (documents scored × clique unit cost, summed over
//! stages) is reported only; it never steers ranking.
//!
//! ## Concept Bins
//!
//! A feature may keep only a slice of its cliques, chosen by concept
//! importance. Cliques are ordered by importance descending, ties by
//! original index ascending, and a bin selects a contiguous range of that
//! order. An out-of-range bin selects nothing.

use crate::graph::Clique;
use crate::mrf::MarkovRandomField;
use crate::ranker::{Deadline, RankerConfig, rescore, scan};
use crate::types::sort_ranked;
use crate::{Accumulator, MrfError};
use std::cmp::Ordering;
use std::ops::Range;

// =============================================================================
// PRUNERS
// =============================================================================

/// Candidate-list cut applied after a cascade stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pruner {
    Rank(usize),
    Fraction(f32),
    Score(f32),
    MeanMax(f32),
}

impl Pruner {
    /// Parse `"<name> <param>"`.
    pub fn parse(spec: &str) -> Result<Self, MrfError> {
        let fields: Vec<&str> = spec.split_whitespace().collect();
        let [name, param] = fields[..] else {
            return Err(MrfError::config(format!(
                "pruner '{}': expected '<name> <param>'",
                spec
            )));
        };
        let bad = || MrfError::config(format!("pruner '{}': bad parameter '{}'", spec, param));
        match name {
            "rank" => match param.parse::<usize>() {
                Ok(k) if k > 0 => Ok(Self::Rank(k)),
                _ => Err(bad()),
            },
            "fraction" => match param.parse::<f32>() {
                Ok(p) if p > 0.0 && p <= 1.0 => Ok(Self::Fraction(p)),
                _ => Err(bad()),
            },
            "score" => match param.parse::<f32>() {
                Ok(t) if t.is_finite() => Ok(Self::Score(t)),
                _ => Err(bad()),
            },
            "mean_max" => match param.parse::<f32>() {
                Ok(a) if (0.0..=1.0).contains(&a) => Ok(Self::MeanMax(a)),
                _ => Err(bad()),
            },
            other => Err(MrfError::config(format!("unknown pruner '{}'", other))),
        }
    }

    /// Cut a ranked list (best first) in place.
    pub fn apply(&self, ranked: &mut Vec<Accumulator>) {
        match *self {
            Self::Rank(k) => ranked.truncate(k),
            Self::Fraction(p) => {
                let keep = (p as f64 * ranked.len() as f64).ceil() as usize;
                ranked.truncate(keep);
            }
            Self::Score(t) => ranked.retain(|acc| acc.score >= t),
            Self::MeanMax(a) => {
                let Some(max) = ranked.iter().map(|acc| acc.score).reduce(f32::max) else {
                    return;
                };
                let mean = ranked.iter().map(|acc| acc.score).sum::<f32>() / ranked.len() as f32;
                let threshold = (mean + a * (max - mean)).min(max);
                ranked.retain(|acc| acc.score >= threshold);
            }
        }
    }
}

// =============================================================================
// CONCEPT BINS
// =============================================================================

/// How bin boundaries are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptBinType {
    /// Fixed-size bins of K concepts.
    Default,
    /// Geometrically growing bins.
    Impact,
}

/// A bin selection: which slice of importance-ordered concepts to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConceptBins {
    pub bin_type: ConceptBinType,
    /// Bin size (`default`) or number of bins (`impact`).
    pub size: usize,
    /// Zero-based bin to select.
    pub which: usize,
}

impl ConceptBins {
    /// Parse a bin type and its two integer parameters.
    pub fn parse(bin_type: &str, params: &str) -> Result<Self, MrfError> {
        let bin_type = match bin_type {
            "default" => ConceptBinType::Default,
            "impact" => ConceptBinType::Impact,
            other => return Err(MrfError::config(format!("unsupported concept bin type '{}'", other))),
        };
        let values: Vec<usize> = params
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| MrfError::config(format!("concept bin params '{}' are not integers", params)))?;
        let [size, which] = values[..] else {
            return Err(MrfError::config(format!(
                "concept bin params '{}': expected two integers",
                params
            )));
        };
        Ok(Self {
            bin_type,
            size,
            which,
        })
    }

    /// Index range (into importance order) of the selected bin.
    #[must_use]
    pub fn range(&self, total: usize) -> Range<usize> {
        match self.bin_type {
            ConceptBinType::Default => default_range(self.size, self.which, total),
            ConceptBinType::Impact => impact_range(self.size, self.which, total),
        }
    }

    /// Original indices of the selected concepts, ascending.
    #[must_use]
    pub fn select(&self, importances: &[f32]) -> Vec<usize> {
        let order = importance_order(importances);
        let mut selected = order.get(self.range(importances.len())).unwrap_or_default().to_vec();
        selected.sort_unstable();
        selected
    }
}

/// Indices sorted by importance descending, ties by index ascending.
#[must_use]
pub fn importance_order(importances: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..importances.len()).collect();
    order.sort_by(|&a, &b| match importances[b].total_cmp(&importances[a]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order
}

fn default_range(size: usize, which: usize, total: usize) -> Range<usize> {
    match size.checked_mul(which) {
        Some(start) if size > 0 && start < total => start..(start + size).min(total),
        _ => 0..0,
    }
}

fn impact_range(num_bins: usize, which: usize, total: usize) -> Range<usize> {
    if num_bins == 0 || total == 0 || which >= num_bins {
        return 0..0;
    }
    let base = ((total + 1) as f64).powf(1.0 / num_bins as f64);
    let mut start = 0usize;
    let mut residual = 0.0f64;
    for bin in 0..num_bins {
        let end = if bin + 1 == num_bins {
            total
        } else {
            let size = base.powi(bin as i32 + 1) - base.powi(bin as i32) + residual;
            let rounded = (size + 0.5).floor();
            residual = size - rounded;
            (start + rounded.max(0.0) as usize).min(total)
        };
        if bin == which {
            return start..end;
        }
        start = end;
    }
    0..0
}

// =============================================================================
// CASCADE RANKER
// =============================================================================

/// What one stage did.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: u32,
    /// Cliques active in the stage.
    pub cliques: usize,
    /// Documents scored.
    pub documents: u64,
    /// Documents left after pruning.
    pub survivors: usize,
    pub cost: f64,
}

/// Ranked output plus cost accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    pub results: Vec<Accumulator>,
    pub cost: f64,
    pub stages: Vec<StageReport>,
}

/// Stage-by-stage ranker over an MRF's cascade stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeRanker {
    config: RankerConfig,
}

impl CascadeRanker {
    /// Create a cascade ranker.
    #[must_use]
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Rank an initialised MRF.
    ///
    /// With a `seed` (results of an earlier first stage, e.g. read from an
    /// internal run file) the first stage is not run and the seed's scores
    /// are carried into the second stage.
    pub fn rank(
        &self,
        mrf: &mut MarkovRandomField,
        seed: Option<&[Accumulator]>,
    ) -> Result<CascadeOutcome, MrfError> {
        if !mrf.is_initialized() {
            return Err(MrfError::retrieval("ranking an MRF that was not initialized"));
        }
        let deadline = Deadline::start(self.config.deadline);
        let mut outcome = CascadeOutcome::default();
        let mut current: Option<Vec<Accumulator>> = None;

        for (position, stage) in mrf.stages().into_iter().enumerate() {
            let mut cliques: Vec<&mut Clique> = mrf
                .cliques_mut()
                .iter_mut()
                .filter(|c| c.cascade_stage() == stage)
                .collect();
            let pruner = stage_pruner(&cliques)?;

            if position == 0
                && let Some(seed) = seed
            {
                let mut seeded = seed.to_vec();
                sort_ranked(&mut seeded);
                outcome.stages.push(StageReport {
                    stage,
                    cliques: cliques.len(),
                    documents: 0,
                    survivors: seeded.len(),
                    cost: 0.0,
                });
                current = Some(seeded);
                continue;
            }

            let (mut ranked, documents) = match current.take() {
                None => {
                    let hits = match pruner {
                        Some(Pruner::Rank(k)) => Some(k),
                        _ => None,
                    };
                    let scanned = scan(&mut cliques, hits, &deadline)?;
                    (scanned.results, scanned.candidates)
                }
                Some(mut previous) => {
                    rescore(&mut cliques, &mut previous, &deadline)?;
                    let documents = previous.len() as u64;
                    (previous, documents)
                }
            };
            if let Some(pruner) = pruner {
                pruner.apply(&mut ranked);
            }

            let unit: f64 = cliques.iter().map(|c| c.unit_cost()).sum();
            let cost = documents as f64 * unit;
            outcome.cost += cost;
            tracing::debug!(
                stage,
                cliques = cliques.len(),
                documents,
                survivors = ranked.len(),
                cost,
                "cascade stage"
            );
            outcome.stages.push(StageReport {
                stage,
                cliques: cliques.len(),
                documents,
                survivors: ranked.len(),
                cost,
            });
            current = Some(ranked);
        }

        let mut results = current.unwrap_or_default();
        results.truncate(self.config.hits);
        outcome.results = results;
        Ok(outcome)
    }
}

/// The first pruner declared among a stage's cliques.
fn stage_pruner(cliques: &[&mut Clique]) -> Result<Option<Pruner>, MrfError> {
    cliques
        .iter()
        .find_map(|c| c.pruner())
        .map(Pruner::parse)
        .transpose()
}

// =============================================================================
// TESTS
// =============================================================================
