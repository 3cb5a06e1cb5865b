//! # Scoring Functions
//!
//! A scoring function turns (tf, document length) into a real-valued score,
//! given term and collection statistics. Each function also reports the
//! bounds of its output, which the ranker uses for early termination.
//!
//! Functions are resolved by name through `build_scoring_function`; unknown
//! names or parameters are configuration errors.

use crate::primitives::{
    DEFAULT_BM25_B, DEFAULT_BM25_K1, DEFAULT_DIRICHLET_MU, DEFAULT_JELINEK_MERCER_LAMBDA,
};
use crate::{GlobalEvidence, GlobalTermEvidence, MrfError};
use std::collections::BTreeMap;

/// Term-frequency scoring with known bounds.
pub trait ScoringFunction: Send + std::fmt::Debug {
    /// Bind collection and term statistics. Called once per query.
    fn initialize(&mut self, term: &GlobalTermEvidence, global: &GlobalEvidence);

    /// Score for a document of length `doc_len` containing `tf` matches.
    fn score(&self, tf: u32, doc_len: u32) -> f32;

    /// Upper bound of `score` over all documents.
    fn max_score(&self) -> f32;

    /// Lower bound of `score` over all documents.
    fn min_score(&self) -> f32;
}

/// Resolve a scoring function by name.
///
/// Known names: `bm25` (`k1`, `b`), `dirichlet` (`mu`),
/// `jelinek_mercer` (`lambda`).
pub fn build_scoring_function(
    name: &str,
    params: &BTreeMap<String, f32>,
) -> Result<Box<dyn ScoringFunction>, MrfError> {
    match name {
        "bm25" => {
            check_params(name, params, &["k1", "b"])?;
            let k1 = params.get("k1").copied().unwrap_or(DEFAULT_BM25_K1);
            let b = params.get("b").copied().unwrap_or(DEFAULT_BM25_B);
            if k1 < 0.0 || !(0.0..=1.0).contains(&b) {
                return Err(MrfError::config(format!(
                    "bm25 parameters out of range: k1={}, b={}",
                    k1, b
                )));
            }
            Ok(Box::new(Bm25ScoringFunction::new(k1, b)))
        }
        "dirichlet" => {
            check_params(name, params, &["mu"])?;
            let mu = params.get("mu").copied().unwrap_or(DEFAULT_DIRICHLET_MU);
            if mu <= 0.0 {
                return Err(MrfError::config(format!("dirichlet mu must be positive: {}", mu)));
            }
            Ok(Box::new(DirichletScoringFunction::new(mu)))
        }
        "jelinek_mercer" => {
            check_params(name, params, &["lambda"])?;
            let lambda = params
                .get("lambda")
                .copied()
                .unwrap_or(DEFAULT_JELINEK_MERCER_LAMBDA);
            if !(lambda > 0.0 && lambda <= 1.0) {
                return Err(MrfError::config(format!(
                    "jelinek_mercer lambda must be in (0, 1]: {}",
                    lambda
                )));
            }
            Ok(Box::new(JelinekMercerScoringFunction::new(lambda)))
        }
        other => Err(MrfError::config(format!("unknown scoring function '{}'", other))),
    }
}

fn check_params(
    name: &str,
    params: &BTreeMap<String, f32>,
    allowed: &[&str],
) -> Result<(), MrfError> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(MrfError::config(format!(
            "scoring function '{}' has no parameter '{}'",
            name, unknown
        ))),
        None => Ok(()),
    }
}

/// Background probability of an expression, floored so it is never zero.
fn background(term: &GlobalTermEvidence, global: &GlobalEvidence) -> f32 {
    let cf = term.cf.max(1) as f32;
    let collection = global.collection_length.max(term.cf.max(1)) as f32;
    cf / collection
}

// =============================================================================
// BM25
// =============================================================================

/// Okapi BM25 with the always-positive `ln(1 + ...)` idf.
#[derive(Debug, Clone)]
pub struct Bm25ScoringFunction {
    k1: f32,
    b: f32,
    idf: f32,
    avg_doc_len: f32,
}

impl Bm25ScoringFunction {
    /// Create with explicit parameters.
    #[must_use]
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            idf: 0.0,
            avg_doc_len: 1.0,
        }
    }

    /// The idf bound at initialisation.
    #[must_use]
    pub fn idf(&self) -> f32 {
        self.idf
    }
}

impl ScoringFunction for Bm25ScoringFunction {
    fn initialize(&mut self, term: &GlobalTermEvidence, global: &GlobalEvidence) {
        let n = global.document_count as f32;
        let df = term.df as f32;
        self.idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
        self.avg_doc_len = global.average_document_length();
    }

    fn score(&self, tf: u32, doc_len: u32) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let tf = tf as f32;
        let norm = self.k1 * (1.0 - self.b + self.b * doc_len as f32 / self.avg_doc_len);
        self.idf * tf * (self.k1 + 1.0) / (tf + norm)
    }

    fn max_score(&self) -> f32 {
        self.idf * (self.k1 + 1.0)
    }

    fn min_score(&self) -> f32 {
        0.0
    }
}

// =============================================================================
// DIRICHLET
// =============================================================================

/// Query likelihood with Dirichlet smoothing: `ln((tf + mu·p) / (dl + mu))`.
#[derive(Debug, Clone)]
pub struct DirichletScoringFunction {
    mu: f32,
    background: f32,
    max_doc_len: u32,
}

impl DirichletScoringFunction {
    /// Create with an explicit smoothing mass.
    #[must_use]
    pub fn new(mu: f32) -> Self {
        Self {
            mu,
            background: 1.0,
            max_doc_len: 0,
        }
    }
}

impl ScoringFunction for DirichletScoringFunction {
    fn initialize(&mut self, term: &GlobalTermEvidence, global: &GlobalEvidence) {
        self.background = background(term, global);
        self.max_doc_len = global.max_document_length;
    }

    fn score(&self, tf: u32, doc_len: u32) -> f32 {
        ((tf as f32 + self.mu * self.background) / (doc_len as f32 + self.mu)).ln()
    }

    fn max_score(&self) -> f32 {
        // tf <= dl keeps the ratio below 1.
        0.0
    }

    fn min_score(&self) -> f32 {
        (self.mu * self.background / (self.max_doc_len as f32 + self.mu)).ln()
    }
}

// =============================================================================
// JELINEK-MERCER
// =============================================================================

/// Query likelihood with linear smoothing: `ln((1-λ)·tf/dl + λ·p)`.
#[derive(Debug, Clone)]
pub struct JelinekMercerScoringFunction {
    lambda: f32,
    background: f32,
}

impl JelinekMercerScoringFunction {
    /// Create with an explicit background weight.
    #[must_use]
    pub fn new(lambda: f32) -> Self {
        Self {
            lambda,
            background: 1.0,
        }
    }
}

impl ScoringFunction for JelinekMercerScoringFunction {
    fn initialize(&mut self, term: &GlobalTermEvidence, global: &GlobalEvidence) {
        self.background = background(term, global);
    }

    fn score(&self, tf: u32, doc_len: u32) -> f32 {
        let ml = if doc_len == 0 {
            0.0
        } else {
            (tf as f32 / doc_len as f32).min(1.0)
        };
        ((1.0 - self.lambda) * ml + self.lambda * self.background).ln()
    }

    fn max_score(&self) -> f32 {
        ((1.0 - self.lambda) + self.lambda * self.background).ln()
    }

    fn min_score(&self) -> f32 {
        (self.lambda * self.background).ln()
    }
}

// =============================================================================
// TESTS
// =============================================================================
