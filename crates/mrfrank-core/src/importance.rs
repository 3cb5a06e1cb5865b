//! # Importance Models
//!
//! An importance model assigns a query-dependent weight to a concept (the
//! space-joined terms of a clique). `LinearImportanceModel` is a weighted
//! sum of meta-features:
//! - `table`: explicit concept -> value map with a default
//! - `df`: `ln(1 + df)` of the concept
//! - `cf`: `ln(1 + cf)` of the concept
//!
//! Multi-term concepts are looked up as exact phrases (`#od1`).

use crate::environment::{PostingsReaderCache, RetrievalEnvironment};
use crate::expression::Expression;
use crate::model::{ImportanceModelSpec, MetaFeatureSpec};
use crate::MrfError;
use std::collections::BTreeMap;

/// Query-dependent concept weighting.
pub trait ImportanceModel: Send + Sync + std::fmt::Debug {
    /// Importance of a concept. Never negative.
    fn concept_weight(&self, concept: &str, env: &RetrievalEnvironment) -> Result<f32, MrfError>;
}

/// Source of one meta-feature value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaFeature {
    /// Explicit per-concept values.
    Table {
        values: BTreeMap<String, f32>,
        default: f32,
    },
    /// Log document frequency.
    Df,
    /// Log collection frequency.
    Cf,
}

impl MetaFeature {
    /// Resolve a meta-feature by name (`table`, `df`, `cf`).
    pub fn from_spec(spec: &MetaFeatureSpec) -> Result<Self, MrfError> {
        match spec.kind.as_str() {
            "table" => Ok(Self::Table {
                values: spec.values.clone(),
                default: spec.default,
            }),
            "df" => Ok(Self::Df),
            "cf" => Ok(Self::Cf),
            other => Err(MrfError::config(format!("unknown meta-feature '{}'", other))),
        }
    }

    fn value(&self, concept: &str, env: &RetrievalEnvironment) -> Result<f32, MrfError> {
        match self {
            Self::Table { values, default } => Ok(values.get(concept).copied().unwrap_or(*default)),
            Self::Df => Ok((concept_evidence(concept, env)?.df as f32).ln_1p()),
            Self::Cf => Ok((concept_evidence(concept, env)?.cf as f32).ln_1p()),
        }
    }
}

fn concept_evidence(
    concept: &str,
    env: &RetrievalEnvironment,
) -> Result<crate::GlobalTermEvidence, MrfError> {
    let terms: Vec<String> = concept.split_whitespace().map(str::to_string).collect();
    let expression = match terms.as_slice() {
        [term] => Expression::Term(term.clone()),
        _ => Expression::Ordered { gap: 1, terms },
    };
    let mut cache = PostingsReaderCache::new();
    env.term_evidence(&expression, &mut cache)
}

/// Weighted linear combination of meta-features.
#[derive(Debug, Clone, Default)]
pub struct LinearImportanceModel {
    features: Vec<(f32, MetaFeature)>,
}

impl LinearImportanceModel {
    /// Create an empty model (every concept gets 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a weighted meta-feature.
    #[must_use]
    pub fn with_feature(mut self, weight: f32, feature: MetaFeature) -> Self {
        self.features.push((weight, feature));
        self
    }

    /// Build from a model-file declaration.
    pub fn from_spec(spec: &ImportanceModelSpec) -> Result<Self, MrfError> {
        if spec.features.is_empty() {
            return Err(MrfError::config(format!(
                "importance model '{}' declares no meta-features",
                spec.id
            )));
        }
        let mut model = Self::new();
        for feature in &spec.features {
            model = model.with_feature(feature.weight, MetaFeature::from_spec(feature)?);
        }
        Ok(model)
    }
}

impl ImportanceModel for LinearImportanceModel {
    fn concept_weight(&self, concept: &str, env: &RetrievalEnvironment) -> Result<f32, MrfError> {
        let mut total = 0.0f32;
        for (weight, feature) in &self.features {
            total += weight * feature.value(concept, env)?;
        }
        Ok(total.max(0.0))
    }
}

// =============================================================================
// TESTS
// =============================================================================
