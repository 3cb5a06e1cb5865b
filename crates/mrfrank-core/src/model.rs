//! # Model Specifications
//!
//! A model file declares the features of an MRF: which clique sets to
//! build, how to score them and how to weight them. Files are TOML or JSON
//! (chosen by extension) and map onto `ModelSpec`.
//!
//! Every string-typed identifier (clique set, dependence, potential,
//! generator, scoring function, pruner, bin type) is resolved through an
//! explicit factory during `ModelSpec::validate`, so a bad model fails at
//! load time with `MrfError::Configuration` before any ranking starts.
//!
//! ```toml
//! id = "sd"
//! kind = "feature"
//!
//! [[features]]
//! id = "term"
//! weight = 0.85
//! clique_set = "term"
//! potential = "query"
//! scoring_function = "dirichlet"
//! params = { mu = 2500.0 }
//! ```

use crate::cascade::{ConceptBins, Pruner};
use crate::clique_set::{CliqueSetKind, Dependence};
use crate::expression::ExpressionGenerator;
use crate::importance::LinearImportanceModel;
use crate::potential::{DocumentPotential, PotentialFunction, PotentialKind, QueryPotential};
use crate::primitives::{DEFAULT_FEEDBACK_DOCS, DEFAULT_FEEDBACK_TERMS, DEFAULT_HITS};
use crate::scoring::build_scoring_function;
use crate::MrfError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// MODEL KIND
// =============================================================================

/// How a model is ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Single-pass document-at-a-time ranking over all cliques.
    #[default]
    #[serde(alias = "Feature")]
    Feature,
    /// Cascade ranking with per-stage pruning.
    #[serde(alias = "GreedyConstrained")]
    GreedyConstrained,
    /// Cascade ranking, newer model file layout.
    #[serde(alias = "New")]
    New,
}

impl ModelKind {
    /// Whether this kind is ranked with the cascade strategy.
    #[must_use]
    pub fn is_cascade(self) -> bool {
        matches!(self, Self::GreedyConstrained | Self::New)
    }
}

// =============================================================================
// MODEL SPEC
// =============================================================================

/// A complete model declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Model identifier, used in logs and as the default run tag.
    pub id: String,
    /// Ranking strategy.
    #[serde(default)]
    pub kind: ModelKind,
    /// Number of results to return (defaults to `DEFAULT_HITS`).
    #[serde(default)]
    pub hits: Option<usize>,
    /// Divide importances by their total so they sum to one per query.
    #[serde(default)]
    pub normalize_importance: bool,
    /// Drop non-term cliques whose combined weight is below this value.
    #[serde(default)]
    pub prune_threshold: Option<f32>,
    /// Feature declarations, in order.
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
    /// Importance models referenced by features.
    #[serde(default)]
    pub importance_models: Vec<ImportanceModelSpec>,
    /// Optional pseudo-relevance-feedback expander.
    #[serde(default)]
    pub expander: Option<ExpanderSpec>,
}

impl ModelSpec {
    /// Parse and validate a TOML model.
    pub fn from_toml_str(text: &str) -> Result<Self, MrfError> {
        let spec: Self = toml::from_str(text)
            .map_err(|e| MrfError::config(format!("invalid model TOML: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a JSON model.
    pub fn from_json_str(text: &str) -> Result<Self, MrfError> {
        let spec: Self = serde_json::from_str(text)
            .map_err(|e| MrfError::config(format!("invalid model JSON: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a model file; `.json` is parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, MrfError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        };
        parsed.map_err(|e| match e {
            MrfError::Configuration(msg) => {
                MrfError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Number of results to return.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.unwrap_or(DEFAULT_HITS)
    }

    /// Check every identifier and required attribute.
    pub fn validate(&self) -> Result<(), MrfError> {
        if self.id.trim().is_empty() {
            return Err(MrfError::config("model id must not be empty"));
        }
        if self.features.is_empty() {
            return Err(MrfError::config(format!("model '{}' declares no features", self.id)));
        }
        if self.hits == Some(0) {
            return Err(MrfError::config(format!("model '{}': hits must be positive", self.id)));
        }
        if let Some(threshold) = self.prune_threshold
            && !threshold.is_finite()
        {
            return Err(MrfError::config(format!(
                "model '{}': prune_threshold must be finite",
                self.id
            )));
        }

        let mut ids = BTreeSet::new();
        for feature in &self.features {
            if !ids.insert(feature.id.as_str()) {
                return Err(MrfError::config(format!(
                    "model '{}': duplicate feature id '{}'",
                    self.id, feature.id
                )));
            }
            feature.validate()?;
        }

        let mut model_ids = BTreeSet::new();
        for importance in &self.importance_models {
            if !model_ids.insert(importance.id.as_str()) {
                return Err(MrfError::config(format!(
                    "model '{}': duplicate importance model '{}'",
                    self.id, importance.id
                )));
            }
            LinearImportanceModel::from_spec(importance).map_err(|e| match e {
                MrfError::Configuration(msg) => {
                    MrfError::Configuration(format!("model '{}': {}", self.id, msg))
                }
                other => other,
            })?;
        }

        if !self.kind.is_cascade() && self.features.iter().any(|f| f.cascade_stage > 0) {
            tracing::warn!(model = %self.id, "cascade stages ignored by a feature model");
        }

        if let Some(expander) = &self.expander {
            expander.validate()?;
        }
        Ok(())
    }

    /// Importance model declared in this spec.
    #[must_use]
    pub fn importance_model(&self, id: &str) -> Option<&ImportanceModelSpec> {
        self.importance_models.iter().find(|m| m.id == id)
    }
}

// =============================================================================
// FEATURE SPEC
// =============================================================================

/// One `feature` declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureSpec {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// `document`, `term`, `ordered` or `unordered`.
    pub clique_set: String,
    /// `sequential` (default) or `full`.
    #[serde(default)]
    pub dependence: Option<String>,
    /// Include the document node in generated cliques.
    #[serde(default = "default_true")]
    pub doc_dependent: bool,
    /// `query` or `document`. Required.
    #[serde(default)]
    pub potential: Option<String>,
    /// Expression generator override (`term`, `ordered`, `unordered`).
    #[serde(default)]
    pub generator: Option<String>,
    #[serde(default)]
    pub gap: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub fixed_width: bool,
    /// Required for query potentials.
    #[serde(default)]
    pub scoring_function: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
    /// Prior name, required for document potentials.
    #[serde(default)]
    pub prior: Option<String>,
    /// Importance model id.
    #[serde(default)]
    pub importance: Option<String>,
    /// Weight/importance trade-off in `[0, 1]`.
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub cascade_stage: u32,
    /// Pruner applied after this feature's stage (`"rank 100"`, ...).
    #[serde(default)]
    pub prune: Option<String>,
    /// `default` or `impact`.
    #[serde(default)]
    pub concept_bin_type: Option<String>,
    /// Two integers, e.g. `"3 0"`.
    #[serde(default)]
    pub concept_bin_params: Option<String>,
}

fn default_weight() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

impl FeatureSpec {
    fn err(&self, message: impl std::fmt::Display) -> MrfError {
        MrfError::config(format!("feature '{}': {}", self.id, message))
    }

    fn wrap(&self, error: MrfError) -> MrfError {
        match error {
            MrfError::Configuration(msg) => self.err(msg),
            other => other,
        }
    }

    /// Resolved clique set.
    pub fn clique_set_kind(&self) -> Result<CliqueSetKind, MrfError> {
        CliqueSetKind::from_name(&self.clique_set).map_err(|e| self.wrap(e))
    }

    /// Resolved dependence mode.
    pub fn dependence(&self) -> Result<Dependence, MrfError> {
        match &self.dependence {
            Some(name) => Dependence::from_name(name).map_err(|e| self.wrap(e)),
            None => Ok(Dependence::Sequential),
        }
    }

    /// Resolved potential kind. Missing is an error.
    pub fn potential_kind(&self) -> Result<PotentialKind, MrfError> {
        let name = self
            .potential
            .as_deref()
            .ok_or_else(|| self.err("missing required attribute 'potential'"))?;
        PotentialKind::from_name(name).map_err(|e| self.wrap(e))
    }

    /// Resolved expression generator, defaulting by clique set.
    pub fn expression_generator(&self) -> Result<ExpressionGenerator, MrfError> {
        let name = match (&self.generator, self.clique_set_kind()?) {
            (Some(name), _) => name.as_str(),
            (None, CliqueSetKind::Ordered) => "ordered",
            (None, CliqueSetKind::Unordered) => "unordered",
            (None, CliqueSetKind::Term | CliqueSetKind::Document) => "term",
        };
        ExpressionGenerator::from_name(name, self.gap, self.width, self.fixed_width)
            .map_err(|e| self.wrap(e))
    }

    /// Build a fresh, unbound potential for one clique.
    pub fn build_potential(&self) -> Result<Box<dyn PotentialFunction>, MrfError> {
        match self.potential_kind()? {
            PotentialKind::Document => {
                let prior = self
                    .prior
                    .as_deref()
                    .ok_or_else(|| self.err("document potential needs 'prior'"))?;
                Ok(Box::new(DocumentPotential::new(prior)))
            }
            PotentialKind::Query => {
                let name = self
                    .scoring_function
                    .as_deref()
                    .ok_or_else(|| self.err("query potential needs 'scoring_function'"))?;
                let scoring = build_scoring_function(name, &self.params).map_err(|e| self.wrap(e))?;
                Ok(Box::new(QueryPotential::new(self.expression_generator()?, scoring)))
            }
        }
    }

    /// Parsed pruner, if declared.
    pub fn pruner(&self) -> Result<Option<Pruner>, MrfError> {
        self.prune
            .as_deref()
            .map(Pruner::parse)
            .transpose()
            .map_err(|e| self.wrap(e))
    }

    /// Parsed concept bins, if declared.
    pub fn concept_bins(&self) -> Result<Option<ConceptBins>, MrfError> {
        match (&self.concept_bin_type, &self.concept_bin_params) {
            (None, None) => Ok(None),
            (Some(kind), Some(params)) => ConceptBins::parse(kind, params)
                .map(Some)
                .map_err(|e| self.wrap(e)),
            (Some(_), None) => Err(self.err("concept_bin_type needs concept_bin_params")),
            (None, Some(_)) => Err(self.err("concept_bin_params needs concept_bin_type")),
        }
    }

    /// Resolve every identifier once.
    pub fn validate(&self) -> Result<(), MrfError> {
        if self.id.trim().is_empty() {
            return Err(MrfError::config("feature id must not be empty"));
        }
        if !self.weight.is_finite() {
            return Err(self.err("weight must be finite"));
        }
        if let Some(scale) = self.scale {
            if !(0.0..=1.0).contains(&scale) {
                return Err(self.err(format!("scale {} outside [0, 1]", scale)));
            }
            if self.importance.is_none() {
                return Err(self.err("scale requires an importance model"));
            }
        }

        let clique_set = self.clique_set_kind()?;
        self.dependence()?;
        let potential = self.potential_kind()?;
        match (clique_set, potential) {
            (CliqueSetKind::Document, PotentialKind::Document) => {}
            (CliqueSetKind::Document, PotentialKind::Query) => {
                return Err(self.err("document clique set needs a document potential"));
            }
            (_, PotentialKind::Document) => {
                return Err(self.err("term clique sets need a query potential"));
            }
            (_, PotentialKind::Query) => {}
        }
        self.build_potential()?;
        self.pruner()?;
        self.concept_bins()?;
        Ok(())
    }
}

// =============================================================================
// IMPORTANCE AND EXPANDER SPECS
// =============================================================================

/// Declaration of a linear importance model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportanceModelSpec {
    pub id: String,
    #[serde(default)]
    pub features: Vec<MetaFeatureSpec>,
}

/// One weighted meta-feature of an importance model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaFeatureSpec {
    /// `table`, `df` or `cf`.
    pub kind: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// Concept values for `table`.
    #[serde(default)]
    pub values: BTreeMap<String, f32>,
    /// Value for concepts missing from `values`.
    #[serde(default)]
    pub default: f32,
}

/// Pseudo-relevance-feedback expander declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpanderSpec {
    /// Only `unigram_latent_concept` is known.
    #[serde(default = "default_expander_kind")]
    pub kind: String,
    #[serde(default = "default_fb_docs")]
    pub fb_docs: usize,
    #[serde(default = "default_fb_terms")]
    pub fb_terms: usize,
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub scoring_function: String,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

fn default_expander_kind() -> String {
    "unigram_latent_concept".to_string()
}

fn default_fb_docs() -> usize {
    DEFAULT_FEEDBACK_DOCS
}

fn default_fb_terms() -> usize {
    DEFAULT_FEEDBACK_TERMS
}

impl ExpanderSpec {
    /// Check the expander type and its scoring function.
    pub fn validate(&self) -> Result<(), MrfError> {
        if self.kind != "unigram_latent_concept" {
            return Err(MrfError::config(format!("unknown expander '{}'", self.kind)));
        }
        if self.fb_docs == 0 || self.fb_terms == 0 {
            return Err(MrfError::config("expander fb_docs and fb_terms must be positive"));
        }
        if !self.weight.is_finite() {
            return Err(MrfError::config("expander weight must be finite"));
        }
        build_scoring_function(&self.scoring_function, &self.params)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
