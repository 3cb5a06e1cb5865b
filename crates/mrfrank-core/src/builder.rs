//! # Feature-Based MRF Builder
//!
//! Turns a `ModelSpec` and a tokenised query into a `MarkovRandomField`.
//!
//! For every feature, in declaration order:
//! 1. Build the feature's clique set
//! 2. Weigh each clique's concept with the feature's importance model, if any
//! 3. With `scale`, trade weight against importance:
//!    `weight' = sign(w)·|w|^scale`, `importance' = importance^(1−scale)`
//! 4. With concept bins, keep only the selected slice of cliques
//!
//! Then, across the whole query:
//! - `normalize_importance` divides every model-derived importance by their
//!   total so they sum to one
//! - `prune_threshold` drops non-term cliques whose combined weight falls
//!   below it

use crate::clique_set::build_clique_set;
use crate::environment::RetrievalEnvironment;
use crate::graph::{Clique, CliqueType};
use crate::importance::{ImportanceModel, LinearImportanceModel};
use crate::model::ModelSpec;
use crate::mrf::MarkovRandomField;
use crate::primitives::MAX_QUERY_TERMS;
use crate::MrfError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds one MRF per query from a model specification.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBasedMrfBuilder<'a> {
    spec: &'a ModelSpec,
}

impl<'a> FeatureBasedMrfBuilder<'a> {
    /// Create a builder for a validated model.
    #[must_use]
    pub fn new(spec: &'a ModelSpec) -> Self {
        Self { spec }
    }

    /// Build the (uninitialised) MRF for a query.
    pub fn build(
        &self,
        env: &RetrievalEnvironment,
        query_terms: &[String],
    ) -> Result<MarkovRandomField, MrfError> {
        let terms = if query_terms.len() > MAX_QUERY_TERMS {
            tracing::warn!(
                terms = query_terms.len(),
                limit = MAX_QUERY_TERMS,
                "query truncated"
            );
            &query_terms[..MAX_QUERY_TERMS]
        } else {
            query_terms
        };

        let mut models: BTreeMap<&str, Arc<dyn ImportanceModel>> = BTreeMap::new();
        // (clique, importance came from a model)
        let mut built: Vec<(Clique, bool)> = Vec::new();

        for feature in &self.spec.features {
            let mut cliques = build_clique_set(feature, terms)?;
            if cliques.is_empty() {
                continue;
            }

            let model = match feature.importance.as_deref() {
                Some(id) => Some(self.importance_model(env, id, &mut models)?),
                None => None,
            };

            let mut importances = Vec::with_capacity(cliques.len());
            for clique in &mut cliques {
                let importance = match &model {
                    Some(model) => model.concept_weight(&clique.concept(), env)?,
                    None => 1.0,
                };
                match (feature.scale, model.is_some()) {
                    (Some(scale), true) => {
                        let weight = clique.parameter().weight;
                        clique.set_parameter_weight(weight.signum() * weight.abs().powf(scale));
                        clique.set_importance(importance.powf(1.0 - scale));
                    }
                    _ => clique.set_importance(importance),
                }
                importances.push(importance);
            }

            if let Some(bins) = feature.concept_bins()? {
                let keep = bins.select(&importances);
                if keep.is_empty() {
                    tracing::warn!(
                        feature = %feature.id,
                        concepts = cliques.len(),
                        bin = bins.which,
                        "concept bin selects nothing"
                    );
                }
                cliques = cliques
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep.binary_search(i).is_ok())
                    .map(|(_, clique)| clique)
                    .collect();
            }

            built.extend(cliques.into_iter().map(|c| (c, model.is_some())));
        }

        if self.spec.normalize_importance {
            let total: f32 = built
                .iter()
                .filter(|(_, modelled)| *modelled)
                .map(|(c, _)| c.importance())
                .sum();
            if total > 0.0 {
                for (clique, _) in built.iter_mut().filter(|(_, modelled)| *modelled) {
                    clique.set_importance(clique.importance() / total);
                }
            }
        }

        let mut mrf = MarkovRandomField::new(terms.to_vec());
        let mut pruned = 0usize;
        for (clique, _) in built {
            if let Some(threshold) = self.spec.prune_threshold
                && clique.clique_type() != CliqueType::Term
                && clique.weight() < threshold
            {
                pruned += 1;
                continue;
            }
            mrf.add_clique(clique);
        }

        tracing::debug!(
            model = %self.spec.id,
            terms = terms.len(),
            cliques = mrf.len(),
            pruned,
            "mrf built"
        );
        Ok(mrf)
    }

    fn importance_model<'m>(
        &self,
        env: &RetrievalEnvironment,
        id: &'m str,
        models: &mut BTreeMap<&'m str, Arc<dyn ImportanceModel>>,
    ) -> Result<Arc<dyn ImportanceModel>, MrfError> {
        if let Some(model) = models.get(id) {
            return Ok(Arc::clone(model));
        }
        let model: Arc<dyn ImportanceModel> = match self.spec.importance_model(id) {
            Some(spec) => Arc::new(LinearImportanceModel::from_spec(spec)?),
            None => env.importance_model(id).ok_or_else(|| {
                MrfError::config(format!(
                    "model '{}': unknown importance model '{}'",
                    self.spec.id, id
                ))
            })?,
        };
        models.insert(id, Arc::clone(&model));
        Ok(model)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, tokenize};

    fn env() -> RetrievalEnvironment {
        let mut builder = IndexBuilder::new();
        builder.add_document("a", &tokenize("alpha beta gamma")).expect("add");
        builder.add_document("b", &tokenize("beta gamma delta")).expect("add");
        RetrievalEnvironment::in_memory(builder.build().expect("build"))
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn importance_model(values: &[(&str, f32)], normalize: bool) -> ModelSpec {
        let table: Vec<String> = values
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect();
        let text = format!(
            r#"
id = "wsd"
normalize_importance = {}

[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
importance = "table"

[[importance_models]]
id = "table"
[[importance_models.features]]
kind = "table"
values = {{ {} }}
"#,
            normalize,
            table.join(", ")
        );
        ModelSpec::from_toml_str(&text).expect("model")
    }

    fn importances(mrf: &MarkovRandomField) -> Vec<f32> {
        mrf.cliques().iter().map(Clique::importance).collect()
    }

    #[test]
    fn normalization_is_noop_when_sum_is_one() {
        let spec = importance_model(&[("alpha", 0.2), ("beta", 0.3), ("gamma", 0.5)], true);
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha", "beta", "gamma"]))
            .expect("build");
        for (got, want) in importances(&mrf).iter().zip([0.2, 0.3, 0.5]) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn normalization_halves_when_sum_is_two() {
        let spec = importance_model(&[("alpha", 0.4), ("beta", 0.6), ("gamma", 1.0)], true);
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha", "beta", "gamma"]))
            .expect("build");
        let got = importances(&mrf);
        for (got, want) in got.iter().zip([0.2, 0.3, 0.5]) {
            assert!((got - want).abs() < 1e-6);
        }
        assert!((got.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn without_normalization_importances_are_raw() {
        let spec = importance_model(&[("alpha", 0.4), ("beta", 0.6), ("gamma", 1.0)], false);
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha", "beta", "gamma"]))
            .expect("build");
        assert!((importances(&mrf).iter().sum::<f32>() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn prune_threshold_spares_term_cliques() {
        let text = r#"
id = "m"
prune_threshold = 0.5
[[features]]
id = "term"
weight = 0.1
clique_set = "term"
potential = "query"
scoring_function = "bm25"
[[features]]
id = "od"
weight = 0.1
clique_set = "ordered"
potential = "query"
scoring_function = "bm25"
"#;
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha", "beta", "gamma"]))
            .expect("build");
        assert_eq!(mrf.len(), 3);
        assert!(mrf.cliques().iter().all(|c| c.clique_type() == CliqueType::Term));
    }

    #[test]
    fn scale_trades_weight_for_importance() {
        let text = r#"
id = "m"
[[features]]
id = "term"
weight = 0.25
clique_set = "term"
potential = "query"
scoring_function = "bm25"
importance = "flat"
scale = 0.5
[[importance_models]]
id = "flat"
[[importance_models.features]]
kind = "table"
default = 0.64
"#;
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha"]))
            .expect("build");
        let clique = &mrf.cliques()[0];
        assert!((clique.parameter().weight - 0.5).abs() < 1e-6);
        assert!((clique.importance() - 0.8).abs() < 1e-6);
        assert!((clique.weight() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn concept_bins_keep_most_important_slice() {
        let text = r#"
id = "m"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
importance = "table"
concept_bin_type = "default"
concept_bin_params = "2 0"
[[importance_models]]
id = "table"
[[importance_models.features]]
kind = "table"
values = { alpha = 0.1, beta = 0.7, gamma = 0.4 }
"#;
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let mrf = FeatureBasedMrfBuilder::new(&spec)
            .build(&env(), &terms(&["alpha", "beta", "gamma"]))
            .expect("build");
        let concepts: Vec<String> = mrf.cliques().iter().map(Clique::concept).collect();
        assert_eq!(concepts, vec!["beta", "gamma"]);
    }

    #[test]
    fn unknown_importance_model_is_configuration_error() {
        let text = r#"
id = "m"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
importance = "missing"
"#;
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let err = FeatureBasedMrfBuilder::new(&spec).build(&env(), &terms(&["alpha"]));
        assert!(matches!(err, Err(MrfError::Configuration(_))));
    }
}
