//! # Batch Query Runner
//!
//! Glue between query files, model specs and the rankers.
//!
//! `rank_query` is the single-query pipeline: build the MRF, initialise it,
//! rank it with the model's strategy (single pass or cascade), and, when the
//! model declares an expander, add feedback cliques and rank again.
//!
//! `BatchQueryRunner` applies that pipeline to every (query, model) pair.
//! Errors that only concern one query are logged and recorded; errors for
//! which `MrfError::is_fatal_for_batch` holds abort the run.

use crate::builder::FeatureBasedMrfBuilder;
use crate::cascade::CascadeRanker;
use crate::environment::RetrievalEnvironment;
use crate::expander::UnigramLatentConceptExpander;
use crate::formats::{QueryRecord, write_internal_results, write_trec_results};
use crate::model::ModelSpec;
use crate::mrf::MarkovRandomField;
use crate::ranker::{DocumentRanker, RankerConfig};
use crate::{Accumulator, MrfError};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// SINGLE QUERY
// =============================================================================

/// Run-wide overrides of model settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankingOptions {
    /// Overrides every model's `hits`.
    pub hits: Option<usize>,
    /// Per-query wall-clock budget.
    pub deadline: Option<Duration>,
}

impl RankingOptions {
    fn ranker_config(&self, model: &ModelSpec) -> RankerConfig {
        RankerConfig::with_hits(self.hits.unwrap_or_else(|| model.hits())).deadline(self.deadline)
    }
}

/// Ranked output of one (query, model) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedQuery {
    /// Results, best first.
    pub results: Vec<Accumulator>,
    /// Cascade cost; `None` for single-pass models.
    pub cost: Option<f64>,
}

/// Check that every prior and importance model named by `model` is
/// available in `env`.
pub fn check_model_resources(env: &RetrievalEnvironment, model: &ModelSpec) -> Result<(), MrfError> {
    for feature in &model.features {
        if let Some(prior) = &feature.prior
            && !env.prior_names().any(|name| name == prior)
        {
            return Err(MrfError::config(format!(
                "model '{}': feature '{}' needs prior '{}', which is not loaded",
                model.id, feature.id, prior
            )));
        }
        if let Some(id) = &feature.importance
            && model.importance_model(id).is_none()
            && env.importance_model(id).is_none()
        {
            return Err(MrfError::config(format!(
                "model '{}': feature '{}' names unknown importance model '{}'",
                model.id, feature.id, id
            )));
        }
    }
    Ok(())
}

/// Rank a tokenised query with a model.
///
/// `seed` replaces the first stage of a cascade model and is ignored by
/// single-pass models.
pub fn rank_query(
    env: &RetrievalEnvironment,
    model: &ModelSpec,
    query_terms: &[String],
    options: &RankingOptions,
    seed: Option<&[Accumulator]>,
) -> Result<RankedQuery, MrfError> {
    let config = options.ranker_config(model);
    let builder = FeatureBasedMrfBuilder::new(model);

    let mut mrf = builder.build(env, query_terms)?;
    mrf.initialize(env)?;
    let ranked = rank_with_strategy(model, &mut mrf, config, seed)?;

    let Some(expander_spec) = &model.expander else {
        return Ok(ranked);
    };
    let expander = UnigramLatentConceptExpander::from_spec(expander_spec)?;
    let feedback = expander.expansion_cliques(env, mrf.query_terms(), &ranked.results)?;
    if feedback.is_empty() {
        return Ok(ranked);
    }

    let mut expanded = builder.build(env, query_terms)?;
    let last_stage = expanded.stages().last().copied().unwrap_or(0);
    for mut clique in feedback {
        clique.set_cascade_stage(last_stage);
        expanded.add_clique(clique);
    }
    expanded.initialize(env)?;
    rank_with_strategy(model, &mut expanded, config, seed)
}

fn rank_with_strategy(
    model: &ModelSpec,
    mrf: &mut MarkovRandomField,
    config: RankerConfig,
    seed: Option<&[Accumulator]>,
) -> Result<RankedQuery, MrfError> {
    if model.kind.is_cascade() {
        let outcome = CascadeRanker::new(config).rank(mrf, seed)?;
        Ok(RankedQuery {
            results: outcome.results,
            cost: Some(outcome.cost),
        })
    } else {
        Ok(RankedQuery {
            results: DocumentRanker::new(config).rank(mrf)?,
            cost: None,
        })
    }
}

// =============================================================================
// BATCH RUNNER
// =============================================================================

/// Layout of result lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `qid Q0 docno rank score runtag`
    #[default]
    Trec,
    /// `qid internal_docid score`
    Internal,
}

/// Ranked output for one (query, model) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub qid: String,
    pub model: String,
    pub ranked: RankedQuery,
}

/// A query that failed without aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedQuery {
    pub qid: String,
    pub model: String,
    pub error: String,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: Vec<FailedQuery>,
    pub results: usize,
    pub cost: f64,
}

impl RunSummary {
    /// Account for one finished pair.
    pub fn record(&mut self, outcome: &QueryOutcome) {
        self.completed += 1;
        self.results += outcome.ranked.results.len();
        self.cost += outcome.ranked.cost.unwrap_or(0.0);
    }
}

/// Ranks every query with every model.
#[derive(Debug, Clone)]
pub struct BatchQueryRunner {
    env: Arc<RetrievalEnvironment>,
    models: Vec<ModelSpec>,
    options: RankingOptions,
    seeds: BTreeMap<String, Vec<Accumulator>>,
}

impl BatchQueryRunner {
    /// Create a runner. Fails when no models are given, a model is
    /// invalid, or a model needs a prior or importance model the
    /// environment does not have.
    pub fn new(env: Arc<RetrievalEnvironment>, models: Vec<ModelSpec>) -> Result<Self, MrfError> {
        if models.is_empty() {
            return Err(MrfError::config("no models to run"));
        }
        let mut ids = BTreeSet::new();
        for model in &models {
            model.validate()?;
            check_model_resources(&env, model)?;
            if !ids.insert(model.id.as_str()) {
                return Err(MrfError::config(format!("duplicate model id '{}'", model.id)));
            }
        }
        Ok(Self {
            env,
            models,
            options: RankingOptions::default(),
            seeds: BTreeMap::new(),
        })
    }

    /// Set run-wide overrides.
    #[must_use]
    pub fn with_options(mut self, options: RankingOptions) -> Self {
        self.options = options;
        self
    }

    /// Seed cascade models with per-query first-stage results.
    #[must_use]
    pub fn with_seeds(mut self, seeds: BTreeMap<String, Vec<Accumulator>>) -> Self {
        self.seeds = seeds;
        self
    }

    /// The models, in run order.
    #[must_use]
    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// The shared environment.
    #[must_use]
    pub fn environment(&self) -> &Arc<RetrievalEnvironment> {
        &self.env
    }

    /// Rank one pair, propagating every error.
    pub fn run_query(&self, query: &QueryRecord, model: &ModelSpec) -> Result<QueryOutcome, MrfError> {
        let terms = self.env.tokenize(&query.text);
        let seed = self.seeds.get(&query.qid).map(Vec::as_slice);
        let ranked = rank_query(&self.env, model, &terms, &self.options, seed)?;
        tracing::debug!(
            qid = %query.qid,
            model = %model.id,
            results = ranked.results.len(),
            "query ranked"
        );
        Ok(QueryOutcome {
            qid: query.qid.clone(),
            model: model.id.clone(),
            ranked,
        })
    }

    /// Rank one pair under the batch error policy: per-query failures are
    /// logged and returned as `Ok(Err(..))`, batch-fatal errors as `Err`.
    pub fn run_query_logged(
        &self,
        query: &QueryRecord,
        model: &ModelSpec,
    ) -> Result<Result<QueryOutcome, FailedQuery>, MrfError> {
        match self.run_query(query, model) {
            Ok(outcome) => Ok(Ok(outcome)),
            Err(e) if e.is_fatal_for_batch() => Err(e),
            Err(e) => {
                tracing::warn!(qid = %query.qid, model = %model.id, error = %e, "query failed");
                Ok(Err(FailedQuery {
                    qid: query.qid.clone(),
                    model: model.id.clone(),
                    error: e.to_string(),
                }))
            }
        }
    }

    /// Write one outcome. `runtag` defaults to the model id.
    pub fn write_outcome<W: Write>(
        &self,
        out: &mut W,
        outcome: &QueryOutcome,
        format: OutputFormat,
        runtag: Option<&str>,
    ) -> Result<(), MrfError> {
        match format {
            OutputFormat::Trec => write_trec_results(
                out,
                &outcome.qid,
                &outcome.ranked.results,
                runtag.unwrap_or(&outcome.model),
                |doc| self.env.docno(doc),
            ),
            OutputFormat::Internal => {
                write_internal_results(out, &outcome.qid, &outcome.ranked.results)
            }
        }
    }

    /// Rank every query with every model, sequentially, writing results as
    /// they complete.
    pub fn run<W: Write>(
        &self,
        queries: &[QueryRecord],
        out: &mut W,
        format: OutputFormat,
        runtag: Option<&str>,
    ) -> Result<RunSummary, MrfError> {
        if queries.is_empty() {
            return Err(MrfError::config("no queries to run"));
        }
        let mut summary = RunSummary::default();
        for model in &self.models {
            for query in queries {
                match self.run_query_logged(query, model)? {
                    Ok(outcome) => {
                        self.write_outcome(out, &outcome, format, runtag)?;
                        summary.record(&outcome);
                    }
                    Err(failed) => summary.failed.push(failed),
                }
            }
        }
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed.len(),
            results = summary.results,
            "batch finished"
        );
        Ok(summary)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, tokenize};

    const MODEL: &str = r#"
id = "bm25"
hits = 10
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
"#;

    const PRIOR_MODEL: &str = r#"
id = "prior"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
[[features]]
id = "pagerank"
clique_set = "document"
potential = "document"
prior = "pagerank"
"#;

    fn index() -> crate::MemoryIndex {
        let mut builder = IndexBuilder::new();
        for (docno, text) in [
            ("FT-1", "information retrieval systems"),
            ("FT-2", "retrieval of information from text"),
            ("FT-3", "cooking recipes"),
        ] {
            builder.add_document(docno, &tokenize(text)).expect("add");
        }
        builder.build().expect("build")
    }

    fn env() -> Arc<RetrievalEnvironment> {
        Arc::new(RetrievalEnvironment::in_memory(index()))
    }

    #[test]
    fn batch_writes_trec_lines() {
        let runner =
            BatchQueryRunner::new(env(), vec![ModelSpec::from_toml_str(MODEL).expect("model")])
                .expect("runner");
        let queries = vec![QueryRecord::new("1", "information retrieval")];
        let mut out = Vec::new();
        let summary = runner
            .run(&queries, &mut out, OutputFormat::Trec, Some("test"))
            .expect("run");

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.results, 2);
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1 Q0 FT-1 1 "));
        assert!(lines[1].starts_with("1 Q0 FT-2 2 "));
        assert!(lines.iter().all(|l| l.ends_with(" test")));
    }

    #[test]
    fn missing_prior_rejected_before_ranking() {
        let model = ModelSpec::from_toml_str(PRIOR_MODEL).expect("model");
        let result = BatchQueryRunner::new(env(), vec![model.clone()]);
        assert!(matches!(&result, Err(MrfError::Configuration(msg)) if msg.contains("pagerank")));

        let mut with_prior = RetrievalEnvironment::in_memory(index());
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "FT-1 0.5\nFT-2 0.1").expect("write");
        with_prior.load_prior("pagerank", file.path()).expect("load");
        assert!(BatchQueryRunner::new(Arc::new(with_prior), vec![model]).is_ok());
    }

    #[test]
    fn unknown_importance_model_rejected_before_ranking() {
        let text = MODEL.replace("scoring_function = \"bm25\"", "scoring_function = \"bm25\"\nimportance = \"wsd\"");
        let model = ModelSpec::from_toml_str(&text).expect("model");
        assert!(matches!(
            BatchQueryRunner::new(env(), vec![model]),
            Err(MrfError::Configuration(_))
        ));
    }

    #[test]
    fn per_query_failures_are_recorded() {
        let runner =
            BatchQueryRunner::new(env(), vec![ModelSpec::from_toml_str(MODEL).expect("model")])
                .expect("runner")
                .with_options(RankingOptions {
                    hits: None,
                    deadline: Some(Duration::ZERO),
                });
        let queries = vec![QueryRecord::new("1", "retrieval"), QueryRecord::new("2", "cooking")];
        let summary = runner
            .run(&queries, &mut Vec::new(), OutputFormat::Internal, None)
            .expect("batch survives");
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed.len(), 2);
    }

    #[test]
    fn empty_inputs_are_configuration_errors() {
        assert!(BatchQueryRunner::new(env(), Vec::new()).is_err());
        let runner =
            BatchQueryRunner::new(env(), vec![ModelSpec::from_toml_str(MODEL).expect("model")])
                .expect("runner");
        assert!(runner.run(&[], &mut Vec::new(), OutputFormat::Trec, None).is_err());
    }

    #[test]
    fn expansion_reranks_with_feedback_terms() {
        let text = format!(
            "{}\n[expander]\nfb_docs = 1\nfb_terms = 2\nweight = 0.5\nscoring_function = \"bm25\"\n",
            MODEL
        );
        let model = ModelSpec::from_toml_str(&text).expect("model");
        let env = env();
        let ranked = rank_query(
            &env,
            &model,
            &env.tokenize("systems"),
            &RankingOptions::default(),
            None,
        )
        .expect("rank");
        // Feedback from FT-1 pulls in FT-2 through "information" / "retrieval".
        assert_eq!(ranked.results.len(), 2);
        assert_eq!(ranked.results[0].doc, crate::DocId(0));
        assert!(ranked.cost.is_none());
    }
}
