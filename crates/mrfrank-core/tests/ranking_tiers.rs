//! # Ranking Tier Tests (T0-T3)
//!
//! If ANY tier fails, the ranking engine is INVALID.
//!
//! ## Tiers
//! - T0: Model Loading
//! - T1: Hand-Computed Scores
//! - T2: Cascade Equivalence
//! - T3: Index Persistence

use mrfrank_core::{
    Accumulator, CascadeRanker, DocId, DocumentRanker, FeatureBasedMrfBuilder, IndexBuilder,
    MarkovRandomField, MemoryIndex, ModelKind, ModelSpec, MrfError, RankerConfig,
    RetrievalEnvironment, tokenize,
};

// =============================================================================
// FIXTURES
// =============================================================================

/// Three documents of lengths 10, 5 and 8.
fn collection() -> MemoryIndex {
    let docs = [
        (
            "D0",
            "information retrieval is the study of finding relevant documents quickly",
        ),
        ("D1", "information retrieval information retrieval systems"),
        ("D2", "cooking recipes for information lovers and their friends"),
    ];
    let mut builder = IndexBuilder::new();
    for (docno, text) in docs {
        builder.add_document(docno, &tokenize(text)).expect("add");
    }
    builder.build().expect("build")
}

const TERM_MODEL: &str = r#"
id = "bm25"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
"#;

const SD_MODEL: &str = r#"
id = "sd"
[[features]]
id = "term"
weight = 0.85
clique_set = "term"
potential = "query"
scoring_function = "dirichlet"
params = { mu = 100.0 }
[[features]]
id = "od"
weight = 0.1
clique_set = "ordered"
potential = "query"
scoring_function = "dirichlet"
params = { mu = 100.0 }
[[features]]
id = "uw"
weight = 0.05
clique_set = "unordered"
potential = "query"
scoring_function = "dirichlet"
params = { mu = 100.0 }
"#;

fn build(env: &RetrievalEnvironment, spec: &ModelSpec, query: &str) -> MarkovRandomField {
    let mut mrf = FeatureBasedMrfBuilder::new(spec)
        .build(env, &env.tokenize(query))
        .expect("mrf");
    mrf.initialize(env).expect("init");
    mrf
}

fn rank(env: &RetrievalEnvironment, spec: &ModelSpec, query: &str) -> Vec<Accumulator> {
    DocumentRanker::new(RankerConfig::with_hits(10))
        .rank(&mut build(env, spec, query))
        .expect("rank")
}

fn bm25(tf: f32, dl: f32, avgdl: f32, n: f32, df: f32) -> f32 {
    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
    idf * tf * 2.2 / (tf + 1.2 * (0.25 + 0.75 * dl / avgdl))
}

// =============================================================================
// TIER T0: MODEL LOADING
// =============================================================================

mod t0_model_loading {
    use super::*;

    /// T0.1: A term model loads with defaults.
    #[test]
    fn term_model_loads() {
        let spec = ModelSpec::from_toml_str(TERM_MODEL).expect("model");
        assert_eq!(spec.kind, ModelKind::Feature);
        assert_eq!(spec.features.len(), 1);
        assert!((spec.features[0].weight - 1.0).abs() < f32::EPSILON);
    }

    /// T0.2: A feature without a potential is rejected at load time.
    #[test]
    fn missing_potential_rejected() {
        let text = r#"
id = "m"
[[features]]
id = "term"
clique_set = "term"
scoring_function = "bm25"
"#;
        let err = ModelSpec::from_toml_str(text);
        assert!(matches!(&err, Err(MrfError::Configuration(msg)) if msg.contains("potential")));
    }

    /// T0.3: Unknown scoring functions are rejected at load time.
    #[test]
    fn unknown_scoring_function_rejected() {
        let text = r#"
id = "m"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "tfidf-ish"
"#;
        assert!(matches!(
            ModelSpec::from_toml_str(text),
            Err(MrfError::Configuration(_))
        ));
    }

    /// T0.4: JSON and TOML spellings describe the same model.
    #[test]
    fn json_and_toml_agree() {
        let json = r#"{
            "id": "bm25",
            "features": [
                {"id": "term", "clique_set": "term", "potential": "query", "scoring_function": "bm25"}
            ]
        }"#;
        assert_eq!(
            ModelSpec::from_json_str(json).expect("json"),
            ModelSpec::from_toml_str(TERM_MODEL).expect("toml")
        );
    }
}

// =============================================================================
// TIER T1: HAND-COMPUTED SCORES
// =============================================================================

mod t1_hand_computed {
    use super::*;

    /// T1.1: BM25 term-clique scores match the closed form.
    #[test]
    fn bm25_scores_match_closed_form() {
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(TERM_MODEL).expect("model");
        let ranked = rank(&env, &spec, "information retrieval");

        let avgdl = 23.0 / 3.0;
        let d0 = bm25(1.0, 10.0, avgdl, 3.0, 3.0) + bm25(1.0, 10.0, avgdl, 3.0, 2.0);
        let d1 = bm25(2.0, 5.0, avgdl, 3.0, 3.0) + bm25(2.0, 5.0, avgdl, 3.0, 2.0);
        let d2 = bm25(1.0, 8.0, avgdl, 3.0, 3.0);

        let docs: Vec<DocId> = ranked.iter().map(|a| a.doc).collect();
        assert_eq!(docs, vec![DocId(1), DocId(0), DocId(2)]);
        for (acc, want) in ranked.iter().zip([d1, d0, d2]) {
            assert!((acc.score - want).abs() < 1e-5, "{} vs {}", acc.score, want);
        }
    }

    /// T1.2: Query terms absent from the index contribute nothing.
    #[test]
    fn unknown_terms_are_ignored() {
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(TERM_MODEL).expect("model");
        let with = rank(&env, &spec, "information retrieval zyzzyva");
        let without = rank(&env, &spec, "information retrieval");
        assert_eq!(with, without);
    }

    /// T1.3: A sequential dependence model prefers the adjacent phrase.
    #[test]
    fn dependence_model_prefers_phrase() {
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(SD_MODEL).expect("model");
        let ranked = rank(&env, &spec, "information retrieval");
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].doc, DocId(1));
        assert_eq!(ranked[2].doc, DocId(2));
    }

    /// T1.4: Ranking is deterministic across runs.
    #[test]
    fn ranking_is_deterministic() {
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(SD_MODEL).expect("model");
        let first = rank(&env, &spec, "information retrieval systems");
        for _ in 0..5 {
            let again = rank(&env, &spec, "information retrieval systems");
            assert_eq!(first.len(), again.len());
            for (a, b) in first.iter().zip(&again) {
                assert_eq!(a.doc, b.doc);
                assert_eq!(a.score.to_bits(), b.score.to_bits());
            }
        }
    }
}

// =============================================================================
// TIER T2: CASCADE EQUIVALENCE
// =============================================================================

mod t2_cascade {
    use super::*;

    /// T2.1: A single-stage cascade without pruners equals the plain ranker.
    #[test]
    fn single_stage_cascade_matches_plain_ranking() {
        let env = RetrievalEnvironment::in_memory(collection());
        let plain = ModelSpec::from_toml_str(SD_MODEL).expect("model");
        let mut cascade = plain.clone();
        cascade.kind = ModelKind::GreedyConstrained;

        let expected = rank(&env, &plain, "information retrieval");
        let outcome = CascadeRanker::new(RankerConfig::with_hits(10))
            .rank(&mut build(&env, &cascade, "information retrieval"), None)
            .expect("cascade");
        assert_eq!(outcome.results, expected);
        assert_eq!(outcome.stages.len(), 1);
    }

    /// T2.2: A rank pruner bounds what later stages see.
    #[test]
    fn rank_pruner_limits_second_stage() {
        let text = r#"
id = "cascade"
kind = "greedy_constrained"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
cascade_stage = 0
prune = "rank 2"
[[features]]
id = "od"
clique_set = "ordered"
potential = "query"
scoring_function = "bm25"
cascade_stage = 1
"#;
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let outcome = CascadeRanker::new(RankerConfig::with_hits(10))
            .rank(&mut build(&env, &spec, "information retrieval"), None)
            .expect("cascade");

        assert_eq!(outcome.stages.len(), 2);
        assert_eq!(outcome.stages[0].survivors, 2);
        assert_eq!(outcome.stages[1].documents, 2);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|a| a.doc != DocId(2)));
        assert!(outcome.cost > 0.0);
    }

    /// T2.3: A seed replaces the first stage.
    #[test]
    fn seed_skips_first_stage() {
        let text = r#"
id = "cascade"
kind = "greedy_constrained"
[[features]]
id = "term"
clique_set = "term"
potential = "query"
scoring_function = "bm25"
cascade_stage = 0
[[features]]
id = "od"
clique_set = "ordered"
potential = "query"
scoring_function = "bm25"
cascade_stage = 1
"#;
        let env = RetrievalEnvironment::in_memory(collection());
        let spec = ModelSpec::from_toml_str(text).expect("model");
        let seed = vec![Accumulator::new(DocId(2), 5.0)];
        let outcome = CascadeRanker::new(RankerConfig::with_hits(10))
            .rank(&mut build(&env, &spec, "information retrieval"), Some(&seed))
            .expect("cascade");

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].doc, DocId(2));
        // D2 has no "information retrieval" phrase; the seed score is kept.
        assert!((outcome.results[0].score - 5.0).abs() < 1e-6);
        assert!((outcome.stages[0].cost).abs() < f64::EPSILON);
    }
}

// =============================================================================
// TIER T3: INDEX PERSISTENCE
// =============================================================================

mod t3_persistence {
    use super::*;
    use mrfrank_core::{RedbIndex, save_index};

    /// T3.1: A saved index file ranks identically to the in-memory index.
    #[test]
    fn file_index_ranks_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collection.mrfx");
        save_index(&collection(), &path).expect("save");

        let spec = ModelSpec::from_toml_str(SD_MODEL).expect("model");
        let memory = RetrievalEnvironment::in_memory(collection());
        let file = RetrievalEnvironment::open_file(&path).expect("open");
        assert_eq!(
            rank(&memory, &spec, "information retrieval"),
            rank(&file, &spec, "information retrieval")
        );
    }

    /// T3.2: A redb index ranks identically to the in-memory index.
    #[test]
    fn redb_index_ranks_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collection.redb");
        RedbIndex::create(&path, &collection()).expect("create");

        let spec = ModelSpec::from_toml_str(SD_MODEL).expect("model");
        let memory = RetrievalEnvironment::in_memory(collection());
        let redb = RetrievalEnvironment::open_redb(&path).expect("open");
        assert_eq!(redb.backend().kind(), "redb");
        assert_eq!(redb.docno(DocId(1)).as_deref(), Some("D1"));
        assert_eq!(
            rank(&memory, &spec, "information retrieval"),
            rank(&redb, &spec, "information retrieval")
        );
    }

    /// T3.3: A corrupted index file is rejected.
    #[test]
    fn corrupted_file_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.mrfx");
        std::fs::write(&path, b"NOPE\x01garbage").expect("write");
        assert!(RetrievalEnvironment::open_file(&path).is_err());
    }
}
