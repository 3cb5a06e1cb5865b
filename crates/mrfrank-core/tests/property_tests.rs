//! # Property-Based Tests
//!
//! Ranking invariants checked over random collections and queries.

use mrfrank_core::{
    Accumulator, ConceptBinType, ConceptBins, DocId, DocumentRanker, FeatureBasedMrfBuilder,
    IndexBuilder, IndexReader, ModelSpec, PostingsCursor, RankerConfig, RetrievalEnvironment,
    sort_ranked,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

const VOCABULARY: [&str; 8] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta",
];

const MODEL: &str = r#"
id = "sd"
[[features]]
id = "term"
weight = 0.8
clique_set = "term"
potential = "query"
scoring_function = "bm25"
[[features]]
id = "od"
weight = 0.1
clique_set = "ordered"
potential = "query"
scoring_function = "bm25"
[[features]]
id = "uw"
weight = 0.1
clique_set = "unordered"
potential = "query"
scoring_function = "bm25"
"#;

fn words(ids: &[usize]) -> Vec<String> {
    ids.iter().map(|&i| VOCABULARY[i].to_string()).collect()
}

fn environment(docs: &[Vec<usize>]) -> RetrievalEnvironment {
    let mut builder = IndexBuilder::new();
    for (i, doc) in docs.iter().enumerate() {
        builder.add_document(&format!("d{}", i), &words(doc)).expect("add");
    }
    RetrievalEnvironment::in_memory(builder.build().expect("build"))
}

fn rank(env: &RetrievalEnvironment, query: &[String], hits: usize) -> Vec<Accumulator> {
    let spec = ModelSpec::from_toml_str(MODEL).expect("model");
    let mut mrf = FeatureBasedMrfBuilder::new(&spec).build(env, query).expect("mrf");
    mrf.initialize(env).expect("init");
    DocumentRanker::new(RankerConfig::with_hits(hits))
        .rank(&mut mrf)
        .expect("rank")
}

fn collection() -> impl Strategy<Value = Vec<Vec<usize>>> {
    vec(vec(0usize..VOCABULARY.len(), 1..12), 1..20)
}

fn query() -> impl Strategy<Value = Vec<usize>> {
    vec(0usize..VOCABULARY.len(), 1..4)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Same collection and query give bit-identical rankings.
    #[test]
    fn ranking_is_deterministic(docs in collection(), q in query()) {
        let env = environment(&docs);
        let query = words(&q);
        let first = rank(&env, &query, 1000);
        let second = rank(&env, &query, 1000);
        prop_assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a.doc, b.doc);
            prop_assert_eq!(a.score.to_bits(), b.score.to_bits());
        }
    }

    /// Top-k with early abandonment equals the prefix of the full ranking.
    #[test]
    fn top_k_is_prefix_of_full_ranking(docs in collection(), q in query(), k in 1usize..6) {
        let env = environment(&docs);
        let query = words(&q);
        let full = rank(&env, &query, 1000);
        let top = rank(&env, &query, k);
        prop_assert_eq!(top.len(), full.len().min(k));
        for (got, want) in top.iter().zip(&full) {
            prop_assert_eq!(got.doc, want.doc);
            prop_assert_eq!(got.score.to_bits(), want.score.to_bits());
        }
    }

    /// Results are ordered by score, then by ascending doc id.
    #[test]
    fn results_are_sorted(docs in collection(), q in query()) {
        let env = environment(&docs);
        let ranked = rank(&env, &words(&q), 1000);
        let mut sorted = ranked.clone();
        sort_ranked(&mut sorted);
        prop_assert_eq!(ranked, sorted);
    }

    /// A postings cursor only moves forward and lands on the first doc at
    /// or after its target.
    #[test]
    fn cursor_skip_is_monotone(docs in collection(), term in 0usize..VOCABULARY.len(), targets in vec(0u32..25, 1..10)) {
        let env = environment(&docs);
        let Some(list) = env.reader().postings(VOCABULARY[term]).expect("postings") else {
            return Ok(());
        };
        let docs_with_term: Vec<DocId> = list.iter().map(|p| p.doc).collect();
        let mut cursor = PostingsCursor::new(Arc::clone(&list));
        let mut previous = cursor.doc();
        for target in targets {
            cursor.skip_to(DocId(target));
            let current = cursor.doc();
            prop_assert!(current >= previous);
            let expected = docs_with_term
                .iter()
                .copied()
                .find(|&d| d >= DocId(target).max(previous))
                .unwrap_or(DocId::END);
            prop_assert_eq!(current, expected);
            previous = current;
        }
    }

    /// Impact bins tile the importance order without gaps or overlap.
    #[test]
    fn impact_bins_cover_all_concepts(total in 1usize..200, bins in 1usize..8) {
        let mut next = 0usize;
        for which in 0..bins {
            let range = ConceptBins { bin_type: ConceptBinType::Impact, size: bins, which }.range(total);
            prop_assert_eq!(range.start, next);
            prop_assert!(range.end >= range.start);
            next = range.end;
        }
        prop_assert_eq!(next, total);
    }

    /// Default bins select disjoint slices of at most `size` concepts.
    #[test]
    fn default_bins_are_disjoint(importances in vec(0.0f32..1.0, 0..30), size in 1usize..6) {
        let mut seen = Vec::new();
        for which in 0..(importances.len() / size + 1) {
            let bins = ConceptBins { bin_type: ConceptBinType::Default, size, which };
            let selected = bins.select(&importances);
            prop_assert!(selected.len() <= size);
            for index in selected {
                prop_assert!(!seen.contains(&index));
                seen.push(index);
            }
        }
        prop_assert_eq!(seen.len(), importances.len());
    }
}
