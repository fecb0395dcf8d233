//! Property tests for per-topic retrieval bounds and ordering.

use std::sync::Arc;

use derma_rag::document::Chunk;
use derma_rag::testing::LookupEmbedder;
use derma_rag::{RetrievalConfig, Retriever, SimilarityMetric, TopicIndex};
use proptest::prelude::*;

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate an index of one topic with 1..20 embedded chunks.
fn arb_index() -> impl Strategy<Value = TopicIndex> {
    proptest::collection::vec(("[a-z ]{5,30}", arb_normalized_embedding(DIM)), 1..20).prop_map(
        |pieces| {
            let chunks = pieces
                .into_iter()
                .enumerate()
                .map(|(ordinal, (text, embedding))| {
                    let mut chunk = Chunk::new("eczema", ordinal, text);
                    chunk.embedding = embedding;
                    chunk
                })
                .collect();
            TopicIndex::from_chunks("eczema", chunks).unwrap()
        },
    )
}

fn arb_metric() -> impl Strategy<Value = SimilarityMetric> {
    prop_oneof![
        Just(SimilarityMetric::Cosine),
        Just(SimilarityMetric::DotProduct),
        Just(SimilarityMetric::NegativeEuclidean),
    ]
}

/// *For any* topic index and query, retrieval SHALL return at most `k`
/// fragments, never more than the index holds, ordered by descending score,
/// and identically on repeated calls.
mod prop_retrieval_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_bounded_ordered_and_deterministic(
            index in arb_index(),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
            metric in arb_metric(),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second) = rt.block_on(async {
                let config = RetrievalConfig::builder().top_k(top_k).metric(metric).build().unwrap();
                let retriever = Retriever::new(Arc::new(LookupEmbedder::new(query.clone())), config);
                let first = retriever.retrieve(&index, "query").await.unwrap();
                let second = retriever.retrieve(&index, "query").await.unwrap();
                (first, second)
            });

            prop_assert!(first.len() <= top_k);
            prop_assert!(first.len() <= index.len());
            prop_assert_eq!(first.len(), top_k.min(index.len()));

            for window in first.hits().windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            prop_assert_eq!(first, second);
        }
    }
}
