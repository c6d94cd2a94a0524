use std::sync::Arc;

use super::*;
use crate::database::RecordMetadata;
use crate::index::collection_name_for;
use crate::testing::{FixedDistanceBackend, KeywordEmbedder, MemoryBackend};

fn scored(page: u32, score: f32) -> SearchMatch {
    SearchMatch {
        text: format!("Текст страницы {}", page),
        metadata: RecordMetadata {
            source: "Lada_Vesta.pdf".to_string(),
            page,
            chunk_id: format!("{:08x}", page),
        },
        score,
    }
}

fn pages(retrieval: &Retrieval) -> Vec<u32> {
    match retrieval {
        Retrieval::Matches(matches) => matches.iter().map(|m| m.metadata.page).collect(),
        other => panic!("expected matches, got {:?}", other),
    }
}

#[test]
fn high_relevance_matches_are_kept_together() {
    let retrieval = gate(vec![scored(1, 0.9), scored(2, 0.75), scored(3, 0.4)]);
    assert_eq!(pages(&retrieval), vec![1, 2]);
}

#[test]
fn best_medium_match_is_used_alone() {
    let retrieval = gate(vec![scored(4, 0.6), scored(5, 0.55)]);
    assert_eq!(pages(&retrieval), vec![4]);
}

#[test]
fn medium_fallback_picks_best_even_when_unsorted() {
    let retrieval = gate(vec![scored(4, 0.52), scored(5, 0.68), scored(6, 0.6)]);
    assert_eq!(pages(&retrieval), vec![5]);
}

#[test]
fn low_scores_are_not_precise_enough() {
    let retrieval = gate(vec![scored(1, 0.3), scored(2, 0.2)]);
    assert_eq!(retrieval, Retrieval::NotPrecise);
}

#[test]
fn no_matches_means_no_information() {
    let retrieval = gate(Vec::new());
    assert_eq!(retrieval, Retrieval::NoInformation);
}

#[test]
fn thresholds_are_inclusive() {
    assert_eq!(pages(&gate(vec![scored(1, 0.7), scored(2, 0.69)])), vec![1]);
    assert_eq!(pages(&gate(vec![scored(3, 0.5)])), vec![3]);
}

#[test]
fn at_most_five_blocks_are_kept() {
    let matches = (1..=8).map(|page| scored(page, 0.95 - page as f32 * 0.01)).collect();
    let retrieval = gate(matches);

    assert_eq!(pages(&retrieval), vec![1, 2, 3, 4, 5]);
}

#[test]
fn context_block_layout() {
    let block = format_context(&[scored(2, 0.876), scored(7, 0.7)]);
    let rule = "-".repeat(50);

    let expected = format!(
        "ИНФОРМАЦИЯ ИЗ РУКОВОДСТВА ПО ЭКСПЛУАТАЦИИ:\n\n\
         БЛОК 1:\nСтраница: 2\nРелевантность: 0.88\nТекст: Текст страницы 2\n{rule}\n\
         БЛОК 2:\nСтраница: 7\nРелевантность: 0.70\nТекст: Текст страницы 7\n{rule}\n\
         \nВАЖНО: Используй ТОЛЬКО эту информацию для ответа."
    );
    assert_eq!(block, expected);
}

#[test]
fn empty_context_renders_sentinel() {
    assert_eq!(format_context(&[]), NO_RELEVANT_INFORMATION);
}

#[test]
fn formatting_is_idempotent() {
    let matches = vec![scored(1, 0.91), scored(3, 0.8)];
    assert_eq!(format_context(&matches), format_context(&matches));
}

#[tokio::test]
async fn retrieve_gates_index_results() {
    let store = IndexStore::new(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(FixedDistanceBackend::with_scores(&[0.9, 0.75, 0.4])),
    );
    let index = DocumentIndex {
        collection_name: "pdf_fixed".to_string(),
        source_id: "Lada_Vesta.pdf".to_string(),
        record_count: 3,
    };

    let retrieval = retrieve(&store, &index, "масло", DEFAULT_TOP_N)
        .await
        .expect("retrieve should succeed");
    assert_eq!(pages(&retrieval), vec![1, 2]);
}

#[tokio::test]
async fn retrieve_on_unbuilt_index_finds_nothing() {
    let store = IndexStore::new(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(MemoryBackend::default()),
    );
    let index = DocumentIndex {
        collection_name: collection_name_for("Lada_Vesta.pdf"),
        source_id: "Lada_Vesta.pdf".to_string(),
        record_count: 0,
    };

    let retrieval = retrieve(&store, &index, "когда менять масло", DEFAULT_TOP_N)
        .await
        .expect("retrieve should succeed");
    assert_eq!(retrieval, Retrieval::NoInformation);
}
