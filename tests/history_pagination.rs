//! History store pagination and filtering behavior over recorded
//! predictions, including concurrent appends.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use serde_json::Map;

use adherence_serving::history::{HistoryFilter, HistoryStore, PredictionDraft};
use adherence_serving::{ClassLabel, ConfidenceBand};

fn draft(probability: f64, model_id: &str) -> PredictionDraft {
    PredictionDraft {
        timestamp: Utc::now(),
        input_snapshot: Map::new(),
        model_id: model_id.to_string(),
        class_label: if probability >= 0.5 {
            ClassLabel::Positive
        } else {
            ClassLabel::Negative
        },
        probability,
        confidence_band: ConfidenceBand::Medium,
        mask_id: None,
    }
}

#[test]
fn empty_store_returns_empty_first_page() {
    let store = HistoryStore::new(200);
    let page = store.query(1, 10, &HistoryFilter::default());
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 0);
}

#[test]
fn total_count_is_independent_of_page() {
    let store = HistoryStore::new(200);
    for i in 0..37 {
        store.append(draft(0.5 + (i % 5) as f64 * 0.05, "model_v1"));
    }
    for page_no in 1..=4 {
        let page = store.query(page_no, 10, &HistoryFilter::default());
        assert_eq!(page.total_count, 37);
    }
    assert_eq!(store.query(4, 10, &HistoryFilter::default()).items.len(), 7);
}

#[test]
fn pages_are_stable_and_non_overlapping() {
    let store = HistoryStore::new(200);
    for _ in 0..30 {
        store.append(draft(0.7, "model_v1"));
    }
    let filter = HistoryFilter::default();
    let mut seen = Vec::new();
    for page_no in 1..=3 {
        let first = store.query(page_no, 10, &filter);
        let again = store.query(page_no, 10, &filter);
        let ids: Vec<String> = first
            .items
            .iter()
            .map(|p| p.prediction_id.clone())
            .collect();
        let ids_again: Vec<String> = again
            .items
            .iter()
            .map(|p| p.prediction_id.clone())
            .collect();
        assert_eq!(ids, ids_again, "re-query must return identical pages");
        seen.extend(ids);
    }
    let unique: std::collections::HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), 30, "pages must not overlap");
}

#[test]
fn newest_first_ordering() {
    let store = HistoryStore::new(200);
    for _ in 0..5 {
        store.append(draft(0.6, "model_v1"));
    }
    let page = store.query(1, 5, &HistoryFilter::default());
    let mut ids: Vec<String> = page.items.iter().map(|p| p.prediction_id.clone()).collect();
    let mut sorted = ids.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);
    ids.reverse();
    assert_eq!(ids[0], "pred-00000001");
}

#[test]
fn model_filter_restricts_results() {
    let store = HistoryStore::new(200);
    for i in 0..10 {
        let model = if i % 2 == 0 { "model_v1" } else { "model_v2" };
        store.append(draft(0.8, model));
    }
    let filter = HistoryFilter {
        model_id: Some("model_v2".to_string()),
        ..Default::default()
    };
    let page = store.query(1, 50, &filter);
    assert_eq!(page.total_count, 5);
    assert!(page.items.iter().all(|p| p.model_id == "model_v2"));
}

#[test]
fn concurrent_appends_assign_unique_dense_ids() {
    let store = Arc::new(HistoryStore::new(200));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..25 {
                    store.append(draft(0.6, "model_v1"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 100);
    let page = store.query(1, 200, &HistoryFilter::default());
    assert_eq!(page.total_count, 100);
    let mut ids: Vec<String> = page.items.iter().map(|p| p.prediction_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100, "ids must be unique");
    assert_eq!(ids.first().map(String::as_str), Some("pred-00000001"));
    assert_eq!(ids.last().map(String::as_str), Some("pred-00000100"));
}
