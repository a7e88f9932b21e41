//! Append-only prediction history with paginated retrieval
//!
//! The store exclusively owns the [`Prediction`] lifecycle: ids are assigned
//! from an atomic sequence inside the append critical section, entries are
//! never updated or removed, and ground-truth outcomes are attached to
//! existing entries for metric computation. Queries are 1-indexed and
//! ordered newest-first with a stable prediction-id tie-break.

pub mod metrics;

pub use metrics::{
    ClassMetrics, ConfusionMatrix, EvaluatedMetrics, MetricsSnapshot, MetricsWindow,
};

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ServingError, ServingResult};
use crate::schema::Record;

/// Predicted adherence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "Good Subject")]
    Positive,
    #[serde(rename = "Bad Subject")]
    Negative,
}

impl ClassLabel {
    /// Domain display name used across the API.
    pub fn display_name(&self) -> &'static str {
        match self {
            ClassLabel::Positive => "Good Subject",
            ClassLabel::Negative => "Bad Subject",
        }
    }

    /// Long-form outcome description.
    pub fn description(&self) -> &'static str {
        match self {
            ClassLabel::Positive => "Completed treatment",
            ClassLabel::Negative => "Did not complete treatment",
        }
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        match name {
            "Good Subject" => Some(ClassLabel::Positive),
            "Bad Subject" => Some(ClassLabel::Negative),
            _ => None,
        }
    }
}

/// Coarse certainty bucket derived from distance to the decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
        }
    }
}

/// One recorded prediction. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_snapshot: Record,
    pub model_id: String,
    pub class_label: ClassLabel,
    pub probability: f64,
    pub confidence_band: ConfidenceBand,
    /// Caller-supplied record key (MASK_ID), echoed for batch reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_id: Option<Value>,
}

/// Everything the engine knows about a prediction before the store assigns
/// its id.
#[derive(Debug, Clone)]
pub struct PredictionDraft {
    pub timestamp: DateTime<Utc>,
    pub input_snapshot: Record,
    pub model_id: String,
    pub class_label: ClassLabel,
    pub probability: f64,
    pub confidence_band: ConfidenceBand,
    pub mask_id: Option<Value>,
}

/// Filters applied to history queries. All optional; empty means everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub class_label: Option<ClassLabel>,
    pub model_id: Option<String>,
    pub min_probability: Option<f64>,
    pub max_probability: Option<f64>,
}

impl HistoryFilter {
    fn matches(&self, entry: &Prediction) -> bool {
        if let Some(label) = self.class_label {
            if entry.class_label != label {
                return false;
            }
        }
        if let Some(model_id) = &self.model_id {
            if &entry.model_id != model_id {
                return false;
            }
        }
        if let Some(min) = self.min_probability {
            if entry.probability < min {
                return false;
            }
        }
        if let Some(max) = self.max_probability {
            if entry.probability > max {
                return false;
            }
        }
        true
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Prediction>,
    /// Full filtered set size, independent of page/page_size.
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

struct Entry {
    prediction: Prediction,
    actual: Option<ClassLabel>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    seq: u64,
}

pub struct HistoryStore {
    inner: RwLock<Inner>,
    max_page_size: usize,
}

impl HistoryStore {
    pub fn new(max_page_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_page_size: max_page_size.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append a prediction, assigning its monotonic-sortable id. The whole
    /// operation happens inside one write section, so ids are dense and
    /// ordered even under concurrent batch predictions.
    pub fn append(&self, draft: PredictionDraft) -> Prediction {
        let mut inner = self.write();
        inner.seq += 1;
        let prediction = Prediction {
            prediction_id: format!("pred-{:08}", inner.seq),
            timestamp: draft.timestamp,
            input_snapshot: draft.input_snapshot,
            model_id: draft.model_id,
            class_label: draft.class_label,
            probability: draft.probability,
            confidence_band: draft.confidence_band,
            mask_id: draft.mask_id,
        };
        inner.entries.push(Entry {
            prediction: prediction.clone(),
            actual: None,
        });
        debug!(prediction_id = %prediction.prediction_id, "appended prediction");
        prediction
    }

    /// Attach the observed ground-truth label to a recorded prediction.
    pub fn record_outcome(&self, prediction_id: &str, actual: ClassLabel) -> ServingResult<()> {
        let mut inner = self.write();
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.prediction.prediction_id == prediction_id)
            .ok_or_else(|| ServingError::UnknownPrediction {
                prediction_id: prediction_id.to_string(),
            })?;
        entry.actual = Some(actual);
        Ok(())
    }

    /// Paginated, filtered retrieval. `page` is 1-indexed (0 is treated as
    /// 1); `page_size` is clamped to the configured maximum.
    pub fn query(&self, page: usize, page_size: usize, filter: &HistoryFilter) -> HistoryPage {
        let page = page.max(1);
        let page_size = page_size.clamp(1, self.max_page_size);

        let inner = self.read();
        let mut matched: Vec<&Prediction> = inner
            .entries
            .iter()
            .map(|e| &e.prediction)
            .filter(|p| filter.matches(p))
            .collect();
        // Newest first; ids are monotonic so they break timestamp ties
        // deterministically.
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.prediction_id.cmp(&a.prediction_id))
        });

        let total_count = matched.len();
        let start = (page - 1).saturating_mul(page_size);
        let items = matched
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        HistoryPage {
            items,
            total_count,
            page,
            page_size,
        }
    }

    pub fn get(&self, prediction_id: &str) -> ServingResult<Prediction> {
        self.read()
            .entries
            .iter()
            .find(|e| e.prediction.prediction_id == prediction_id)
            .map(|e| e.prediction.clone())
            .ok_or_else(|| ServingError::UnknownPrediction {
                prediction_id: prediction_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate metrics over the requested window, compared against
    /// recorded ground truth. Windows without any ground truth report the
    /// metrics as unavailable rather than fabricating values.
    pub fn snapshot_metrics(&self, window: &MetricsWindow) -> MetricsSnapshot {
        let inner = self.read();
        let scan: Vec<&Entry> = inner
            .entries
            .iter()
            .rev()
            .filter(|e| match &window.model_id {
                Some(id) => &e.prediction.model_id == id,
                None => true,
            })
            .take(window.last_n.unwrap_or(usize::MAX))
            .collect();

        let samples: Vec<metrics::Sample> = scan
            .iter()
            .filter_map(|e| {
                e.actual.map(|actual| metrics::Sample {
                    probability: e.prediction.probability,
                    predicted: e.prediction.class_label,
                    actual,
                })
            })
            .collect();

        metrics::compute_snapshot(scan.len(), &samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn draft(probability: f64, label: ClassLabel) -> PredictionDraft {
        PredictionDraft {
            timestamp: Utc::now(),
            input_snapshot: Map::new(),
            model_id: "model_v1".to_string(),
            class_label: label,
            probability,
            confidence_band: ConfidenceBand::Medium,
            mask_id: None,
        }
    }

    #[test]
    fn test_ids_are_monotonic_sortable() {
        let store = HistoryStore::new(200);
        let a = store.append(draft(0.7, ClassLabel::Positive));
        let b = store.append(draft(0.3, ClassLabel::Negative));
        assert!(a.prediction_id < b.prediction_id);
        assert_eq!(a.prediction_id, "pred-00000001");
    }

    #[test]
    fn test_empty_store_query() {
        let store = HistoryStore::new(200);
        let page = store.query(1, 10, &HistoryFilter::default());
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn test_query_newest_first_with_total_count() {
        let store = HistoryStore::new(200);
        for i in 0..25 {
            let p = 0.5 + (i as f64) * 0.01;
            store.append(draft(p, ClassLabel::Positive));
        }
        let page = store.query(1, 10, &HistoryFilter::default());
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total_count, 25);
        assert_eq!(page.items[0].prediction_id, "pred-00000025");

        let page3 = store.query(3, 10, &HistoryFilter::default());
        assert_eq!(page3.items.len(), 5);
        assert_eq!(page3.total_count, 25);

        let beyond = store.query(9, 10, &HistoryFilter::default());
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 25);
    }

    #[test]
    fn test_identical_timestamps_tie_broken_by_id() {
        let store = HistoryStore::new(200);
        let ts = Utc::now();
        for _ in 0..3 {
            let mut d = draft(0.6, ClassLabel::Positive);
            d.timestamp = ts;
            store.append(d);
        }
        let page = store.query(1, 10, &HistoryFilter::default());
        let ids: Vec<&str> = page.items.iter().map(|p| p.prediction_id.as_str()).collect();
        assert_eq!(ids, vec!["pred-00000003", "pred-00000002", "pred-00000001"]);
    }

    #[test]
    fn test_pagination_stable_without_writes() {
        let store = HistoryStore::new(200);
        for _ in 0..12 {
            store.append(draft(0.8, ClassLabel::Positive));
        }
        let filter = HistoryFilter {
            class_label: Some(ClassLabel::Positive),
            ..Default::default()
        };
        let first = store.query(2, 5, &filter);
        let second = store.query(2, 5, &filter);
        assert_eq!(first.total_count, second.total_count);
        let a: Vec<&str> = first.items.iter().map(|p| p.prediction_id.as_str()).collect();
        let b: Vec<&str> = second.items.iter().map(|p| p.prediction_id.as_str()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_filters_restrict_total_count() {
        let store = HistoryStore::new(200);
        store.append(draft(0.9, ClassLabel::Positive));
        store.append(draft(0.2, ClassLabel::Negative));
        store.append(draft(0.7, ClassLabel::Positive));

        let filter = HistoryFilter {
            class_label: Some(ClassLabel::Negative),
            ..Default::default()
        };
        let page = store.query(1, 10, &filter);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].probability, 0.2);

        let filter = HistoryFilter {
            min_probability: Some(0.6),
            ..Default::default()
        };
        assert_eq!(store.query(1, 10, &filter).total_count, 2);
    }

    #[test]
    fn test_page_size_clamped_to_maximum() {
        let store = HistoryStore::new(3);
        for _ in 0..10 {
            store.append(draft(0.6, ClassLabel::Positive));
        }
        let page = store.query(1, 500, &HistoryFilter::default());
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.page_size, 3);
    }

    #[test]
    fn test_record_outcome_unknown_id() {
        let store = HistoryStore::new(200);
        let err = store
            .record_outcome("pred-99999999", ClassLabel::Positive)
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_prediction");
    }
}
