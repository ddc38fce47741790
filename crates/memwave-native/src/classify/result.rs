//! Persisted per-subject classifier output

use memwave_core::types::TaskPhase;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::cross_val::CvType;

/// Everything a classification run reports for one subject.
///
/// Held-out arrays (`probs`, `classes`, `sessions`, `fold_keys`,
/// `task_phase`) are aligned and list test events in event order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    /// Subject id
    pub subj: String,
    /// Bias-corrected (LOSO) or pooled (LOLO) AUC
    pub auc: f64,
    /// Final-model weights, one per feature
    pub coefficients: Vec<f64>,
    /// Final-model intercept
    pub intercept: f64,
    /// Held-out probability of recall
    pub probs: Vec<f64>,
    /// Held-out true labels
    pub classes: Vec<bool>,
    /// Hold-out scheme
    pub cv_type: CvType,
    /// Session of each held-out event
    pub sessions: Vec<u32>,
    /// Fold key of each held-out event
    pub fold_keys: Vec<i64>,
    /// Phase of each held-out event
    pub task_phase: Vec<TaskPhase>,
    /// Selected inverse regularization strength
    pub c: f64,
    /// Fold × candidate AUCs (LOSO only)
    #[serde(default)]
    pub fold_aucs: Option<Vec<Vec<f64>>>,
    /// Percent change in recall rate per probability tercile
    #[serde(default)]
    pub terciles: Option<[f64; 3]>,
    /// Forward model, electrode × frequency
    #[serde(default)]
    pub forward_model: Option<Vec<Vec<f64>>>,
    /// Univariate t-statistics, electrode × frequency
    pub univar_ts: Vec<Vec<f64>>,
    /// Univariate p-values, electrode × frequency
    pub univar_ps: Vec<Vec<f64>>,
    /// Permutation p-value of `auc`
    #[serde(default)]
    pub p_val: Option<f64>,
    /// Number of events the result was computed from
    pub n_events: usize,
    /// Events in the feature set supplied, before phase, reaction-time,
    /// and session filtering
    #[serde(default)]
    pub source_events: usize,
}

impl ClassifierResult {
    /// Copy of this result carrying a permutation p-value
    #[must_use]
    pub fn with_p_value(self, p_val: f64) -> Self {
        Self {
            p_val: Some(p_val),
            ..self
        }
    }

    /// Whether a stored result was computed from a feature set of
    /// `source_events` events
    #[must_use]
    pub fn is_fresh_for(&self, source_events: usize) -> bool {
        self.source_events == source_events
    }
}

/// Nested rows of a matrix, for readable JSON
#[must_use]
pub fn to_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|r| r.to_vec()).collect()
}
