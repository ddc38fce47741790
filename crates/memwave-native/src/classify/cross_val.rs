//! Cross-validation planning
//!
//! Subjects with more than one session are held out session by session
//! (LOSO); single-session subjects are held out list by list (LOLO).

use std::collections::BTreeSet;

use memwave_core::error::{DataError, DataResult};
use memwave_core::types::{EventTable, TaskPhase};
use serde::{Deserialize, Serialize};

/// Hold-out scheme
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CvType {
    /// Leave one session out
    #[serde(rename = "loso")]
    Loso,
    /// Leave one list out
    #[serde(rename = "lolo")]
    Lolo,
}

impl CvType {
    /// Short name used in persisted results
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loso => "loso",
            Self::Lolo => "lolo",
        }
    }
}

/// One hold-out fold.
#[derive(Clone, Debug, PartialEq)]
pub struct Fold {
    /// Held-out session or list id
    pub key: i64,
    /// Events used for fitting
    pub train_mask: Vec<bool>,
    /// Held-out events evaluated
    pub test_mask: Vec<bool>,
    /// Phase of each training event, in event order
    pub train_phases: Vec<TaskPhase>,
    /// Phase of each test event, in event order
    pub test_phases: Vec<TaskPhase>,
}

impl Fold {
    /// Row indices of training events
    #[must_use]
    pub fn train_indices(&self) -> Vec<usize> {
        mask_indices(&self.train_mask)
    }

    /// Row indices of test events
    #[must_use]
    pub fn test_indices(&self) -> Vec<usize> {
        mask_indices(&self.test_mask)
    }
}

/// The complete set of folds for one subject.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossValidationPlan {
    cv_type: CvType,
    folds: Vec<Fold>,
    fold_keys: Vec<i64>,
    n_events: usize,
}

impl CrossValidationPlan {
    /// Build one fold per unique session (several sessions) or list (one session).
    pub fn build(events: &EventTable, train_phases: &[TaskPhase], test_phases: &[TaskPhase]) -> DataResult<Self> {
        if events.is_empty() {
            return Err(DataError::EmptySelection {
                context: "cross-validation events",
            });
        }

        let (cv_type, fold_keys): (CvType, Vec<i64>) = if events.unique_sessions().len() > 1 {
            (CvType::Loso, events.iter().map(|e| i64::from(e.session)).collect())
        } else {
            (CvType::Lolo, events.iter().map(|e| i64::from(e.list)).collect())
        };
        let phases = events.phases();
        let unique: BTreeSet<i64> = fold_keys.iter().copied().collect();

        let folds = unique
            .into_iter()
            .map(|key| {
                let train_mask: Vec<bool> = fold_keys
                    .iter()
                    .zip(&phases)
                    .map(|(&k, p)| k != key && train_phases.contains(p))
                    .collect();
                let test_mask: Vec<bool> = fold_keys
                    .iter()
                    .zip(&phases)
                    .map(|(&k, p)| k == key && test_phases.contains(p))
                    .collect();
                let select = |mask: &[bool]| -> Vec<TaskPhase> {
                    phases
                        .iter()
                        .zip(mask)
                        .filter_map(|(p, &m)| m.then_some(*p))
                        .collect()
                };
                Fold {
                    key,
                    train_phases: select(&train_mask),
                    test_phases: select(&test_mask),
                    train_mask,
                    test_mask,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(cv_type = cv_type.as_str(), folds = folds.len(), "cross-validation plan built");
        Ok(Self {
            cv_type,
            folds,
            fold_keys,
            n_events: events.len(),
        })
    }

    /// Hold-out scheme in use
    #[must_use]
    pub fn cv_type(&self) -> CvType {
        self.cv_type
    }

    /// Folds in ascending key order
    #[must_use]
    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    /// Number of folds
    #[must_use]
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    /// True if there are no folds
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Fold key of every event
    #[must_use]
    pub fn fold_keys(&self) -> &[i64] {
        &self.fold_keys
    }

    /// Number of events the plan was built for
    #[must_use]
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Events that are held out in some fold
    #[must_use]
    pub fn test_union(&self) -> Vec<bool> {
        let mut union = vec![false; self.n_events];
        for fold in &self.folds {
            for (u, &t) in union.iter_mut().zip(&fold.test_mask) {
                *u |= t;
            }
        }
        union
    }
}

pub(crate) fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter().enumerate().filter_map(|(i, &m)| m.then_some(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwave_core::types::Event;

    fn event(session: u32, list: i32, phase: TaskPhase) -> Event {
        Event {
            session,
            list,
            phase,
            recalled: list % 2 == 0,
            reaction_time: None,
            performance: None,
        }
    }

    #[test]
    fn test_single_session_holds_out_lists() {
        let events: EventTable = [1, 1, 2, 2, 3, 3]
            .iter()
            .map(|&l| event(0, l, TaskPhase::Encoding))
            .collect();
        let plan = CrossValidationPlan::build(&events, &[TaskPhase::Encoding], &[TaskPhase::Encoding]).unwrap();

        assert_eq!(plan.cv_type(), CvType::Lolo);
        assert_eq!(plan.len(), 3);
        for fold in plan.folds() {
            let lists = events.lists();
            for (i, &list) in lists.iter().enumerate() {
                assert_eq!(fold.train_mask[i], i64::from(list) != fold.key);
                assert_eq!(fold.test_mask[i], i64::from(list) == fold.key);
            }
        }
    }

    #[test]
    fn test_sessions_partition_test_events() {
        let mut events = Vec::new();
        for session in 0..3 {
            for list in 0..4 {
                events.push(event(session, list, TaskPhase::Encoding));
                events.push(event(session, list, TaskPhase::Retrieval));
            }
        }
        let events = EventTable::new(events);
        let plan = CrossValidationPlan::build(
            &events,
            &[TaskPhase::Encoding, TaskPhase::Retrieval],
            &[TaskPhase::Encoding],
        )
        .unwrap();

        assert_eq!(plan.cv_type(), CvType::Loso);
        assert_eq!(plan.len(), 3);

        let mut hits = vec![0usize; events.len()];
        for fold in plan.folds() {
            for i in 0..events.len() {
                assert!(!(fold.train_mask[i] && fold.test_mask[i]));
                if fold.test_mask[i] {
                    hits[i] += 1;
                }
            }
            assert_eq!(fold.test_phases.len(), fold.test_indices().len());
            assert!(fold.test_phases.iter().all(|p| *p == TaskPhase::Encoding));
        }
        for (e, &count) in events.iter().zip(&hits) {
            let expected = usize::from(e.phase == TaskPhase::Encoding);
            assert_eq!(count, expected);
        }
        assert_eq!(plan.test_union().iter().filter(|&&t| t).count(), 12);
    }

    #[test]
    fn test_empty_events_rejected() {
        let events = EventTable::new(Vec::new());
        assert!(CrossValidationPlan::build(&events, &[TaskPhase::Encoding], &[TaskPhase::Encoding]).is_err());
    }
}
