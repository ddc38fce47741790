//! Session-level exclusions applied before analysis

use std::collections::{BTreeMap, BTreeSet};

use memwave_core::error::{DataError, DataResult};
use memwave_core::math::{chi_square_proportions, ttest_ind};
use memwave_core::types::{FeatureSet, Task};

/// Significance level for dropping the first session
pub const FIRST_SESSION_ALPHA: f64 = 0.05;

/// Drop sessions that were cut short.
///
/// A session is kept only if it has more unique lists (trials) than the
/// task minimum. Fails if no session survives.
pub fn remove_abridged_sessions(set: &FeatureSet, task: Task) -> DataResult<FeatureSet> {
    let mut lists: BTreeMap<u32, BTreeSet<i32>> = BTreeMap::new();
    for event in set.events().iter() {
        lists.entry(event.session).or_default().insert(event.list);
    }
    let minimum = task.min_lists_per_session();
    let short: BTreeSet<u32> = lists
        .iter()
        .filter_map(|(&session, l)| (l.len() <= minimum).then_some(session))
        .collect();

    if short.is_empty() {
        return Ok(set.clone());
    }
    if short.len() == lists.len() {
        return Err(DataError::EmptySelection {
            context: "sessions with enough lists",
        });
    }
    tracing::info!(removed = ?short, of = lists.len(), "removing abridged sessions");
    let keep: Vec<bool> = set.events().iter().map(|e| !short.contains(&e.session)).collect();
    Ok(set.filter_events(&keep))
}

/// Drop the first session when its performance differs from the rest.
///
/// Treasure Hunt compares per-event performance with a t-test; free recall
/// compares recall proportions with a chi-square test. The first session is
/// the session of the first event.
pub fn remove_first_session_if_worse(set: &FeatureSet, task: Task) -> DataResult<FeatureSet> {
    let Some(first) = set.events().iter().next().map(|e| e.session) else {
        return Ok(set.clone());
    };
    if set.events().unique_sessions().len() < 2 {
        return Ok(set.clone());
    }
    let in_first: Vec<bool> = set.events().iter().map(|e| e.session == first).collect();

    let p_value = match task {
        Task::TreasureHunt => {
            let (mut a, mut b) = (Vec::new(), Vec::new());
            for (event, &is_first) in set.events().iter().zip(&in_first) {
                if let Some(perf) = event.performance {
                    if is_first {
                        a.push(perf);
                    } else {
                        b.push(perf);
                    }
                }
            }
            if a.is_empty() || b.is_empty() {
                return Ok(set.clone());
            }
            ttest_ind(&a, &b)?.p_value
        }
        Task::FreeRecall => {
            let mut successes = [0u64; 2];
            let mut totals = [0u64; 2];
            for (event, &is_first) in set.events().iter().zip(&in_first) {
                let group = usize::from(!is_first);
                totals[group] += 1;
                successes[group] += u64::from(event.recalled);
            }
            chi_square_proportions(successes, totals)?.p_value
        }
    };

    if p_value < FIRST_SESSION_ALPHA {
        tracing::info!(session = first, p_value, "removing first session based on performance difference");
        let keep: Vec<bool> = in_first.iter().map(|&f| !f).collect();
        Ok(set.filter_events(&keep))
    } else {
        Ok(set.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwave_core::types::{Event, EventTable, FeatureMatrix, FeatureShape, TaskPhase};
    use ndarray::Array2;

    fn build(events: Vec<Event>) -> FeatureSet {
        let n = events.len();
        let data = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let features = FeatureMatrix::new(data, FeatureShape::new(1, 2)).unwrap();
        FeatureSet::new(features, EventTable::new(events), vec![4.0, 8.0]).unwrap()
    }

    fn event(session: u32, list: i32, recalled: bool, performance: Option<f64>) -> Event {
        Event {
            session,
            list,
            phase: TaskPhase::Encoding,
            recalled,
            reaction_time: None,
            performance,
        }
    }

    #[test]
    fn test_short_sessions_removed() {
        let mut events: Vec<Event> = (0..20).map(|l| event(0, l, l % 2 == 0, None)).collect();
        events.extend((0..10).map(|l| event(1, l, l % 2 == 0, None)));
        let kept = remove_abridged_sessions(&build(events), Task::FreeRecall).unwrap();
        assert_eq!(kept.n_events(), 20);
        assert_eq!(kept.events().unique_sessions(), vec![0]);
        assert_eq!(kept.features().data()[[0, 0]], 0.0);
    }

    #[test]
    fn test_all_short_is_error() {
        let events: Vec<Event> = (0..15).map(|l| event(0, l, true, None)).collect();
        assert!(remove_abridged_sessions(&build(events), Task::FreeRecall).is_err());
    }

    #[test]
    fn test_worse_first_session_dropped_for_free_recall() {
        let mut events: Vec<Event> = (0..60).map(|i| event(0, i / 4, i % 10 == 0, None)).collect();
        events.extend((0..60).map(|i| event(1, i / 4, i % 10 < 6, None)));
        let kept = remove_first_session_if_worse(&build(events), Task::FreeRecall).unwrap();
        assert_eq!(kept.events().unique_sessions(), vec![1]);
    }

    #[test]
    fn test_similar_first_session_kept_for_treasure_hunt() {
        let perf = |i: i32| Some(f64::from(i % 5));
        let mut events: Vec<Event> = (0..40).map(|i| event(0, i, true, perf(i))).collect();
        events.extend((0..40).map(|i| event(1, i, true, perf(i + 1))));
        let set = build(events);
        let kept = remove_first_session_if_worse(&set, Task::TreasureHunt).unwrap();
        assert_eq!(kept.n_events(), set.n_events());
    }

    #[test]
    fn test_single_session_untouched() {
        let events: Vec<Event> = (0..10).map(|i| event(3, i, i % 2 == 0, None)).collect();
        let set = build(events);
        assert_eq!(remove_first_session_if_worse(&set, Task::FreeRecall).unwrap(), set);
    }
}
