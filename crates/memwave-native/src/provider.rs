//! Feature loading
//!
//! Analyses consume a [`FeatureSet`] and do not care where it came from. A
//! [`FeatureProvider`] turns a [`FeatureRequest`] into one:
//!
//! - [`InMemoryProvider`]: sets held in memory (e.g. read from a JSON file)
//! - [`CachedProvider`]: wraps another provider with an on-disk cache and
//!   regenerates any stored set that no longer matches the event table

use std::collections::HashMap;
use std::path::PathBuf;

use memwave_core::error::DataError;
use memwave_core::types::{EventTable, FeatureSet, Task, TaskPhase};
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, ResultCache};
use crate::error::{ProviderError, ProviderResult};

/// Cache namespace for feature sets
pub const FEATURE_CACHE_NAME: &str = "features";

/// Time window (seconds, relative to event onset) for one phase.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseWindow {
    /// Task phase
    pub phase: TaskPhase,
    /// Window start (s)
    pub start: f64,
    /// Window end (s)
    pub end: f64,
}

/// Parameters identifying one subject's feature set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureRequest {
    /// Subject id
    pub subject: String,
    /// Memory task
    pub task: Task,
    /// Phases to compute features for, each with its time window
    pub windows: Vec<PhaseWindow>,
    /// Frequencies (Hz) at which power is computed
    pub freqs: Vec<f64>,
    /// Bipolar pairs instead of average-referenced contacts
    pub bipolar: bool,
}

impl FeatureRequest {
    /// Encoding-phase request over `-1.2..0.5` s at 8 log-spaced
    /// frequencies from 1 to 200 Hz, bipolar.
    #[must_use]
    pub fn new(subject: impl Into<String>, task: Task) -> Self {
        let freqs = (0..8)
            .map(|i| 10f64.powf(200f64.log10() * f64::from(i) / 7.0))
            .collect();
        Self {
            subject: subject.into(),
            task,
            windows: vec![PhaseWindow {
                phase: TaskPhase::Encoding,
                start: -1.2,
                end: 0.5,
            }],
            freqs,
            bipolar: true,
        }
    }

    /// Request the given phases with the window of the first existing one
    #[must_use]
    pub fn with_phases(mut self, phases: &[TaskPhase]) -> Self {
        let template = self.windows.first().copied().unwrap_or(PhaseWindow {
            phase: TaskPhase::Encoding,
            start: -1.2,
            end: 0.5,
        });
        self.windows = phases
            .iter()
            .map(|&phase| PhaseWindow { phase, ..template })
            .collect();
        self
    }

    /// Requested phases
    #[must_use]
    pub fn phases(&self) -> Vec<TaskPhase> {
        self.windows.iter().map(|w| w.phase).collect()
    }
}

/// Source of per-subject feature sets.
pub trait FeatureProvider: Send + Sync {
    /// Current event table for a request.
    ///
    /// Used to check stored feature sets for staleness, so it should be
    /// cheaper than [`FeatureProvider::load`].
    fn events(&self, request: &FeatureRequest) -> ProviderResult<EventTable>;

    /// Load or compute the feature set for a request
    fn load(&self, request: &FeatureRequest) -> ProviderResult<FeatureSet>;
}

// ============================================================================
// In-memory provider
// ============================================================================

/// Provider backed by preloaded feature sets, keyed by subject.
///
/// Only the request's phases are returned; the remaining request fields
/// must already be reflected in the stored sets.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProvider {
    sets: HashMap<String, FeatureSet>,
}

impl InMemoryProvider {
    /// Empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object mapping subject id to feature set.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let sets: HashMap<String, FeatureSet> = serde_json::from_str(json)?;
        for set in sets.values() {
            set.validate()?;
        }
        Ok(Self { sets })
    }

    /// Add or replace a subject
    pub fn insert(&mut self, subject: impl Into<String>, set: FeatureSet) {
        self.sets.insert(subject.into(), set);
    }

    /// Builder form of [`InMemoryProvider::insert`]
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>, set: FeatureSet) -> Self {
        self.insert(subject, set);
        self
    }

    /// Known subjects, sorted
    #[must_use]
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.sets.keys().cloned().collect();
        subjects.sort();
        subjects
    }

    fn stored(&self, request: &FeatureRequest) -> ProviderResult<&FeatureSet> {
        self.sets.get(&request.subject).ok_or_else(|| ProviderError::NotFound {
            subject: request.subject.clone(),
        })
    }

    fn phase_mask(set: &FeatureSet, request: &FeatureRequest) -> Vec<bool> {
        let phases = request.phases();
        set.events().iter().map(|e| phases.contains(&e.phase)).collect()
    }
}

impl FeatureProvider for InMemoryProvider {
    fn events(&self, request: &FeatureRequest) -> ProviderResult<EventTable> {
        let set = self.stored(request)?;
        Ok(set.events().filter(&Self::phase_mask(set, request)))
    }

    fn load(&self, request: &FeatureRequest) -> ProviderResult<FeatureSet> {
        let set = self.stored(request)?;
        let mask = Self::phase_mask(set, request);
        if mask.iter().all(|&keep| keep) {
            Ok(set.clone())
        } else {
            Ok(set.filter_events(&mask))
        }
    }
}

// ============================================================================
// Cached provider
// ============================================================================

/// Provider that stores computed feature sets on disk.
///
/// A stored set is reused only if it is internally consistent and its
/// event count matches the inner provider's current event table.
#[derive(Debug)]
pub struct CachedProvider<P> {
    inner: P,
    cache: ResultCache,
}

impl<P: FeatureProvider> CachedProvider<P> {
    /// Wrap a provider with a cache rooted at `root`
    pub fn new(inner: P, root: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache: ResultCache::new(root),
        }
    }

    /// Wrapped provider
    #[must_use]
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Cache key of a request
    pub fn key(request: &FeatureRequest) -> ProviderResult<String> {
        Ok(cache_key(FEATURE_CACHE_NAME, &request.subject, request)?)
    }
}

impl<P: FeatureProvider> FeatureProvider for CachedProvider<P> {
    fn events(&self, request: &FeatureRequest) -> ProviderResult<EventTable> {
        self.inner.events(request)
    }

    fn load(&self, request: &FeatureRequest) -> ProviderResult<FeatureSet> {
        let key = Self::key(request)?;
        let current = self.inner.events(request)?;

        if let Some(stored) = self.cache.load_any::<FeatureSet>(FEATURE_CACHE_NAME, &key)? {
            let check = stored.validate().and_then(|()| {
                if stored.n_events() == current.len() {
                    Ok(())
                } else {
                    Err(DataError::EventCountMismatch {
                        features: stored.n_events(),
                        events: current.len(),
                    })
                }
            });
            match check {
                Ok(()) => {
                    tracing::debug!(subject = %request.subject, "feature cache hit");
                    return Ok(stored);
                }
                Err(e) => {
                    tracing::info!(subject = %request.subject, error = %e, "stored features are stale; recomputing");
                }
            }
        }

        let set = self.inner.load(request)?;
        self.cache.store(FEATURE_CACHE_NAME, &key, &set)?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwave_core::types::{Event, FeatureMatrix, FeatureShape};
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn set(n: usize) -> FeatureSet {
        let events = (0..n)
            .map(|i| Event {
                session: 0,
                list: i32::try_from(i / 2).unwrap(),
                phase: if i % 3 == 0 { TaskPhase::Retrieval } else { TaskPhase::Encoding },
                recalled: i % 2 == 0,
                reaction_time: None,
                performance: None,
            })
            .collect();
        let data = Array2::from_shape_fn((n, 2), |(i, j)| (i + j) as f64);
        let features = FeatureMatrix::new(data, FeatureShape::new(2, 1)).unwrap();
        FeatureSet::new(features, EventTable::new(events), vec![6.0]).unwrap()
    }

    /// Counts loads and can be told to grow its event table
    struct Counting {
        n: AtomicUsize,
        loads: AtomicUsize,
    }

    impl FeatureProvider for Counting {
        fn events(&self, _request: &FeatureRequest) -> ProviderResult<EventTable> {
            Ok(set(self.n.load(Ordering::SeqCst)).events().clone())
        }

        fn load(&self, _request: &FeatureRequest) -> ProviderResult<FeatureSet> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(set(self.n.load(Ordering::SeqCst)))
        }
    }

    #[test]
    fn test_default_request() {
        let request = FeatureRequest::new("R1001P", Task::TreasureHunt);
        assert_eq!(request.freqs.len(), 8);
        assert!((request.freqs[0] - 1.0).abs() < 1e-12);
        assert!((request.freqs[7] - 200.0).abs() < 1e-9);
        assert_eq!(request.phases(), vec![TaskPhase::Encoding]);

        let both = request.with_phases(&[TaskPhase::Encoding, TaskPhase::Retrieval]);
        assert_eq!(both.windows[1].start, -1.2);
    }

    #[test]
    fn test_in_memory_filters_phases() {
        let provider = InMemoryProvider::new().with_subject("R1", set(9));
        let request = FeatureRequest::new("R1", Task::FreeRecall);
        let loaded = provider.load(&request).unwrap();
        assert_eq!(loaded.n_events(), 6);
        assert!(loaded.events().iter().all(|e| e.phase == TaskPhase::Encoding));
        assert_eq!(provider.events(&request).unwrap().len(), 6);
    }

    #[test]
    fn test_in_memory_unknown_subject() {
        let provider = InMemoryProvider::new();
        let err = provider.load(&FeatureRequest::new("R9", Task::FreeRecall)).unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { subject } if subject == "R9"));
    }

    #[test]
    fn test_in_memory_from_json() {
        let mut map = HashMap::new();
        map.insert("R2", set(4));
        let provider = InMemoryProvider::from_json(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(provider.subjects(), vec!["R2".to_string()]);
    }

    #[test]
    fn test_cached_provider_reuses_then_regenerates() {
        let dir = TempDir::new().unwrap();
        let provider = CachedProvider::new(
            Counting {
                n: AtomicUsize::new(6),
                loads: AtomicUsize::new(0),
            },
            dir.path(),
        );
        let request = FeatureRequest::new("R1", Task::TreasureHunt);

        assert_eq!(provider.load(&request).unwrap().n_events(), 6);
        assert_eq!(provider.load(&request).unwrap().n_events(), 6);
        assert_eq!(provider.inner().loads.load(Ordering::SeqCst), 1);

        provider.inner().n.store(8, Ordering::SeqCst);
        assert_eq!(provider.load(&request).unwrap().n_events(), 8);
        assert_eq!(provider.inner().loads.load(Ordering::SeqCst), 2);
    }
}
