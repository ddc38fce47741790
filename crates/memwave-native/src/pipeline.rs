//! Subject-level analysis composition
//!
//! A [`SubjectPipeline`] loads a subject's features from a
//! [`FeatureProvider`], consults the [`ResultCache`], and otherwise runs an
//! [`Analysis`] and stores its output. [`SubjectPipeline::run_batch`] runs
//! many subjects independently; one subject failing never stops the rest.

use memwave_core::config::{ClassifierConfig, ClusterConfig};
use memwave_core::error::DataError;
use memwave_core::types::{Electrode, FeatureSet};
use ndarray::Array3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, CacheRecord, ResultCache};
use crate::classify::{ClassifierResult, SubjectClassifier};
use crate::cluster::{mean_power_spectrum, BackgroundPeakDetector, ClusterExtractor, ClusterMap, PeakDetector};
use crate::error::{ClassifierError, ClusterError, PipelineResult};
use crate::exclusions::{remove_abridged_sessions, remove_first_session_if_worse};
use crate::provider::{FeatureProvider, FeatureRequest};

/// One analysis applied to a subject's features.
///
/// The serialized form of the analysis is part of its cache key, so every
/// setting that changes the output must be serialized.
pub trait Analysis: Serialize + Send + Sync {
    /// Output record
    type Output: CacheRecord + Send;

    /// Stable name, used as the cache namespace
    fn name(&self) -> &'static str;

    /// Run on one subject
    fn run(&self, subject: &str, set: &FeatureSet) -> PipelineResult<Self::Output>;
}

// ============================================================================
// Classifier analysis
// ============================================================================

/// Cross-validated recall classification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierAnalysis {
    /// Classifier settings
    pub config: ClassifierConfig,
    /// Apply the session exclusions before classifying
    pub exclusions: bool,
}

impl ClassifierAnalysis {
    /// Classification without session exclusions
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            exclusions: false,
        }
    }

    /// Toggle the abridged / first-session exclusions
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: bool) -> Self {
        self.exclusions = exclusions;
        self
    }
}

impl Analysis for ClassifierAnalysis {
    type Output = ClassifierResult;

    fn name(&self) -> &'static str {
        "classify"
    }

    /// `source_events` of the result is the provider's event count, taken
    /// before exclusions.
    fn run(&self, subject: &str, set: &FeatureSet) -> PipelineResult<ClassifierResult> {
        let kept = if self.exclusions {
            let task = self.config.task;
            let kept = remove_abridged_sessions(set, task).map_err(ClassifierError::from)?;
            remove_first_session_if_worse(&kept, task).map_err(ClassifierError::from)?
        } else {
            set.clone()
        };
        let result = SubjectClassifier::run(subject, self.config.clone(), kept)?;
        Ok(ClassifierResult {
            source_events: set.n_events(),
            ..result
        })
    }
}

// ============================================================================
// Cluster analysis
// ============================================================================

/// Oscillation clusters found for one subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    /// Subject id
    pub subj: String,
    /// Events the mean spectra were averaged over
    pub n_events: usize,
    /// Clusters by center frequency
    pub clusters: ClusterMap,
}

impl CacheRecord for ClusterReport {
    fn n_events(&self) -> usize {
        self.n_events
    }
}

/// Cluster detection on event-averaged spectra.
///
/// The feature values are read as (linear, positive) power; time bins and
/// events are averaged before peak detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    /// Cluster settings
    pub config: ClusterConfig,
    /// Electrodes in feature-column order
    pub electrodes: Vec<Electrode>,
    /// Smallest detrended log-power bump counted as a peak
    pub min_residual: f64,
}

impl ClusterAnalysis {
    /// Analysis for one electrode montage
    #[must_use]
    pub fn new(config: ClusterConfig, electrodes: Vec<Electrode>) -> Self {
        Self {
            config,
            electrodes,
            min_residual: BackgroundPeakDetector::default().min_residual,
        }
    }
}

impl Analysis for ClusterAnalysis {
    type Output = ClusterReport;

    fn name(&self) -> &'static str {
        "cluster"
    }

    fn run(&self, subject: &str, set: &FeatureSet) -> PipelineResult<ClusterReport> {
        let shape = set.features().shape();
        if shape.n_electrodes != self.electrodes.len() {
            return Err(ClusterError::from(DataError::DimensionMismatch {
                context: "electrode montage",
                expected: shape.n_electrodes,
                got: self.electrodes.len(),
            })
            .into());
        }

        let data = set.features().data();
        let bins = shape.n_time_bins as f64;
        let power = Array3::from_shape_fn((set.n_events(), shape.n_freqs, shape.n_electrodes), |(ev, f, e)| {
            (0..shape.n_time_bins).map(|t| data[[ev, shape.column(e, f, t)]]).sum::<f64>() / bins
        });
        let mean_power = mean_power_spectrum(power.view()).map_err(ClusterError::from)?;

        let detector = BackgroundPeakDetector {
            min_residual: self.min_residual,
        };
        let peaks = detector.detect(set.freqs(), mean_power.view()).map_err(ClusterError::from)?;
        let clusters = ClusterExtractor::new(self.config.clone())?.run(&self.electrodes, &peaks)?;

        tracing::info!(subject, clusters = clusters.total_clusters(), "clusters extracted");
        Ok(ClusterReport {
            subj: subject.to_string(),
            n_events: set.n_events(),
            clusters,
        })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Provider + analysis + optional result cache.
#[derive(Debug)]
pub struct SubjectPipeline<P, A> {
    provider: P,
    analysis: A,
    cache: Option<ResultCache>,
}

impl<P: FeatureProvider, A: Analysis> SubjectPipeline<P, A> {
    /// Pipeline without a result cache
    pub fn new(provider: P, analysis: A) -> Self {
        Self {
            provider,
            analysis,
            cache: None,
        }
    }

    /// Reuse and store results in `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Feature provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Analysis
    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Cache key for one request under this analysis
    pub fn result_key(&self, request: &FeatureRequest) -> PipelineResult<String> {
        Ok(cache_key(self.analysis.name(), &request.subject, &(&self.analysis, request))?)
    }

    /// Run one subject, reusing a cached result computed from the same
    /// number of events.
    pub fn run(&self, request: &FeatureRequest) -> PipelineResult<A::Output> {
        let set = self.provider.load(request)?;
        let name = self.analysis.name();

        let key = match &self.cache {
            Some(cache) => {
                let key = self.result_key(request)?;
                if let Some(hit) = cache.load::<A::Output>(name, &key, set.n_events())? {
                    tracing::info!(subject = %request.subject, analysis = name, "using cached result");
                    return Ok(hit);
                }
                Some(key)
            }
            None => None,
        };

        let output = self.analysis.run(&request.subject, &set)?;
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.store(name, &key, &output)?;
        }
        Ok(output)
    }

    /// Run every request independently, keeping per-subject outcomes in
    /// request order.
    pub fn run_batch(&self, requests: &[FeatureRequest]) -> Vec<(String, PipelineResult<A::Output>)> {
        let outcomes: Vec<(String, PipelineResult<A::Output>)> = requests
            .par_iter()
            .map(|request| {
                let outcome = self.run(request);
                if let Err(e) = &outcome {
                    tracing::warn!(subject = %request.subject, kind = ?e.kind(), error = %e, "subject failed");
                }
                (request.subject.clone(), outcome)
            })
            .collect();

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(
            analysis = self.analysis.name(),
            subjects = outcomes.len(),
            failed,
            "batch finished"
        );
        outcomes
    }
}
