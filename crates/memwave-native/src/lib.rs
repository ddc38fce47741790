//! memwave native - analysis engine for intracranial EEG memory experiments
//!
//! This crate provides the subject-level analyses:
//! - Oscillation cluster detection (spectral peaks grouped by electrode proximity)
//! - Cross-validated recalled / not-recalled classification with
//!   bias-corrected AUC
//! - Forward model, univariate statistics, and permutation p-values
//! - Traveling-wave fits on cluster phases and cluster recall contrasts
//!
//! # Modules
//!
//! - [`cluster`]: Adjacency, peak binning, connected-component clustering
//! - [`classify`]: Fold planning, normalization, logistic regression, results
//! - [`wave`]: Circular-linear plane-wave fits, per-cluster memory effect
//! - [`exclusions`]: Abridged and first-session exclusions
//! - [`provider`]: Feature loading interface and implementations
//! - [`cache`]: Content-addressed result cache
//! - [`pipeline`]: Per-subject composition and batch runs
//! - [`error`]: Error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod cache;
pub mod classify;
pub mod cluster;
pub mod error;
pub mod exclusions;
pub mod pipeline;
pub mod provider;
pub mod wave;

// Re-export key types
pub use cache::{cache_key, CacheRecord, ResultCache};
pub use classify::{ClassifierResult, ClassifierTrainer, CrossValidationPlan, CvType, SubjectClassifier};
pub use cluster::{AdjacencyMatrix, Cluster, ClusterExtractor, ClusterMap};
pub use error::{ClassifierError, ClusterError, PipelineError, ProviderError, WaveError};
pub use pipeline::{Analysis, ClassifierAnalysis, ClusterAnalysis, ClusterReport, SubjectPipeline};
pub use provider::{CachedProvider, FeatureProvider, FeatureRequest, InMemoryProvider};
pub use wave::{subsequent_memory_effect, ClusterWaves, SubsequentMemoryEffect, WaveFit, WaveFitter};
