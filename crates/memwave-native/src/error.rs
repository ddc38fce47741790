//! Error types for the analysis stages
//!
//! Stage errors wrap the shared configuration and data errors from
//! `memwave-core` and add precondition and I/O failures. Each error reports
//! an [`ErrorKind`] so batch drivers can log and continue.

use memwave_core::error::{ConfigError, DataError, ErrorKind};
use thiserror::Error;

/// Classifier pipeline errors
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unusable input data
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A step was invoked before the step it depends on
    #[error("{operation} requires {missing}; run it first")]
    Precondition {
        /// Operation attempted
        operation: &'static str,
        /// Missing prerequisite
        missing: &'static str,
    },

    /// Several regularization values requested for a single-session subject
    #[error("{candidates} regularization values cannot be compared with a single session of data")]
    MultipleCandidatesSingleSession {
        /// Number of candidate values
        candidates: usize,
    },

    /// Logistic regression did not produce finite coefficients
    #[error("Solver failed: {reason}")]
    Solver {
        /// Reason
        reason: String,
    },
}

impl ClassifierError {
    /// Error category
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::MultipleCandidatesSingleSession { .. } => ErrorKind::Configuration,
            Self::Precondition { .. } => ErrorKind::Precondition,
            Self::Data(_) | Self::Solver { .. } => ErrorKind::Data,
        }
    }
}

/// Cluster detection errors
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inconsistent inputs
    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

impl ClusterError {
    /// Error category
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Data(_) => ErrorKind::Data,
        }
    }
}

/// Traveling-wave fitting errors
#[derive(Error, Debug)]
pub enum WaveError {
    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inconsistent inputs
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Too few electrodes to fit a plane wave
    #[error("Need at least {need} electrodes for a wave fit, got {got}")]
    TooFewElectrodes {
        /// Electrodes supplied
        got: usize,
        /// Electrodes required
        need: usize,
    },
}

/// Feature provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Requested subject has no data
    #[error("No features available for subject {subject}")]
    NotFound {
        /// Subject id
        subject: String,
    },

    /// Loaded data is inconsistent
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Feature file could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by a subject pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Feature loading failed
    #[error("Feature provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Classifier failed
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    /// Cluster detection failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Result cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl PipelineError {
    /// Error category
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(ProviderError::Data(_) | ProviderError::NotFound { .. } | ProviderError::Parse(_)) => {
                ErrorKind::Data
            }
            Self::Provider(ProviderError::Cache(_)) | Self::Cache(_) => ErrorKind::Io,
            Self::Classifier(e) => e.kind(),
            Self::Cluster(e) => e.kind(),
        }
    }
}

/// Result type for classifier operations
pub type ClassifyResult<T> = Result<T, ClassifierError>;

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Result type for wave fitting
pub type WaveResult<T> = Result<T, WaveError>;

/// Result type for feature providers
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;
