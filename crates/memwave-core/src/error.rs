//! Error types for memwave
//!
//! Configuration and data errors shared by every analysis stage. Stage
//! specific errors in `memwave-native` wrap these.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskPhase;

/// Broad error category, used by batch drivers to decide how to report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid or inconsistent settings
    Configuration,
    /// Operation invoked before a required earlier step
    Precondition,
    /// Input data inconsistent or unusable
    Data,
    /// Filesystem or serialization failure
    Io,
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Invalid analysis settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Settings could not be parsed (including unknown keys)
    #[error("Invalid configuration: {reason}")]
    Parse {
        /// Parser message
        reason: String,
    },

    /// A phase list is empty
    #[error("No {role} phases given")]
    EmptyPhases {
        /// Which phase list (train, test, feature)
        role: &'static str,
    },

    /// Train or test phases not covered by the loaded feature phases
    #[error("{role} phases {phases:?} must be a subset of feature phases {available:?}")]
    PhaseNotAvailable {
        /// Which phase list (train, test)
        role: &'static str,
        /// Requested phases
        phases: Vec<TaskPhase>,
        /// Phases features exist for
        available: Vec<TaskPhase>,
    },

    /// No regularization values given
    #[error("At least one regularization value is required")]
    NoRegularization,

    /// A numeric parameter is out of range
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Reason
        reason: String,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            reason: err.to_string(),
        }
    }
}

// ============================================================================
// Data Errors
// ============================================================================

/// Input data that cannot be analyzed as given.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Feature rows and event rows disagree
    #[error("Event count mismatch: {features} feature rows, {events} events")]
    EventCountMismatch {
        /// Rows in the feature matrix
        features: usize,
        /// Rows in the event table
        events: usize,
    },

    /// Column count does not match the declared feature layout
    #[error("Feature shape mismatch: expected {expected} columns, got {got}")]
    FeatureShapeMismatch {
        /// Columns implied by the layout
        expected: usize,
        /// Columns present
        got: usize,
    },

    /// Generic length mismatch
    #[error("Dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// What was being compared
        context: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// Only one class present where both are required
    #[error("Only one class present in {context}")]
    SingleClass {
        /// Where the labels came from
        context: &'static str,
    },

    /// A selection produced no rows
    #[error("Empty selection: {context}")]
    EmptySelection {
        /// What was selected
        context: &'static str,
    },

    /// NaN or infinite input
    #[error("Non-finite values in {context}")]
    NonFinite {
        /// Where the values were found
        context: &'static str,
    },
}

/// Result type for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for data-dependent operations
pub type DataResult<T> = Result<T, DataError>;
