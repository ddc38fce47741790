//! memwave core - data model, configuration, and statistics
//!
//! This crate provides the foundational types shared by the memwave
//! analyses of intracranial EEG memory experiments. It performs no I/O.
//!
//! # Modules
//!
//! - [`types`]: Tasks, phases, electrodes, events, and the feature matrix
//! - [`config`]: Typed, validated analysis settings
//! - [`error`]: Configuration and data error types
//! - [`math`]: Z-scoring, ROC AUC, t-tests, circular statistics
//!
//! # Example
//!
//! ```rust
//! use memwave_core::math::roc_auc;
//!
//! let labels = [false, false, true, true];
//! let scores = [0.1, 0.4, 0.35, 0.8];
//! let auc = roc_auc(&labels, &scores).unwrap();
//! assert!((auc - 0.75).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod math;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ClassifierConfig, ClusterConfig, Penalty, SolverOptions, WaveConfig, DEFAULT_C};
pub use error::{ConfigError, ConfigResult, DataError, DataResult, ErrorKind};
pub use types::{
    Electrode, ElectrodeType, Event, EventTable, FeatureMatrix, FeatureSet, FeatureShape, Task, TaskPhase,
};
