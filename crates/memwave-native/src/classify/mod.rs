//! Recalled vs not-recalled classification
//!
//! - [`cross_val`]: LOSO / LOLO fold planning
//! - [`normalize`]: Session and per-fold z-scoring on working copies
//! - [`weights`]: Reciprocal-frequency observation weights
//! - [`logistic`]: Weighted L1 / L2 logistic regression
//! - [`trainer`]: Cross-validated training and bias-corrected AUC
//! - [`forward`]: Forward model and univariate statistics
//! - [`permutation`]: Label-permutation p-value
//! - [`result`]: Persisted result record
//! - [`subject`]: Stateful per-subject workflow

pub mod cross_val;
pub mod forward;
pub mod logistic;
pub mod normalize;
pub mod permutation;
pub mod result;
pub mod subject;
pub mod trainer;
pub mod weights;

pub use cross_val::{CrossValidationPlan, CvType, Fold};
pub use forward::{forward_model, univariate_tstats, UnivariateStats};
pub use logistic::{solver_for, LogisticModel, LogisticSolver, NewtonCgSolver, ProximalSolver};
pub use result::ClassifierResult;
pub use subject::{ClassifierStage, SubjectClassifier};
pub use trainer::{bias_corrected_auc, terciles, BiasCorrectedAuc, ClassifierTrainer, TrainingOutcome};
pub use weights::observation_weights;
