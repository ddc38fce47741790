//! Analysis configuration
//!
//! Every recognized option is a typed field with a default. Unknown keys are
//! rejected when parsing, and `validate()` checks value ranges before any
//! computation starts.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ElectrodeType, Task, TaskPhase};

/// Regularization value used whenever cross-validation cannot select one
/// (single-session subjects).
pub const DEFAULT_C: f64 = 7.2e-4;

// ============================================================================
// Classifier
// ============================================================================

/// Penalty norm for the logistic regression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Penalty {
    /// Lasso penalty
    #[serde(rename = "l1")]
    L1,
    /// Ridge penalty
    #[default]
    #[serde(rename = "l2")]
    L2,
}

/// Stopping rules for the logistic regression solvers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SolverOptions {
    /// Outer iteration limit
    pub max_iter: usize,
    /// Relative gradient-norm tolerance
    pub tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-4,
        }
    }
}

/// Settings for the recalled / not-recalled classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierConfig {
    /// Experiment the events come from
    pub task: Task,
    /// Phases used to fit the model
    pub train_phases: Vec<TaskPhase>,
    /// Phases the fitted model is evaluated on
    pub test_phases: Vec<TaskPhase>,
    /// Phases features were computed for
    pub feature_phases: Vec<TaskPhase>,
    /// Candidate inverse regularization strengths
    pub c_values: Vec<f64>,
    /// Penalty norm
    pub penalty: Penalty,
    /// Encoding-class weight multiplier when training on both phases
    pub scale_enc: Option<f64>,
    /// Z-score features within each session and phase before cross-validation
    pub normalize_by_session: bool,
    /// Drop retrieval events faster than this reaction time (s)
    pub min_retrieval_rt: Option<f64>,
    /// Label permutations for the AUC p-value (0 disables)
    pub permutations: usize,
    /// Seed for label permutations
    pub seed: u64,
    /// Solver stopping rules
    pub solver: SolverOptions,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            task: Task::TreasureHunt,
            train_phases: vec![TaskPhase::Encoding],
            test_phases: vec![TaskPhase::Encoding],
            feature_phases: vec![TaskPhase::Encoding],
            c_values: vec![DEFAULT_C],
            penalty: Penalty::L2,
            scale_enc: None,
            normalize_by_session: true,
            min_retrieval_rt: None,
            permutations: 0,
            seed: 0,
            solver: SolverOptions::default(),
        }
    }
}

impl ClassifierConfig {
    /// Validate an explicitly built configuration
    pub fn new(config: Self) -> ConfigResult<Self> {
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON and validate
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option
    pub fn validate(&self) -> ConfigResult<()> {
        for (role, phases) in [
            ("train", &self.train_phases),
            ("test", &self.test_phases),
            ("feature", &self.feature_phases),
        ] {
            if phases.is_empty() {
                return Err(ConfigError::EmptyPhases { role });
            }
        }
        for (role, phases) in [("train", &self.train_phases), ("test", &self.test_phases)] {
            if !phases.iter().all(|p| self.feature_phases.contains(p)) {
                return Err(ConfigError::PhaseNotAvailable {
                    role,
                    phases: phases.clone(),
                    available: self.feature_phases.clone(),
                });
            }
        }
        if self.c_values.is_empty() {
            return Err(ConfigError::NoRegularization);
        }
        if let Some(bad) = self.c_values.iter().find(|c| !c.is_finite() || **c <= 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "c_values",
                reason: format!("{bad} is not a positive finite number"),
            });
        }
        if let Some(scale) = self.scale_enc {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    parameter: "scale_enc",
                    reason: format!("{scale} must be positive"),
                });
            }
        }
        if let Some(rt) = self.min_retrieval_rt {
            if !rt.is_finite() || rt < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    parameter: "min_retrieval_rt",
                    reason: format!("{rt} must be non-negative"),
                });
            }
        }
        if self.solver.max_iter == 0 || !(self.solver.tolerance > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "solver",
                reason: "max_iter and tolerance must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// True when more than one regularization value is to be compared
    #[must_use]
    pub fn selects_regularization(&self) -> bool {
        self.c_values.len() > 1
    }

    /// True when encoding and retrieval classes are weighted separately
    #[must_use]
    pub fn splits_phase_weights(&self) -> bool {
        self.train_phases.len() > 1 && self.scale_enc.is_some()
    }
}

// ============================================================================
// Clustering
// ============================================================================

/// Settings for oscillation cluster detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClusterConfig {
    /// Electrodes closer than this (mm) are neighbors
    pub min_elec_dist: f64,
    /// Smallest cluster kept
    pub min_num_elecs: usize,
    /// Contact types that may join a cluster
    pub elec_types_allowed: Vec<ElectrodeType>,
    /// Keep clusters within one hemisphere
    pub separate_hemis: bool,
    /// Width of each frequency window (Hz)
    pub cluster_freq_range: f64,
    /// Spacing of window centers (Hz)
    pub window_step: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_elec_dist: 15.0,
            min_num_elecs: 4,
            elec_types_allowed: vec![ElectrodeType::Depth, ElectrodeType::Grid, ElectrodeType::Strip],
            separate_hemis: true,
            cluster_freq_range: 2.0,
            window_step: 1.0,
        }
    }
}

impl ClusterConfig {
    /// Validate an explicitly built configuration
    pub fn new(config: Self) -> ConfigResult<Self> {
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON and validate
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option
    pub fn validate(&self) -> ConfigResult<()> {
        positive("min_elec_dist", self.min_elec_dist)?;
        positive("cluster_freq_range", self.cluster_freq_range)?;
        positive("window_step", self.window_step)?;
        if self.min_num_elecs == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "min_num_elecs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a contact type may join a cluster
    #[must_use]
    pub fn allows(&self, kind: ElectrodeType) -> bool {
        self.elec_types_allowed.contains(&kind)
    }
}

// ============================================================================
// Traveling Waves
// ============================================================================

/// Search grid for the circular-linear wave fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WaveConfig {
    /// Direction grid step (degrees)
    pub angle_step_deg: f64,
    /// Largest direction on the grid (degrees)
    pub max_angle_deg: f64,
    /// Spatial frequency grid step (degrees of phase per mm)
    pub spatial_freq_step_deg: f64,
    /// Largest spatial frequency on the grid (degrees of phase per mm)
    pub max_spatial_freq_deg: f64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            angle_step_deg: 5.0,
            max_angle_deg: 355.0,
            spatial_freq_step_deg: 0.5,
            max_spatial_freq_deg: 18.0,
        }
    }
}

impl WaveConfig {
    /// Check every option
    pub fn validate(&self) -> ConfigResult<()> {
        positive("angle_step_deg", self.angle_step_deg)?;
        positive("spatial_freq_step_deg", self.spatial_freq_step_deg)?;
        if self.max_angle_deg < 0.0 || self.max_spatial_freq_deg < 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "grid",
                reason: "grid limits must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

fn positive(parameter: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            parameter,
            reason: format!("{value} must be positive"),
        })
    }
}
