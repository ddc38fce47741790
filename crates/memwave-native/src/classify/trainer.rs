//! Cross-validated training of the recall classifier
//!
//! For every regularization candidate and every fold the trainer
//! normalizes a working copy of the features, weights observations by
//! reciprocal class frequency, fits a logistic regression, and scores the
//! held-out events. With several sessions the candidate is selected by mean
//! fold AUC and the reported AUC is corrected for selection bias
//! (Tibshirani & Tibshirani, 2009). With one session the default
//! regularization is used and the AUC is computed from pooled held-out
//! probabilities.

use memwave_core::config::{ClassifierConfig, DEFAULT_C};
use memwave_core::error::{DataError, DataResult};
use memwave_core::math::{percentile, roc_auc};
use memwave_core::types::{FeatureSet, TaskPhase};
use ndarray::{Array2, Axis};

use super::cross_val::{mask_indices, CrossValidationPlan, CvType};
use super::logistic::{solver_for, LogisticModel, LogisticSolver};
use super::normalize::{normalize_by_session, normalize_fold, zscore_by_phase};
use super::permutation::permutation_p_value;
use super::weights::observation_weights;
use crate::error::{ClassifierError, ClassifyResult};

// ============================================================================
// Bias Correction
// ============================================================================

/// Selected candidate and its bias-corrected AUC.
#[derive(Clone, Debug, PartialEq)]
pub struct BiasCorrectedAuc {
    /// Best mean AUC minus the bias estimate
    pub auc: f64,
    /// Mean over folds of (fold best AUC − fold AUC at the selected candidate)
    pub bias: f64,
    /// Index of the candidate with the highest mean AUC (first on ties)
    pub best: usize,
    /// Mean AUC per candidate
    pub mean_aucs: Vec<f64>,
}

/// Bias-corrected AUC from a fold × candidate AUC table.
pub fn bias_corrected_auc(fold_aucs: &Array2<f64>) -> DataResult<BiasCorrectedAuc> {
    if fold_aucs.is_empty() {
        return Err(DataError::EmptySelection { context: "fold AUC table" });
    }
    let mean_aucs = fold_aucs
        .mean_axis(Axis(0))
        .ok_or(DataError::EmptySelection { context: "fold AUC table" })?
        .to_vec();

    let mut best = 0;
    for (i, &m) in mean_aucs.iter().enumerate() {
        if m > mean_aucs[best] {
            best = i;
        }
    }

    let gaps: Vec<f64> = fold_aucs
        .rows()
        .into_iter()
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max) - row[best])
        .collect();
    let bias = gaps.iter().sum::<f64>() / gaps.len() as f64;

    Ok(BiasCorrectedAuc {
        auc: mean_aucs[best] - bias,
        bias,
        best,
        mean_aucs,
    })
}

/// Percent change in recall rate within each tercile of predicted probability.
///
/// Tercile edges are the 0th, 33rd, 67th and 100th percentiles; the last
/// bin is closed. An empty bin reports no change.
pub fn terciles(probs: &[f64], classes: &[bool]) -> DataResult<[f64; 3]> {
    if probs.len() != classes.len() {
        return Err(DataError::DimensionMismatch {
            context: "tercile classes",
            expected: probs.len(),
            got: classes.len(),
        });
    }
    let rate = classes.iter().filter(|&&c| c).count() as f64 / classes.len().max(1) as f64;
    if rate == 0.0 {
        return Err(DataError::SingleClass { context: "tercile classes" });
    }
    let edges: Vec<f64> = [0.0, 33.0, 67.0, 100.0]
        .iter()
        .map(|&q| percentile(probs, q))
        .collect::<Option<Vec<f64>>>()
        .ok_or(DataError::EmptySelection { context: "tercile probabilities" })?;

    let mut out = [0.0; 3];
    for (bin, delta) in out.iter_mut().enumerate() {
        let (lo, hi) = (edges[bin], edges[bin + 1]);
        let members: Vec<bool> = probs
            .iter()
            .zip(classes)
            .filter(|(&p, _)| p >= lo && (p < hi || (bin == 2 && p <= hi)))
            .map(|(_, &c)| c)
            .collect();
        if !members.is_empty() {
            let bin_rate = members.iter().filter(|&&c| c).count() as f64 / members.len() as f64;
            *delta = (bin_rate - rate) / rate * 100.0;
        }
    }
    Ok(out)
}

// ============================================================================
// Trainer
// ============================================================================

/// Output of a full training run.
#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    /// Reported AUC
    pub auc: f64,
    /// Selected regularization value
    pub c: f64,
    /// Hold-out scheme
    pub cv_type: CvType,
    /// Fold × candidate AUC table (LOSO only)
    pub fold_aucs: Option<Array2<f64>>,
    /// Bias estimate (LOSO only)
    pub bias: Option<f64>,
    /// Events held out in some fold
    pub test_mask: Vec<bool>,
    /// Held-out probabilities at the selected value, one per test event
    pub probs: Vec<f64>,
    /// True labels of the test events
    pub classes: Vec<bool>,
    /// Model refit on every training-phase event
    pub model: LogisticModel,
    /// Normalized rows the final model was fit on
    pub model_features: Array2<f64>,
}

/// Scores from one pass over all candidates and folds
struct CrossValidated {
    auc: f64,
    best: usize,
    probs: Array2<f64>,
    fold_aucs: Option<Array2<f64>>,
    bias: Option<f64>,
}

/// Runs the cross-validated classifier for one subject.
pub struct ClassifierTrainer {
    config: ClassifierConfig,
    solver: Box<dyn LogisticSolver>,
}

impl std::fmt::Debug for ClassifierTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierTrainer").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ClassifierTrainer {
    /// Create a trainer using the solver matching the configured penalty
    pub fn new(config: ClassifierConfig) -> ClassifyResult<Self> {
        let solver = solver_for(config.penalty, config.solver.clone());
        Self::with_solver(config, solver)
    }

    /// Create a trainer with an explicit solver
    pub fn with_solver(config: ClassifierConfig, solver: Box<dyn LogisticSolver>) -> ClassifyResult<Self> {
        config.validate()?;
        Ok(Self { config, solver })
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Reject settings the plan cannot support, before any fitting.
    pub fn check_plan(&self, plan: &CrossValidationPlan) -> ClassifyResult<()> {
        if plan.cv_type() == CvType::Lolo && self.config.selects_regularization() {
            return Err(ClassifierError::MultipleCandidatesSingleSession {
                candidates: self.config.c_values.len(),
            });
        }
        if plan.is_empty() {
            return Err(DataError::EmptySelection {
                context: "cross-validation folds",
            }
            .into());
        }
        Ok(())
    }

    /// Regularization values evaluated under `plan`
    #[must_use]
    pub fn candidates(&self, plan: &CrossValidationPlan) -> Vec<f64> {
        match plan.cv_type() {
            CvType::Loso => self.config.c_values.clone(),
            CvType::Lolo => vec![DEFAULT_C],
        }
    }

    /// Working copy of the features, session-normalized if configured
    #[must_use]
    pub fn prepare(&self, set: &FeatureSet) -> Array2<f64> {
        let mut work = set.features().data().clone();
        if self.config.normalize_by_session {
            let mut which: Vec<TaskPhase> = self.config.train_phases.clone();
            which.extend(self.config.test_phases.iter().copied());
            which.sort_unstable();
            which.dedup();
            normalize_by_session(&mut work, &set.events().sessions(), &set.events().phases(), &which);
        }
        work
    }

    /// Cross-validate, select, and refit on the subject's true labels.
    pub fn train(&self, set: &FeatureSet, plan: &CrossValidationPlan) -> ClassifyResult<TrainingOutcome> {
        self.check_inputs(set, plan)?;
        let work = self.prepare(set);
        let labels = set.events().recalled();
        let phases = set.events().phases();

        let cv = self.cross_validate(&work, &labels, plan)?;
        let candidates = self.candidates(plan);
        let c = candidates[cv.best];
        tracing::info!(auc = cv.auc, c, cv_type = plan.cv_type().as_str(), "classifier evaluated");

        let test_mask = plan.test_union();
        let test_rows = mask_indices(&test_mask);
        let probs: Vec<f64> = test_rows.iter().map(|&i| cv.probs[[cv.best, i]]).collect();
        let classes: Vec<bool> = test_rows.iter().map(|&i| labels[i]).collect();

        let (model, model_features) = self.fit_final(&work, &labels, &phases, c)?;

        Ok(TrainingOutcome {
            auc: cv.auc,
            c,
            cv_type: plan.cv_type(),
            fold_aucs: cv.fold_aucs,
            bias: cv.bias,
            test_mask,
            probs,
            classes,
            model,
            model_features,
        })
    }

    /// Permutation p-value of `observed` under shuffled recall labels.
    pub fn permutation_p_value(&self, set: &FeatureSet, plan: &CrossValidationPlan, observed: f64) -> ClassifyResult<f64> {
        self.check_inputs(set, plan)?;
        let work = self.prepare(set);
        let labels = set.events().recalled();
        permutation_p_value(observed, &labels, self.config.permutations, self.config.seed, |shuffled| {
            self.cross_validate(&work, shuffled, plan).map(|cv| cv.auc)
        })
    }

    fn check_inputs(&self, set: &FeatureSet, plan: &CrossValidationPlan) -> ClassifyResult<()> {
        if plan.n_events() != set.n_events() {
            return Err(DataError::EventCountMismatch {
                features: set.n_events(),
                events: plan.n_events(),
            }
            .into());
        }
        self.check_plan(plan)
    }

    fn cross_validate(&self, work: &Array2<f64>, labels: &[bool], plan: &CrossValidationPlan) -> ClassifyResult<CrossValidated> {
        let candidates = self.candidates(plan);
        let loso = plan.cv_type() == CvType::Loso;
        let split = self.config.splits_phase_weights();

        let scored: Vec<usize> = plan
            .folds()
            .iter()
            .enumerate()
            .filter_map(|(i, f)| (f.test_mask.contains(&true) && f.train_mask.contains(&true)).then_some(i))
            .collect();
        if scored.is_empty() {
            return Err(DataError::EmptySelection {
                context: "folds with train and test events",
            }
            .into());
        }

        let mut probs = Array2::<f64>::zeros((candidates.len(), labels.len()));
        let mut fold_aucs = Array2::<f64>::zeros((scored.len(), candidates.len()));

        for (ci, &c) in candidates.iter().enumerate() {
            for (row, &fi) in scored.iter().enumerate() {
                let fold = &plan.folds()[fi];
                let train_rows = fold.train_indices();
                let test_rows = fold.test_indices();
                let y_train: Vec<bool> = train_rows.iter().map(|&i| labels[i]).collect();
                let y_test: Vec<bool> = test_rows.iter().map(|&i| labels[i]).collect();
                if !(y_train.contains(&true) && y_train.contains(&false)) {
                    return Err(DataError::SingleClass { context: "training fold" }.into());
                }

                let (x_train, x_test) =
                    normalize_fold(work.view(), fold, &self.config.train_phases, &self.config.test_phases);
                let weights = observation_weights(&y_train, &fold.train_phases, split, self.config.scale_enc);
                let model = self.solver.fit(x_train.view(), &y_train, &weights, c)?;
                let fold_probs = model.predict_proba(x_test.view());

                for (&i, &p) in test_rows.iter().zip(fold_probs.iter()) {
                    probs[[ci, i]] = p;
                }
                if loso {
                    fold_aucs[[row, ci]] = roc_auc(&y_test, &fold_probs.to_vec())?;
                }
            }
            if loso {
                tracing::debug!(c, mean_auc = fold_aucs.column(ci).mean().unwrap_or(f64::NAN), "candidate scored");
            }
        }

        if loso {
            let corrected = bias_corrected_auc(&fold_aucs)?;
            Ok(CrossValidated {
                auc: corrected.auc,
                best: corrected.best,
                probs,
                fold_aucs: Some(fold_aucs),
                bias: Some(corrected.bias),
            })
        } else {
            let rows = mask_indices(&plan.test_union());
            let pooled_labels: Vec<bool> = rows.iter().map(|&i| labels[i]).collect();
            let pooled_probs: Vec<f64> = rows.iter().map(|&i| probs[[0, i]]).collect();
            Ok(CrossValidated {
                auc: roc_auc(&pooled_labels, &pooled_probs)?,
                best: 0,
                probs,
                fold_aucs: None,
                bias: None,
            })
        }
    }

    fn fit_final(
        &self,
        work: &Array2<f64>,
        labels: &[bool],
        phases: &[TaskPhase],
        c: f64,
    ) -> ClassifyResult<(LogisticModel, Array2<f64>)> {
        let rows: Vec<usize> = (0..phases.len())
            .filter(|&i| self.config.train_phases.contains(&phases[i]))
            .collect();
        let y: Vec<bool> = rows.iter().map(|&i| labels[i]).collect();
        if !(y.contains(&true) && y.contains(&false)) {
            return Err(DataError::SingleClass { context: "final model" }.into());
        }
        let row_phases: Vec<TaskPhase> = rows.iter().map(|&i| phases[i]).collect();
        let x = zscore_by_phase(work.select(Axis(0), &rows).view(), &row_phases, &self.config.train_phases);
        let weights = observation_weights(&y, &row_phases, self.config.splits_phase_weights(), self.config.scale_enc);
        let model = self.solver.fit(x.view(), &y, &weights, c)?;
        Ok((model, x))
    }
}
