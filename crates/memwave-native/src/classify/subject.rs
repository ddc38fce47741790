//! Per-subject classification workflow
//!
//! [`SubjectClassifier`] walks one subject through load → plan → classify →
//! (optionally) permutation test. Calling a step before its prerequisite
//! returns a precondition error and leaves the classifier unchanged.

use memwave_core::config::ClassifierConfig;
use memwave_core::error::DataError;
use memwave_core::types::{FeatureSet, TaskPhase};

use super::cross_val::{CrossValidationPlan, CvType};
use super::forward::{forward_model, univariate_tstats};
use super::result::{to_rows, ClassifierResult};
use super::trainer::{terciles, ClassifierTrainer};
use crate::error::{ClassifierError, ClassifyResult};

/// Workflow stage
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassifierStage {
    /// Nothing loaded
    Empty,
    /// Features loaded
    Loaded,
    /// Cross-validation folds built
    Planned,
    /// Result available
    Classified,
}

/// Stateful classifier for one subject.
#[derive(Debug)]
pub struct SubjectClassifier {
    /// Subject id
    subject: String,
    /// Trainer with validated settings
    trainer: ClassifierTrainer,
    /// Loaded features (after exclusions)
    features: Option<FeatureSet>,
    /// Events in the set passed to `load_features`, before filtering
    source_events: usize,
    /// Fold plan
    plan: Option<CrossValidationPlan>,
    /// Latest result
    result: Option<ClassifierResult>,
}

impl SubjectClassifier {
    /// Create for a subject; settings are validated here.
    pub fn new(subject: impl Into<String>, config: ClassifierConfig) -> ClassifyResult<Self> {
        Ok(Self {
            subject: subject.into(),
            trainer: ClassifierTrainer::new(config)?,
            features: None,
            source_events: 0,
            plan: None,
            result: None,
        })
    }

    /// Create with a prepared trainer
    #[must_use]
    pub fn with_trainer(subject: impl Into<String>, trainer: ClassifierTrainer) -> Self {
        Self {
            subject: subject.into(),
            trainer,
            features: None,
            source_events: 0,
            plan: None,
            result: None,
        }
    }

    /// Subject id
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Current stage
    #[must_use]
    pub fn stage(&self) -> ClassifierStage {
        match (&self.features, &self.plan, &self.result) {
            (_, _, Some(_)) => ClassifierStage::Classified,
            (_, Some(_), None) => ClassifierStage::Planned,
            (Some(_), None, None) => ClassifierStage::Loaded,
            (None, None, None) => ClassifierStage::Empty,
        }
    }

    /// Latest result
    #[must_use]
    pub fn result(&self) -> Option<&ClassifierResult> {
        self.result.as_ref()
    }

    /// Consume and return the latest result
    #[must_use]
    pub fn into_result(self) -> Option<ClassifierResult> {
        self.result
    }

    /// Load features for the configured phases.
    ///
    /// Events outside the feature phases are dropped, as are retrieval
    /// events faster than the configured reaction-time floor. Any previous
    /// plan and result are discarded.
    pub fn load_features(&mut self, set: FeatureSet) -> ClassifyResult<()> {
        let config = self.trainer.config();
        let source_events = set.n_events();
        let keep: Vec<bool> = set
            .events()
            .iter()
            .map(|e| {
                let too_fast = matches!(
                    (e.phase, e.reaction_time, config.min_retrieval_rt),
                    (TaskPhase::Retrieval, Some(rt), Some(floor)) if rt < floor
                );
                config.feature_phases.contains(&e.phase) && !too_fast
            })
            .collect();
        let set = if keep.iter().all(|&k| k) { set } else { set.filter_events(&keep) };

        for phase in &config.train_phases {
            if !set.events().iter().any(|e| e.phase == *phase) {
                return Err(DataError::EmptySelection {
                    context: "events in a training phase",
                }
                .into());
            }
        }

        tracing::info!(subject = %self.subject, events = set.n_events(), "features loaded");
        self.features = Some(set);
        self.source_events = source_events;
        self.plan = None;
        self.result = None;
        Ok(())
    }

    /// Build the cross-validation folds.
    pub fn make_cross_val_labels(&mut self) -> ClassifyResult<&CrossValidationPlan> {
        let set = self.features.as_ref().ok_or(ClassifierError::Precondition {
            operation: "make_cross_val_labels",
            missing: "loaded features",
        })?;
        let config = self.trainer.config();
        let plan = CrossValidationPlan::build(set.events(), &config.train_phases, &config.test_phases)?;
        self.trainer.check_plan(&plan)?;
        self.result = None;
        Ok(self.plan.insert(plan))
    }

    /// Train, evaluate, and assemble the result record.
    pub fn classify(&mut self) -> ClassifyResult<&ClassifierResult> {
        let set = self.features.as_ref().ok_or(ClassifierError::Precondition {
            operation: "classify",
            missing: "loaded features",
        })?;
        let plan = self.plan.as_ref().ok_or(ClassifierError::Precondition {
            operation: "classify",
            missing: "cross-validation labels",
        })?;

        let outcome = self.trainer.train(set, plan)?;
        let shape = set.features().shape();
        let forward = forward_model(outcome.model_features.view(), &outcome.model, shape)?;
        let stats = univariate_tstats(set.features().data().view(), &set.events().recalled(), shape)?;
        let tercile_change = terciles(&outcome.probs, &outcome.classes).ok();

        let test_rows: Vec<usize> = outcome
            .test_mask
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| t.then_some(i))
            .collect();
        let events = set.events().as_slice();

        let result = ClassifierResult {
            subj: self.subject.clone(),
            auc: outcome.auc,
            coefficients: outcome.model.coefficients.to_vec(),
            intercept: outcome.model.intercept,
            probs: outcome.probs,
            classes: outcome.classes,
            cv_type: outcome.cv_type,
            sessions: test_rows.iter().map(|&i| events[i].session).collect(),
            fold_keys: test_rows.iter().map(|&i| plan.fold_keys()[i]).collect(),
            task_phase: test_rows.iter().map(|&i| events[i].phase).collect(),
            c: outcome.c,
            fold_aucs: outcome.fold_aucs.as_ref().map(to_rows),
            terciles: tercile_change,
            forward_model: forward.as_ref().map(to_rows),
            univar_ts: to_rows(&stats.t),
            univar_ps: to_rows(&stats.p),
            p_val: None,
            n_events: set.n_events(),
            source_events: self.source_events,
        };
        Ok(self.result.insert(result))
    }

    /// Attach a permutation p-value to the current result.
    pub fn compute_p_value(&mut self) -> ClassifyResult<f64> {
        let (Some(set), Some(plan)) = (self.features.as_ref(), self.plan.as_ref()) else {
            return Err(ClassifierError::Precondition {
                operation: "compute_p_value",
                missing: "cross-validation labels",
            });
        };
        let result = self.result.take().ok_or(ClassifierError::Precondition {
            operation: "compute_p_value",
            missing: "a classifier result",
        })?;

        match self.trainer.permutation_p_value(set, plan, result.auc) {
            Ok(p) => {
                self.result = Some(result.with_p_value(p));
                Ok(p)
            }
            Err(err) => {
                self.result = Some(result);
                Err(err)
            }
        }
    }

    /// Hold-out scheme of the current plan
    #[must_use]
    pub fn cv_type(&self) -> Option<CvType> {
        self.plan.as_ref().map(CrossValidationPlan::cv_type)
    }

    /// Run every step for one subject.
    pub fn run(subject: impl Into<String>, config: ClassifierConfig, set: FeatureSet) -> ClassifyResult<ClassifierResult> {
        let permutations = config.permutations;
        let mut classifier = Self::new(subject, config)?;
        classifier.load_features(set)?;
        classifier.make_cross_val_labels()?;
        classifier.classify()?;
        if permutations > 0 {
            classifier.compute_p_value()?;
        }
        classifier.result.ok_or(ClassifierError::Precondition {
            operation: "run",
            missing: "a classifier result",
        })
    }
}
