//! Weighted, regularized logistic regression
//!
//! Both solvers minimize `penalty(β) + C Σ wᵢ log(1 + exp(-yᵢ (xᵢ·β + b)))`
//! with labels `yᵢ ∈ {-1, +1}`. The intercept `b` is never penalized.
//!
//! - [`NewtonCgSolver`]: L2 penalty `½‖β‖²`, truncated Newton with
//!   conjugate-gradient inner solves and a backtracking line search
//! - [`ProximalSolver`]: L1 penalty `‖β‖₁`, accelerated proximal gradient
//!   with backtracking

use memwave_core::config::{Penalty, SolverOptions};
use memwave_core::error::DataError;
use memwave_core::math::sigmoid;
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, ClassifyResult};

/// Fitted linear model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// One weight per feature
    pub coefficients: Array1<f64>,
    /// Unpenalized offset
    pub intercept: f64,
}

impl LogisticModel {
    /// Log-odds of the positive class
    #[must_use]
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    /// Probability of the positive class
    #[must_use]
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        self.decision_function(x).mapv(sigmoid)
    }
}

/// A way of fitting [`LogisticModel`]s.
pub trait LogisticSolver: Send + Sync {
    /// Fit on rows of `x` with boolean labels and per-row weights at
    /// inverse regularization strength `c`.
    fn fit(&self, x: ArrayView2<'_, f64>, labels: &[bool], weights: &[f64], c: f64) -> ClassifyResult<LogisticModel>;
}

/// Solver matching a penalty norm
#[must_use]
pub fn solver_for(penalty: Penalty, options: SolverOptions) -> Box<dyn LogisticSolver> {
    match penalty {
        Penalty::L2 => Box::new(NewtonCgSolver::new(options)),
        Penalty::L1 => Box::new(ProximalSolver::new(options)),
    }
}

// ============================================================================
// Shared Objective
// ============================================================================

/// Data term of the objective with `C` folded into the weights.
struct Problem<'a> {
    x: ArrayView2<'a, f64>,
    y: Array1<f64>,
    sw: Array1<f64>,
}

/// Data loss, gradient, and Hessian diagonal at one point
struct Evaluation {
    loss: f64,
    grad_coef: Array1<f64>,
    grad_intercept: f64,
    curvature: Array1<f64>,
}

impl<'a> Problem<'a> {
    fn new(x: ArrayView2<'a, f64>, labels: &[bool], weights: &[f64], c: f64) -> ClassifyResult<Self> {
        for (context, got) in [("logistic labels", labels.len()), ("logistic weights", weights.len())] {
            if got != x.nrows() {
                return Err(DataError::DimensionMismatch {
                    context,
                    expected: x.nrows(),
                    got,
                }
                .into());
            }
        }
        if x.nrows() == 0 {
            return Err(DataError::EmptySelection {
                context: "logistic training rows",
            }
            .into());
        }
        let y = labels.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();
        let sw = weights.iter().map(|w| w * c).collect();
        Ok(Self { x, y, sw })
    }

    fn margins(&self, coef: &Array1<f64>, intercept: f64) -> Array1<f64> {
        (self.x.dot(coef) + intercept) * &self.y
    }

    fn loss(&self, coef: &Array1<f64>, intercept: f64) -> f64 {
        self.margins(coef, intercept)
            .iter()
            .zip(self.sw.iter())
            .map(|(&m, &w)| w * softplus(-m))
            .sum()
    }

    fn evaluate(&self, coef: &Array1<f64>, intercept: f64) -> Evaluation {
        let m = self.margins(coef, intercept);
        let mut loss = 0.0;
        let mut residual = Array1::zeros(m.len());
        let mut curvature = Array1::zeros(m.len());
        for i in 0..m.len() {
            let s = sigmoid(m[i]);
            loss += self.sw[i] * softplus(-m[i]);
            residual[i] = self.sw[i] * (s - 1.0) * self.y[i];
            curvature[i] = self.sw[i] * s * (1.0 - s);
        }
        Evaluation {
            loss,
            grad_coef: self.x.t().dot(&residual),
            grad_intercept: residual.sum(),
            curvature,
        }
    }

    /// Hessian of the data term times a direction
    fn hess_vec(&self, curvature: &Array1<f64>, v_coef: &Array1<f64>, v_intercept: f64) -> (Array1<f64>, f64) {
        let z = (self.x.dot(v_coef) + v_intercept) * curvature;
        (self.x.t().dot(&z), z.sum())
    }
}

/// `log(1 + exp(z))` without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn check_finite(model: LogisticModel) -> ClassifyResult<LogisticModel> {
    if model.intercept.is_finite() && model.coefficients.iter().all(|v| v.is_finite()) {
        Ok(model)
    } else {
        Err(ClassifierError::Solver {
            reason: "non-finite coefficients".to_string(),
        })
    }
}

fn max_abs(v: &Array1<f64>, extra: f64) -> f64 {
    v.iter().fold(extra.abs(), |acc, x| acc.max(x.abs()))
}

// ============================================================================
// L2: Truncated Newton
// ============================================================================

/// Ridge-penalized solver.
#[derive(Clone, Debug, Default)]
pub struct NewtonCgSolver {
    options: SolverOptions,
}

impl NewtonCgSolver {
    /// Create with stopping rules
    #[must_use]
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Approximately solve `H p = -g` by conjugate gradients.
    fn newton_direction(
        problem: &Problem<'_>,
        curvature: &Array1<f64>,
        g_coef: &Array1<f64>,
        g_intercept: f64,
    ) -> (Array1<f64>, f64) {
        let hess = |v: &Array1<f64>, vb: f64| -> (Array1<f64>, f64) {
            let (hv, hb) = problem.hess_vec(curvature, v, vb);
            // ridge term on β only; tiny damping keeps the intercept direction well posed
            (hv + v, hb + 1e-10 * vb)
        };

        let g_norm = (g_coef.dot(g_coef) + g_intercept * g_intercept).sqrt();
        let tol = 0.5_f64.min(g_norm.sqrt()) * g_norm;
        let max_steps = (g_coef.len() + 1).min(250);

        let mut p = Array1::<f64>::zeros(g_coef.len());
        let mut pb = 0.0;
        let mut r = -g_coef;
        let mut rb = -g_intercept;
        let mut d = r.clone();
        let mut db = rb;
        let mut rs = r.dot(&r) + rb * rb;

        for step in 0..max_steps {
            if rs.sqrt() <= tol {
                break;
            }
            let (hd, hdb) = hess(&d, db);
            let curv = d.dot(&hd) + db * hdb;
            if curv <= 0.0 {
                if step == 0 {
                    return (-g_coef, -g_intercept);
                }
                break;
            }
            let alpha = rs / curv;
            p.scaled_add(alpha, &d);
            pb += alpha * db;
            r.scaled_add(-alpha, &hd);
            rb -= alpha * hdb;
            let rs_next = r.dot(&r) + rb * rb;
            let beta = rs_next / rs;
            d = &r + &(d * beta);
            db = rb + beta * db;
            rs = rs_next;
        }
        (p, pb)
    }
}

impl LogisticSolver for NewtonCgSolver {
    fn fit(&self, x: ArrayView2<'_, f64>, labels: &[bool], weights: &[f64], c: f64) -> ClassifyResult<LogisticModel> {
        let problem = Problem::new(x, labels, weights, c)?;
        let mut coef = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;
        let mut initial_norm: Option<f64> = None;

        for _ in 0..self.options.max_iter {
            let eval = problem.evaluate(&coef, intercept);
            let objective = 0.5 * coef.dot(&coef) + eval.loss;
            let g_coef = &coef + &eval.grad_coef;
            let g_intercept = eval.grad_intercept;

            let g_norm = max_abs(&g_coef, g_intercept);
            let reference = *initial_norm.get_or_insert(g_norm);
            if g_norm <= self.options.tolerance * reference || g_norm < 1e-12 {
                break;
            }

            let (p, pb) = Self::newton_direction(&problem, &eval.curvature, &g_coef, g_intercept);
            let slope = g_coef.dot(&p) + g_intercept * pb;
            if slope >= 0.0 {
                break;
            }

            let mut step = 1.0;
            let mut accepted = false;
            for _ in 0..40 {
                let trial = &coef + &(&p * step);
                let trial_b = intercept + step * pb;
                let f = 0.5 * trial.dot(&trial) + problem.loss(&trial, trial_b);
                if f <= objective + 1e-4 * step * slope {
                    coef = trial;
                    intercept = trial_b;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                break;
            }
        }

        check_finite(LogisticModel {
            coefficients: coef,
            intercept,
        })
    }
}

// ============================================================================
// L1: Accelerated Proximal Gradient
// ============================================================================

/// Lasso-penalized solver.
#[derive(Clone, Debug, Default)]
pub struct ProximalSolver {
    options: SolverOptions,
}

impl ProximalSolver {
    /// Create with stopping rules
    #[must_use]
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

impl LogisticSolver for ProximalSolver {
    fn fit(&self, x: ArrayView2<'_, f64>, labels: &[bool], weights: &[f64], c: f64) -> ClassifyResult<LogisticModel> {
        let problem = Problem::new(x, labels, weights, c)?;
        let mut coef = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;
        let mut y_coef = coef.clone();
        let mut y_intercept = intercept;
        let mut t = 1.0_f64;
        let mut lipschitz = 1.0_f64;

        for _ in 0..self.options.max_iter * 50 {
            let eval = problem.evaluate(&y_coef, y_intercept);

            let (next_coef, next_intercept) = loop {
                let step = 1.0 / lipschitz;
                let cand: Array1<f64> = y_coef
                    .iter()
                    .zip(eval.grad_coef.iter())
                    .map(|(&v, &g)| soft_threshold(v - step * g, step))
                    .collect();
                let cand_b = y_intercept - step * eval.grad_intercept;

                let diff = &cand - &y_coef;
                let diff_b = cand_b - y_intercept;
                let model_bound = eval.loss
                    + eval.grad_coef.dot(&diff)
                    + eval.grad_intercept * diff_b
                    + 0.5 * lipschitz * (diff.dot(&diff) + diff_b * diff_b);
                if problem.loss(&cand, cand_b) <= model_bound + 1e-12 {
                    break (cand, cand_b);
                }
                lipschitz *= 2.0;
                if lipschitz > 1e20 {
                    return Err(ClassifierError::Solver {
                        reason: "step size underflow in proximal gradient".to_string(),
                    });
                }
            };

            let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            let momentum = (t - 1.0) / t_next;
            let delta = &next_coef - &coef;
            let delta_b = next_intercept - intercept;
            y_coef = &next_coef + &(&delta * momentum);
            y_intercept = next_intercept + momentum * delta_b;

            let change = max_abs(&delta, delta_b);
            let scale = max_abs(&next_coef, next_intercept).max(1.0);
            coef = next_coef;
            intercept = next_intercept;
            t = t_next;
            if change <= self.options.tolerance * 1e-2 * scale {
                break;
            }
        }

        check_finite(LogisticModel {
            coefficients: coef,
            intercept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn tight() -> SolverOptions {
        SolverOptions {
            max_iter: 200,
            tolerance: 1e-8,
        }
    }

    fn overlapping() -> (Array2<f64>, Vec<bool>) {
        let x = array![[-2.0, 0.3], [-1.0, -0.2], [-0.5, 0.1], [0.5, -0.4], [1.0, 0.2], [2.0, 0.0]];
        let labels = vec![false, false, true, false, true, true];
        (x, labels)
    }

    #[test]
    fn test_newton_reaches_stationary_point() {
        let (x, labels) = overlapping();
        let weights = vec![1.0; 6];
        let model = NewtonCgSolver::new(tight()).fit(x.view(), &labels, &weights, 10.0).unwrap();
        assert!(model.coefficients[0] > 0.0);

        let problem = Problem::new(x.view(), &labels, &weights, 10.0).unwrap();
        let eval = problem.evaluate(&model.coefficients, model.intercept);
        let g = &model.coefficients + &eval.grad_coef;
        assert!(max_abs(&g, eval.grad_intercept) < 1e-5);
    }

    #[test]
    fn test_weights_scale_like_regularization() {
        let (x, labels) = overlapping();
        let solver = NewtonCgSolver::new(tight());
        let doubled = solver.fit(x.view(), &labels, &[2.0; 6], 0.5).unwrap();
        let plain = solver.fit(x.view(), &labels, &[1.0; 6], 1.0).unwrap();
        for (a, b) in doubled.coefficients.iter().zip(plain.coefficients.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(doubled.intercept, plain.intercept, epsilon = 1e-6);
    }

    #[test]
    fn test_probabilities_follow_feature() {
        let (x, labels) = overlapping();
        let model = NewtonCgSolver::default().fit(x.view(), &labels, &[1.0; 6], 1.0).unwrap();
        let probs = model.predict_proba(x.view());
        assert!(probs[5] > probs[0]);
        assert!(probs.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_lasso_strong_penalty_zeroes_coefficients() {
        let (x, labels) = overlapping();
        let model = ProximalSolver::new(tight()).fit(x.view(), &labels, &[1.0; 6], 1e-3).unwrap();
        assert!(model.coefficients.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_lasso_keeps_informative_feature() {
        let x = array![[-2.0, 0.0], [-1.5, 0.0], [-1.0, 0.0], [1.0, 0.0], [1.5, 0.0], [2.0, 0.0], [0.2, 0.0], [-0.2, 0.0]];
        let labels = vec![false, false, false, true, true, true, false, true];
        let model = ProximalSolver::new(tight()).fit(x.view(), &labels, &[1.0; 8], 5.0).unwrap();
        assert!(model.coefficients[0] > 0.0);
        assert_abs_diff_eq!(model.coefficients[1], 0.0);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (x, labels) = overlapping();
        let err = NewtonCgSolver::default().fit(x.view(), &labels[..3], &[1.0; 6], 1.0);
        assert!(matches!(err, Err(ClassifierError::Data(_))));
    }
}
