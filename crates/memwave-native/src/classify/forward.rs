//! Interpretable views of a fitted classifier
//!
//! - Forward model: classifier weights mapped back into feature covariance
//!   space, `A = cov(X)·w / var(logit(p))`
//! - Univariate recalled-vs-not-recalled t-statistics per feature
//!
//! Both are laid out electrode × (frequency · time bin).

use memwave_core::error::{DataError, DataResult};
use memwave_core::math::{logit, sample_variance, ttest_ind_columns};
use memwave_core::types::FeatureShape;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::cross_val::mask_indices;
use super::logistic::LogisticModel;

/// Per-feature t-statistics and p-values, electrode × frequency.
#[derive(Clone, Debug, PartialEq)]
pub struct UnivariateStats {
    /// Recalled minus not-recalled t-statistics
    pub t: Array2<f64>,
    /// Two-sided p-values
    pub p: Array2<f64>,
}

/// Forward model of `model` over the rows of `x`.
///
/// Returns `None` when features span more than one time bin or when the
/// predicted log-odds do not vary.
pub fn forward_model(
    x: ArrayView2<'_, f64>,
    model: &LogisticModel,
    shape: FeatureShape,
) -> DataResult<Option<Array2<f64>>> {
    if shape.n_time_bins != 1 {
        return Ok(None);
    }
    if x.ncols() != model.coefficients.len() {
        return Err(DataError::DimensionMismatch {
            context: "forward model coefficients",
            expected: x.ncols(),
            got: model.coefficients.len(),
        });
    }
    let n = x.nrows();
    if n < 2 {
        return Err(DataError::EmptySelection {
            context: "forward model events",
        });
    }

    let log_odds: Vec<f64> = model.predict_proba(x).iter().map(|&p| logit(p)).collect();
    let var_s = sample_variance(&log_odds);
    if !(var_s > 0.0) {
        tracing::debug!("predicted log-odds are constant; forward model skipped");
        return Ok(None);
    }

    let mean = x.mean_axis(Axis(0)).ok_or(DataError::EmptySelection {
        context: "forward model events",
    })?;
    let centered = &x - &mean;
    let projected = centered.dot(&model.coefficients);
    let a = centered.t().dot(&projected) / ((n - 1) as f64 * var_s);
    by_electrode(a, shape).map(Some)
}

/// Recalled vs not-recalled t-test on every feature column.
pub fn univariate_tstats(x: ArrayView2<'_, f64>, labels: &[bool], shape: FeatureShape) -> DataResult<UnivariateStats> {
    if labels.len() != x.nrows() {
        return Err(DataError::DimensionMismatch {
            context: "univariate labels",
            expected: x.nrows(),
            got: labels.len(),
        });
    }
    let recalled = mask_indices(labels);
    let not_recalled: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i]).collect();
    if recalled.is_empty() || not_recalled.is_empty() {
        return Err(DataError::SingleClass {
            context: "univariate statistics",
        });
    }
    let (t, p) = ttest_ind_columns(
        x.select(Axis(0), &recalled).view(),
        x.select(Axis(0), &not_recalled).view(),
    )?;
    Ok(UnivariateStats {
        t: by_electrode(t, shape)?,
        p: by_electrode(p, shape)?,
    })
}

fn by_electrode(values: Array1<f64>, shape: FeatureShape) -> DataResult<Array2<f64>> {
    let cols = shape.n_freqs * shape.n_time_bins;
    let got = values.len();
    values
        .into_shape_with_order((shape.n_electrodes, cols))
        .map_err(|_| DataError::FeatureShapeMismatch {
            expected: shape.n_features(),
            got,
        })
}
