//! Statistics used across the analysis stages
//!
//! This module provides:
//! - Column-wise z-scoring and z-mapping of feature matrices
//! - ROC AUC with tie handling
//! - Two-sample t-tests and a 2×2 chi-square test
//! - Percentiles, sample variance, logit
//! - Local maxima of 1-D curves
//! - Circular statistics for phase data

use ndarray::{Array1, Array2, ArrayView2, Axis};
use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

use crate::error::{DataError, DataResult};

// ============================================================================
// Normalization
// ============================================================================

/// Column means and population standard deviations (ddof = 0).
///
/// An empty matrix yields zeros.
#[must_use]
pub fn column_mean_std(x: ArrayView2<'_, f64>) -> (Array1<f64>, Array1<f64>) {
    if x.nrows() == 0 {
        return (Array1::zeros(x.ncols()), Array1::zeros(x.ncols()));
    }
    let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let std = x.std_axis(Axis(0), 0.0);
    (mean, std)
}

/// Z-score each column against its own mean and standard deviation.
///
/// Constant columns map to zero.
#[must_use]
pub fn zscore_columns(x: ArrayView2<'_, f64>) -> Array2<f64> {
    zmap_columns(x, x)
}

/// Express `scores` as z-values relative to the columns of `compare`.
///
/// Columns of `compare` with zero spread map to zero.
#[must_use]
pub fn zmap_columns(scores: ArrayView2<'_, f64>, compare: ArrayView2<'_, f64>) -> Array2<f64> {
    let (mean, std) = column_mean_std(compare);
    let mut out = scores.to_owned();
    for mut row in out.rows_mut() {
        for ((v, &m), &s) in row.iter_mut().zip(mean.iter()).zip(std.iter()) {
            *v = if s > 0.0 { (*v - m) / s } else { 0.0 };
        }
    }
    out
}

// ============================================================================
// Classification Metrics
// ============================================================================

/// Area under the ROC curve.
///
/// Computed from the Mann-Whitney U statistic with average ranks for tied
/// scores. Fails if either class is absent.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> DataResult<f64> {
    if labels.len() != scores.len() {
        return Err(DataError::DimensionMismatch {
            context: "roc auc",
            expected: labels.len(),
            got: scores.len(),
        });
    }
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(DataError::SingleClass { context: "roc auc" });
    }

    let ranks = average_ranks(scores);
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l)
        .map(|(r, _)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// 1-based ranks with ties sharing their mean rank
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

// ============================================================================
// Hypothesis Tests
// ============================================================================

/// Two-sample test statistic and two-sided p-value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TestResult {
    /// Test statistic
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

/// Independent two-sample t-test with pooled variance.
pub fn ttest_ind(a: &[f64], b: &[f64]) -> DataResult<TestResult> {
    let n1 = a.len();
    let n2 = b.len();
    if n1 + n2 < 3 || n1 == 0 || n2 == 0 {
        return Err(DataError::EmptySelection { context: "t-test groups" });
    }
    let m1 = a.iter().sum::<f64>() / n1 as f64;
    let m2 = b.iter().sum::<f64>() / n2 as f64;
    let ss1: f64 = a.iter().map(|v| (v - m1).powi(2)).sum();
    let ss2: f64 = b.iter().map(|v| (v - m2).powi(2)).sum();
    pooled_t(m1 - m2, ss1 + ss2, n1, n2)
}

/// Column-wise independent t-test between the rows of `a` and `b`.
///
/// Returns (t statistics, p-values), one per column.
pub fn ttest_ind_columns(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
) -> DataResult<(Array1<f64>, Array1<f64>)> {
    if a.ncols() != b.ncols() {
        return Err(DataError::DimensionMismatch {
            context: "t-test columns",
            expected: a.ncols(),
            got: b.ncols(),
        });
    }
    let n1 = a.nrows();
    let n2 = b.nrows();
    if n1 == 0 || n2 == 0 || n1 + n2 < 3 {
        return Err(DataError::EmptySelection { context: "t-test groups" });
    }
    let (m1, s1) = column_mean_std(a);
    let (m2, s2) = column_mean_std(b);

    let mut ts = Array1::zeros(a.ncols());
    let mut ps = Array1::zeros(a.ncols());
    for col in 0..a.ncols() {
        let ss = s1[col].powi(2) * n1 as f64 + s2[col].powi(2) * n2 as f64;
        let res = pooled_t(m1[col] - m2[col], ss, n1, n2)?;
        ts[col] = res.statistic;
        ps[col] = res.p_value;
    }
    Ok((ts, ps))
}

fn pooled_t(mean_diff: f64, sum_sq: f64, n1: usize, n2: usize) -> DataResult<TestResult> {
    let df = (n1 + n2 - 2) as f64;
    let pooled_var = sum_sq / df;
    let se = (pooled_var * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();

    if se == 0.0 {
        return Ok(if mean_diff == 0.0 {
            TestResult { statistic: 0.0, p_value: 1.0 }
        } else {
            TestResult {
                statistic: mean_diff.signum() * f64::INFINITY,
                p_value: 0.0,
            }
        });
    }

    let t = mean_diff / se;
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|_| DataError::NonFinite { context: "t distribution" })?;
    Ok(TestResult {
        statistic: t,
        p_value: (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
    })
}

/// Chi-square test of equal proportions for two groups (no continuity
/// correction). Returns the statistic and p-value.
pub fn chi_square_proportions(successes: [u64; 2], totals: [u64; 2]) -> DataResult<TestResult> {
    if totals.iter().any(|&t| t == 0) || successes[0] > totals[0] || successes[1] > totals[1] {
        return Err(DataError::EmptySelection { context: "proportion groups" });
    }
    let observed = [
        [successes[0] as f64, (totals[0] - successes[0]) as f64],
        [successes[1] as f64, (totals[1] - successes[1]) as f64],
    ];
    let n = (totals[0] + totals[1]) as f64;
    let col_totals = [observed[0][0] + observed[1][0], observed[0][1] + observed[1][1]];

    let mut chi2 = 0.0;
    for (row, &row_total) in observed.iter().zip(&totals) {
        for (o, &col_total) in row.iter().zip(&col_totals) {
            let expected = row_total as f64 * col_total / n;
            if expected == 0.0 {
                return Ok(TestResult { statistic: 0.0, p_value: 1.0 });
            }
            chi2 += (o - expected).powi(2) / expected;
        }
    }

    let dist = ChiSquared::new(1.0).map_err(|_| DataError::NonFinite { context: "chi-square distribution" })?;
    Ok(TestResult {
        statistic: chi2,
        p_value: (1.0 - dist.cdf(chi2)).clamp(0.0, 1.0),
    })
}

// ============================================================================
// Descriptive Helpers
// ============================================================================

/// Unbiased sample variance (ddof = 1); zero for fewer than two values.
#[must_use]
pub fn sample_variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (x.len() - 1) as f64
}

/// Log-odds of a probability, clamped away from 0 and 1.
#[inline]
#[must_use]
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-15, 1.0 - 1e-15);
    (p / (1.0 - p)).ln()
}

/// Logistic function.
#[inline]
#[must_use]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Percentile with linear interpolation between order statistics.
///
/// `q` is in percent. Returns `None` for empty input.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Indices of strict local maxima of a curve.
///
/// A point qualifies only when it is strictly above both neighbors, so the
/// first and last points never qualify and flat tops yield nothing.
#[must_use]
pub fn local_maxima(curve: &[f64]) -> Vec<usize> {
    curve
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2])
        .map(|(i, _)| i + 1)
        .collect()
}

// ============================================================================
// Circular Statistics
// ============================================================================

/// Circular statistics on angles in radians
pub mod circular {
    /// Mean direction
    #[must_use]
    pub fn mean(angles: &[f64]) -> f64 {
        let (s, c) = angles
            .iter()
            .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
        s.atan2(c)
    }

    /// Mean resultant vector length in [0, 1]
    #[must_use]
    pub fn resultant_length(angles: &[f64]) -> f64 {
        if angles.is_empty() {
            return 0.0;
        }
        let n = angles.len() as f64;
        let (s, c) = angles
            .iter()
            .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
        ((s / n).powi(2) + (c / n).powi(2)).sqrt()
    }

    /// Signed angular difference `a - b`, wrapped to (-π, π]
    #[inline]
    #[must_use]
    pub fn diff(a: f64, b: f64) -> f64 {
        let d = a - b;
        d.sin().atan2(d.cos())
    }

    /// Circular-circular correlation coefficient
    #[must_use]
    pub fn corrcc(a: &[f64], b: &[f64]) -> f64 {
        let a_bar = mean(a);
        let b_bar = mean(b);
        let mut num = 0.0;
        let mut den_a = 0.0;
        let mut den_b = 0.0;
        for (&x, &y) in a.iter().zip(b) {
            let sa = (x - a_bar).sin();
            let sb = (y - b_bar).sin();
            num += sa * sb;
            den_a += sa * sa;
            den_b += sb * sb;
        }
        let den = (den_a * den_b).sqrt();
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_zscore_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let z = zscore_columns(x.view());
        assert_abs_diff_eq!(z[[0, 0]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[[1, 0]], 1.0, epsilon = 1e-12);
        // constant column
        assert_eq!(z[[0, 1]], 0.0);
    }

    #[test]
    fn test_zmap_uses_reference_stats() {
        let reference = array![[0.0], [2.0]];
        let scores = array![[3.0]];
        let z = zmap_columns(scores.view(), reference.view());
        assert_abs_diff_eq!(z[[0, 0]], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roc_auc_perfect_and_ties() {
        let labels = [false, false, true, true];
        assert_abs_diff_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_abs_diff_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
        assert_abs_diff_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
        // one positive ties with one negative
        assert_abs_diff_eq!(roc_auc(&labels, &[0.1, 0.5, 0.5, 0.9]).unwrap(), 0.875);
    }

    #[test]
    fn test_roc_auc_single_class() {
        assert!(matches!(
            roc_auc(&[true, true], &[0.1, 0.2]),
            Err(DataError::SingleClass { .. })
        ));
    }

    #[test]
    fn test_ttest_matches_reference() {
        // scipy.stats.ttest_ind([1,2,3,4],[3,4,5,6]) -> t = -2.1908902, p = 0.0710
        let res = ttest_ind(&[1.0, 2.0, 3.0, 4.0], &[3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_abs_diff_eq!(res.statistic, -2.190_890_2, epsilon = 1e-6);
        assert_abs_diff_eq!(res.p_value, 0.0710, epsilon = 1e-3);
    }

    #[test]
    fn test_ttest_columns_agree_with_scalar() {
        let a = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]];
        let b = array![[3.0, 0.0], [4.0, 1.0], [5.0, 0.0], [6.0, 1.0]];
        let (ts, ps) = ttest_ind_columns(a.view(), b.view()).unwrap();
        assert_abs_diff_eq!(ts[0], -2.190_890_2, epsilon = 1e-6);
        assert_abs_diff_eq!(ts[1], 0.0);
        assert_abs_diff_eq!(ps[1], 1.0);
        assert!(ps[0] < 0.1);
    }

    #[test]
    fn test_chi_square_proportions() {
        // equal proportions -> statistic 0
        let res = chi_square_proportions([10, 20], [20, 40]).unwrap();
        assert_abs_diff_eq!(res.statistic, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.p_value, 1.0, epsilon = 1e-9);

        let res = chi_square_proportions([5, 30], [40, 40]).unwrap();
        assert!(res.p_value < 0.001);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_abs_diff_eq!(percentile(&v, 50.0).unwrap(), 2.5);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_local_maxima() {
        assert_eq!(local_maxima(&[0.0, 0.0, 2.0, 0.0, 0.0]), vec![2]);
        assert_eq!(local_maxima(&[0.0, 3.0, 1.0, 4.0, 2.0]), vec![1, 3]);
        assert!(local_maxima(&[0.0, 0.0, 0.0]).is_empty());
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_local_maxima_skips_edges_and_plateaus() {
        // rising and falling edges at either end are not maxima
        assert!(local_maxima(&[0.0, 1.0, 2.0]).is_empty());
        assert!(local_maxima(&[3.0, 1.0, 0.0]).is_empty());
        assert_eq!(local_maxima(&[3.0, 1.0, 2.0, 0.0, 5.0]), vec![2]);
        // flat tops have no strict maximum
        assert!(local_maxima(&[0.0, 2.0, 2.0, 0.0]).is_empty());
        assert_eq!(local_maxima(&[0.0, 2.0, 2.0, 0.0, 1.0, 0.0]), vec![4]);
    }

    #[test]
    fn test_sample_variance_and_logit() {
        assert_abs_diff_eq!(sample_variance(&[1.0, 2.0, 3.0]), 1.0);
        assert_abs_diff_eq!(logit(0.5), 0.0);
        assert_abs_diff_eq!(sigmoid(logit(0.8)), 0.8, epsilon = 1e-12);
        assert!(logit(1.0).is_finite());
    }

    #[test]
    fn test_circular_helpers() {
        use std::f64::consts::PI;
        assert_abs_diff_eq!(circular::diff(0.1, 2.0 * PI - 0.1), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(circular::mean(&[0.1, -0.1]), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(circular::resultant_length(&[1.0, 1.0, 1.0]), 1.0, epsilon = 1e-12);
        let a = [0.1, 0.5, 1.0, 1.6, 2.2];
        assert_abs_diff_eq!(circular::corrcc(&a, &a), 1.0, epsilon = 1e-12);
    }
}
