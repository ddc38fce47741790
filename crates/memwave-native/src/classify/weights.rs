//! Observation weights for class balancing

use memwave_core::types::TaskPhase;

/// Reciprocal-frequency weights, normalized to mean 1 over observations.
///
/// Categories are the recall label, further split by phase when
/// `split_phases` is set. With `scale_enc`, encoding categories are
/// multiplied by the factor before the final renormalization.
#[must_use]
pub fn observation_weights(
    labels: &[bool],
    phases: &[TaskPhase],
    split_phases: bool,
    scale_enc: Option<f64>,
) -> Vec<f64> {
    let category = |i: usize| -> usize {
        let base = usize::from(labels[i]);
        if split_phases && phases.get(i) == Some(&TaskPhase::Retrieval) {
            base + 2
        } else {
            base
        }
    };

    let mut counts = [0usize; 4];
    for i in 0..labels.len() {
        counts[category(i)] += 1;
    }

    let mut per_category = [0.0f64; 4];
    for (w, &c) in per_category.iter_mut().zip(&counts) {
        if c > 0 {
            *w = 1.0 / c as f64;
        }
    }
    if split_phases {
        if let Some(scale) = scale_enc {
            per_category[0] *= scale;
            per_category[1] *= scale;
        }
    }

    let mut weights: Vec<f64> = (0..labels.len()).map(|i| per_category[category(i)]).collect();
    let mean = weights.iter().sum::<f64>() / weights.len().max(1) as f64;
    if mean > 0.0 {
        for w in &mut weights {
            *w /= mean;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn mean(w: &[f64]) -> f64 {
        w.iter().sum::<f64>() / w.len() as f64
    }

    #[test]
    fn test_classes_balanced_with_unit_mean() {
        let labels = [true, false, false, false, false, true, false, false];
        let phases = [TaskPhase::Encoding; 8];
        let w = observation_weights(&labels, &phases, false, None);
        assert_abs_diff_eq!(mean(&w), 1.0, epsilon = 1e-12);
        let pos: f64 = w.iter().zip(&labels).filter(|(_, &l)| l).map(|(w, _)| w).sum();
        let neg: f64 = w.iter().zip(&labels).filter(|(_, &l)| !l).map(|(w, _)| w).sum();
        assert_abs_diff_eq!(pos, neg, epsilon = 1e-12);
    }

    #[test]
    fn test_encoding_scaling() {
        let labels = [true, false, true, false, true, false];
        let phases = [
            TaskPhase::Encoding,
            TaskPhase::Encoding,
            TaskPhase::Retrieval,
            TaskPhase::Retrieval,
            TaskPhase::Retrieval,
            TaskPhase::Retrieval,
        ];
        let w = observation_weights(&labels, &phases, true, Some(3.0));
        assert_abs_diff_eq!(mean(&w), 1.0, epsilon = 1e-12);
        // encoding singletons: 3 * 1 versus retrieval pairs: 1/2
        assert_abs_diff_eq!(w[0] / w[2], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_mean_for_any_mix() {
        for n_pos in 1..10 {
            let labels: Vec<bool> = (0..12).map(|i| i < n_pos).collect();
            let phases = vec![TaskPhase::Encoding; 12];
            let w = observation_weights(&labels, &phases, false, None);
            assert_abs_diff_eq!(mean(&w), 1.0, epsilon = 1e-12);
        }
    }
}
