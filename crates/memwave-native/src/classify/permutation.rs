//! Label-permutation significance test for the classifier AUC

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::ClassifyResult;

/// Shuffled copy of `labels`; permutation `index` of the stream seeded by `seed`.
#[must_use]
pub fn shuffled_labels(labels: &[bool], seed: u64, index: usize) -> Vec<bool> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    let mut shuffled = labels.to_vec();
    shuffled.shuffle(&mut rng);
    shuffled
}

/// Fraction of permuted AUCs strictly above `observed`.
///
/// `score` is run once per shuffled label vector, in parallel. The first
/// failing permutation aborts the test and its error is returned.
pub fn permutation_p_value<F>(observed: f64, labels: &[bool], n_permutations: usize, seed: u64, score: F) -> ClassifyResult<f64>
where
    F: Fn(&[bool]) -> ClassifyResult<f64> + Sync,
{
    if n_permutations == 0 {
        return Ok(1.0);
    }
    let null: Vec<f64> = (0..n_permutations)
        .into_par_iter()
        .map(|i| score(&shuffled_labels(labels, seed, i)))
        .collect::<ClassifyResult<Vec<f64>>>()?;

    let exceed = null.iter().filter(|&&auc| auc > observed).count();
    Ok(exceed as f64 / n_permutations as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;

    #[test]
    fn test_shuffles_are_reproducible_and_distinct() {
        let labels: Vec<bool> = (0..20).map(|i| i % 3 == 0).collect();
        assert_eq!(shuffled_labels(&labels, 7, 1), shuffled_labels(&labels, 7, 1));
        assert_ne!(shuffled_labels(&labels, 7, 1), shuffled_labels(&labels, 7, 2));
        let kept = shuffled_labels(&labels, 7, 3).iter().filter(|&&l| l).count();
        assert_eq!(kept, labels.iter().filter(|&&l| l).count());
    }

    #[test]
    fn test_p_value_counts_strict_exceedances() {
        let labels = vec![true, false, true, false];
        let p = permutation_p_value(0.5, &labels, 10, 0, |_| Ok(0.5)).unwrap();
        assert!(p.abs() < f64::EPSILON);
        let p = permutation_p_value(0.5, &labels, 10, 0, |_| Ok(0.9)).unwrap();
        assert!((p - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_propagates() {
        let labels = vec![true, false];
        let err = permutation_p_value(0.5, &labels, 8, 0, |_| {
            Err(ClassifierError::Solver {
                reason: "boom".to_string(),
            })
        });
        assert!(err.is_err());
    }
}
