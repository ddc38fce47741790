//! Feature normalization on working copies
//!
//! Nothing here touches the caller's feature matrix. Session normalization
//! works in place on a copy the trainer owns; fold normalization returns
//! fresh train and test matrices.

use memwave_core::math::{zmap_columns, zscore_columns};
use memwave_core::types::TaskPhase;
use ndarray::{Array2, ArrayView2, Axis};

use super::cross_val::Fold;

/// Z-score each (session, phase) block of `x` in place, for the listed phases.
pub fn normalize_by_session(x: &mut Array2<f64>, sessions: &[u32], phases: &[TaskPhase], which: &[TaskPhase]) {
    let mut unique: Vec<u32> = sessions.to_vec();
    unique.sort_unstable();
    unique.dedup();

    for session in unique {
        for phase in which {
            let rows: Vec<usize> = sessions
                .iter()
                .zip(phases)
                .enumerate()
                .filter_map(|(i, (s, p))| (*s == session && p == phase).then_some(i))
                .collect();
            if rows.is_empty() {
                continue;
            }
            let block = zscore_columns(x.select(Axis(0), &rows).view());
            write_rows(x, &rows, &block);
        }
    }
}

/// Z-score each phase subset of `x` independently, returning a new matrix.
#[must_use]
pub fn zscore_by_phase(x: ArrayView2<'_, f64>, phases: &[TaskPhase], which: &[TaskPhase]) -> Array2<f64> {
    let mut out = x.to_owned();
    for phase in which {
        let rows = phase_rows(phases, *phase);
        if rows.is_empty() {
            continue;
        }
        let block = zscore_columns(x.select(Axis(0), &rows).view());
        write_rows(&mut out, &rows, &block);
    }
    out
}

/// Build the normalized train and test matrices of one fold.
///
/// Training rows are z-scored within each training phase. A test phase that
/// is also trained on is expressed relative to the raw training rows of that
/// phase; any other test phase is z-scored on its own.
#[must_use]
pub fn normalize_fold(
    x: ArrayView2<'_, f64>,
    fold: &Fold,
    train_phases: &[TaskPhase],
    test_phases: &[TaskPhase],
) -> (Array2<f64>, Array2<f64>) {
    let raw_train = x.select(Axis(0), &fold.train_indices());
    let raw_test = x.select(Axis(0), &fold.test_indices());

    let train = zscore_by_phase(raw_train.view(), &fold.train_phases, train_phases);

    let mut test = raw_test.clone();
    for phase in test_phases {
        let rows = phase_rows(&fold.test_phases, *phase);
        if rows.is_empty() {
            continue;
        }
        let block = raw_test.select(Axis(0), &rows);
        let reference = phase_rows(&fold.train_phases, *phase);
        let mapped = if train_phases.contains(phase) && !reference.is_empty() {
            zmap_columns(block.view(), raw_train.select(Axis(0), &reference).view())
        } else {
            zscore_columns(block.view())
        };
        write_rows(&mut test, &rows, &mapped);
    }
    (train, test)
}

fn phase_rows(phases: &[TaskPhase], phase: TaskPhase) -> Vec<usize> {
    phases
        .iter()
        .enumerate()
        .filter_map(|(i, p)| (*p == phase).then_some(i))
        .collect()
}

fn write_rows(dst: &mut Array2<f64>, rows: &[usize], block: &Array2<f64>) {
    for (src_row, &r) in block.rows().into_iter().zip(rows) {
        dst.row_mut(r).assign(&src_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_session_blocks_normalized_separately() {
        let mut x = array![[1.0], [3.0], [10.0], [30.0]];
        let sessions = [0, 0, 1, 1];
        let phases = [TaskPhase::Encoding; 4];
        normalize_by_session(&mut x, &sessions, &phases, &[TaskPhase::Encoding]);
        assert_abs_diff_eq!(x[[0, 0]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[3, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fold_test_rows_mapped_onto_train_statistics() {
        let x = array![[0.0], [2.0], [4.0], [100.0]];
        let fold = Fold {
            key: 1,
            train_mask: vec![true, true, false, false],
            test_mask: vec![false, false, true, true],
            train_phases: vec![TaskPhase::Encoding, TaskPhase::Encoding],
            test_phases: vec![TaskPhase::Encoding, TaskPhase::Retrieval],
        };
        let (train, test) = normalize_fold(x.view(), &fold, &[TaskPhase::Encoding], &[
            TaskPhase::Encoding,
            TaskPhase::Retrieval,
        ]);
        assert_abs_diff_eq!(train[[0, 0]], -1.0, epsilon = 1e-12);
        // 4.0 relative to train mean 1, std 1
        assert_abs_diff_eq!(test[[0, 0]], 3.0, epsilon = 1e-12);
        // lone retrieval row has zero spread
        assert_abs_diff_eq!(test[[1, 0]], 0.0, epsilon = 1e-12);
        // caller data untouched
        assert_abs_diff_eq!(x[[3, 0]], 100.0);
    }
}
