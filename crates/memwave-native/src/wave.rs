//! Traveling-wave statistics for oscillation clusters
//!
//! Cluster electrode positions are projected onto their best-fit plane and,
//! at each time point, a plane wave `phase ≈ a·x + b·y + offset` is fitted
//! by circular-linear regression. The direction `θ` and spatial frequency
//! `r` (`a = r cos θ`, `b = r sin θ`) are chosen from a grid to maximize the
//! resultant length of the residual phase.
//!
//! [`subsequent_memory_effect`] contrasts a cluster's band power between
//! recalled and not-recalled events.

use memwave_core::config::WaveConfig;
use memwave_core::error::DataError;
use memwave_core::math::{circular, ttest_ind_columns, zscore_columns};
use memwave_core::types::EventTable;
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{WaveError, WaveResult};

/// Electrodes needed to fit a plane wave
pub const MIN_WAVE_ELECTRODES: usize = 3;

/// Fitted plane wave at one time point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveFit {
    /// Propagation direction (radians)
    pub direction: f64,
    /// Spatial frequency (radians of phase per mm)
    pub spatial_freq: f64,
    /// Phase offset (radians)
    pub offset: f64,
    /// Squared circular correlation between observed and predicted phase
    pub r_squared: f64,
}

/// Wave fits for one cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterWaves {
    /// Projected electrode coordinates (mm)
    pub coords: Vec<[f64; 2]>,
    /// One fit per time point
    pub per_time: Vec<WaveFit>,
    /// Fit to the time-averaged relative phases
    pub mean: WaveFit,
    /// Recall contrast of the cluster's power, when power was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sme: Option<SubsequentMemoryEffect>,
}

/// Recalled vs not-recalled power contrast, each field electrode × time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsequentMemoryEffect {
    /// Mean z-power of recalled minus not-recalled events
    pub delta_z: Vec<Vec<f64>>,
    /// Two-sample t-statistics
    pub t: Vec<Vec<f64>>,
    /// Two-sided p-values
    pub p: Vec<Vec<f64>>,
}

/// Project 3-D positions onto their two principal axes, centered.
pub fn project_to_plane(points: &[Point3<f64>]) -> WaveResult<Vec<[f64; 2]>> {
    if points.len() < MIN_WAVE_ELECTRODES {
        return Err(WaveError::TooFewElectrodes {
            got: points.len(),
            need: MIN_WAVE_ELECTRODES,
        });
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let centered: Vec<Vector3<f64>> = points.iter().map(|p| p.coords - centroid).collect();
    let cov: Matrix3<f64> = centered.iter().fold(Matrix3::zeros(), |acc, v| acc + v * v.transpose()) / n;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let first: Vector3<f64> = eigen.eigenvectors.column(order[0]).clone_owned();
    let second: Vector3<f64> = eigen.eigenvectors.column(order[1]).clone_owned();

    Ok(centered.iter().map(|v| [v.dot(&first), v.dot(&second)]).collect())
}

/// Phases relative to the across-electrode circular mean at each time point.
///
/// Input and output are electrode × time.
#[must_use]
pub fn relative_phases(raw: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = raw.to_owned();
    for mut column in out.axis_iter_mut(Axis(1)) {
        let reference = circular::mean(&column.to_vec());
        column.mapv_inplace(|p| circular::diff(p, reference));
    }
    out
}

/// Grid-search circular-linear regression.
#[derive(Clone, Debug)]
pub struct WaveFitter {
    /// (direction, spatial frequency) pairs in radians, direction-major
    grid: Vec<(f64, f64)>,
}

impl WaveFitter {
    /// Build the search grid
    pub fn new(config: &WaveConfig) -> WaveResult<Self> {
        config.validate()?;
        let thetas = degree_steps(config.max_angle_deg, config.angle_step_deg);
        let rs = degree_steps(config.max_spatial_freq_deg, config.spatial_freq_step_deg);
        let grid = thetas
            .iter()
            .flat_map(|&t| rs.iter().map(move |&r| (t, r)))
            .collect();
        Ok(Self { grid })
    }

    /// Number of grid points searched
    #[must_use]
    pub fn grid_len(&self) -> usize {
        self.grid.len()
    }

    /// Fit one time point.
    pub fn fit(&self, coords: &[[f64; 2]], phases: &[f64]) -> WaveResult<WaveFit> {
        if coords.len() < MIN_WAVE_ELECTRODES {
            return Err(WaveError::TooFewElectrodes {
                got: coords.len(),
                need: MIN_WAVE_ELECTRODES,
            });
        }
        if phases.len() != coords.len() {
            return Err(DataError::DimensionMismatch {
                context: "wave phases",
                expected: coords.len(),
                got: phases.len(),
            }
            .into());
        }

        let residual = |theta: f64, r: f64| -> Vec<f64> {
            let (a, b) = (r * theta.cos(), r * theta.sin());
            coords
                .iter()
                .zip(phases)
                .map(|(c, &p)| p - a * c[0] - b * c[1])
                .collect()
        };

        let mut best = (0.0, 0.0);
        let mut best_r = f64::NEG_INFINITY;
        for &(theta, r) in &self.grid {
            let length = circular::resultant_length(&residual(theta, r));
            if length > best_r {
                best_r = length;
                best = (theta, r);
            }
        }

        let (direction, spatial_freq) = best;
        let offset = circular::mean(&residual(direction, spatial_freq));
        let (a, b) = (spatial_freq * direction.cos(), spatial_freq * direction.sin());
        let predicted: Vec<f64> = coords
            .iter()
            .map(|c| (a * c[0] + b * c[1] + offset).rem_euclid(std::f64::consts::TAU))
            .collect();
        let rho = circular::corrcc(phases, &predicted);

        Ok(WaveFit {
            direction,
            spatial_freq,
            offset,
            r_squared: rho * rho,
        })
    }

    /// Fit every time point of an electrode × time phase matrix, in parallel.
    pub fn fit_series(&self, coords: &[[f64; 2]], phases: ArrayView2<'_, f64>) -> WaveResult<Vec<WaveFit>> {
        if phases.nrows() != coords.len() {
            return Err(DataError::DimensionMismatch {
                context: "wave phase electrodes",
                expected: coords.len(),
                got: phases.nrows(),
            }
            .into());
        }
        (0..phases.ncols())
            .into_par_iter()
            .map(|t| self.fit(coords, &phases.column(t).to_vec()))
            .collect()
    }

    /// Project positions, convert raw phases to relative phases, and fit
    /// both every time point and the time-averaged phases.
    pub fn fit_cluster(&self, positions: &[Point3<f64>], raw_phases: ArrayView2<'_, f64>) -> WaveResult<ClusterWaves> {
        let coords = project_to_plane(positions)?;
        let rel = relative_phases(raw_phases);
        let per_time = self.fit_series(&coords, rel.view())?;
        let mean_phase: Vec<f64> = rel.rows().into_iter().map(|row| circular::mean(&row.to_vec())).collect();
        let mean = self.fit(&coords, &mean_phase)?;
        tracing::debug!(time_points = per_time.len(), r_squared = mean.r_squared, "cluster waves fitted");
        Ok(ClusterWaves {
            coords,
            per_time,
            mean,
            sme: None,
        })
    }
}

// ============================================================================
// Subsequent memory effect
// ============================================================================

/// Recall contrast of cluster power (event × electrode × time).
///
/// Power is z-scored within each session, then recalled and not-recalled
/// events are compared at every electrode and time point.
pub fn subsequent_memory_effect(power: ArrayView3<'_, f64>, events: &EventTable) -> WaveResult<SubsequentMemoryEffect> {
    let (n_events, n_elecs, n_times) = power.dim();
    if n_events != events.len() {
        return Err(DataError::EventCountMismatch {
            features: n_events,
            events: events.len(),
        }
        .into());
    }
    if n_elecs == 0 || n_times == 0 {
        return Err(DataError::EmptySelection { context: "cluster power" }.into());
    }

    let flat = Array2::from_shape_fn((n_events, n_elecs * n_times), |(ev, col)| {
        power[[ev, col / n_times, col % n_times]]
    });
    let sessions = events.sessions();
    let mut z = Array2::<f64>::zeros(flat.raw_dim());
    for session in events.unique_sessions() {
        let rows: Vec<usize> = (0..n_events).filter(|&i| sessions[i] == session).collect();
        let block = zscore_columns(flat.select(Axis(0), &rows).view());
        for (&row, values) in rows.iter().zip(block.rows()) {
            z.row_mut(row).assign(&values);
        }
    }

    let recalled = events.recalled();
    let (rec, nrec): (Vec<usize>, Vec<usize>) = (0..n_events).partition(|&i| recalled[i]);
    let rec = z.select(Axis(0), &rec);
    let nrec = z.select(Axis(0), &nrec);
    let (t, p) = ttest_ind_columns(rec.view(), nrec.view())?;
    let delta_z = column_mean(&rec) - column_mean(&nrec);

    tracing::debug!(events = n_events, recalled = rec.nrows(), "cluster memory effect computed");
    Ok(SubsequentMemoryEffect {
        delta_z: by_electrode(&delta_z, n_times),
        t: by_electrode(&t, n_times),
        p: by_electrode(&p, n_times),
    })
}

fn column_mean(x: &Array2<f64>) -> Array1<f64> {
    x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Split an electrode-major flat vector into per-electrode rows
fn by_electrode(values: &Array1<f64>, n_times: usize) -> Vec<Vec<f64>> {
    values.to_vec().chunks(n_times).map(<[f64]>::to_vec).collect()
}

/// `0, step, 2·step, … ≤ max` in degrees, returned in radians
fn degree_steps(max_deg: f64, step_deg: f64) -> Vec<f64> {
    (0_u32..)
        .map(|k| f64::from(k) * step_deg)
        .take_while(|&d| d <= max_deg + 1e-9)
        .map(f64::to_radians)
        .collect()
}
