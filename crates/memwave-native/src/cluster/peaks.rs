//! Spectral peak detection and frequency-window binning
//!
//! Provides:
//! - Overlapping frequency windows over the analyzed frequencies
//! - A [`PeakDetector`] seam with a background-fit detector
//! - [`PeakMatrix`]: per-window, per-electrode "has a peak" flags

use memwave_core::error::{DataError, DataResult};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Slack added past the last frequency when laying out window centers (Hz)
const CENTER_SLACK_HZ: f64 = 0.001;

// ============================================================================
// Frequency Windows
// ============================================================================

/// Closed frequency interval around a center.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrequencyWindow {
    /// Window center (Hz)
    pub center_hz: f64,
    /// Lower edge (Hz, inclusive)
    pub low_hz: f64,
    /// Upper edge (Hz, inclusive)
    pub high_hz: f64,
}

impl FrequencyWindow {
    /// Window of total width `width_hz` around `center_hz`
    #[must_use]
    pub fn around(center_hz: f64, width_hz: f64) -> Self {
        Self {
            center_hz,
            low_hz: center_hz - width_hz / 2.0,
            high_hz: center_hz + width_hz / 2.0,
        }
    }

    /// Whether a frequency falls inside the window
    #[inline]
    #[must_use]
    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

/// Lay out windows whose centers run from the first to the last analyzed
/// frequency in `step_hz` increments.
#[must_use]
pub fn frequency_windows(freqs: &[f64], width_hz: f64, step_hz: f64) -> Vec<FrequencyWindow> {
    let (Some(&first), Some(&last)) = (freqs.first(), freqs.last()) else {
        return Vec::new();
    };
    if !(step_hz > 0.0) {
        return Vec::new();
    }
    let stop = last + CENTER_SLACK_HZ;
    (0_u32..)
        .map(|k| first + f64::from(k) * step_hz)
        .take_while(|&c| c < stop)
        .map(|c| FrequencyWindow::around(c, width_hz))
        .collect()
}

// ============================================================================
// Spectral Peaks
// ============================================================================

/// Peak flags on the analyzed frequency grid, frequency × electrode.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralPeaks {
    freqs: Vec<f64>,
    peaks: Array2<bool>,
}

impl SpectralPeaks {
    /// Wrap a frequency × electrode flag matrix
    pub fn new(freqs: Vec<f64>, peaks: Array2<bool>) -> DataResult<Self> {
        if peaks.nrows() != freqs.len() {
            return Err(DataError::DimensionMismatch {
                context: "spectral peaks frequency axis",
                expected: freqs.len(),
                got: peaks.nrows(),
            });
        }
        Ok(Self { freqs, peaks })
    }

    /// No peaks anywhere
    #[must_use]
    pub fn empty(freqs: Vec<f64>, n_electrodes: usize) -> Self {
        let peaks = Array2::from_elem((freqs.len(), n_electrodes), false);
        Self { freqs, peaks }
    }

    /// Analyzed frequencies (Hz)
    #[must_use]
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Number of electrodes
    #[must_use]
    pub fn n_electrodes(&self) -> usize {
        self.peaks.ncols()
    }

    /// Whether electrode `electrode` peaks at frequency index `freq_idx`
    #[inline]
    #[must_use]
    pub fn is_peak(&self, freq_idx: usize, electrode: usize) -> bool {
        self.peaks[[freq_idx, electrode]]
    }

    /// Peak frequency of `electrode` inside `window` closest to its center.
    ///
    /// Ties resolve to the lower frequency.
    #[must_use]
    pub fn nearest_peak(&self, electrode: usize, window: &FrequencyWindow) -> Option<f64> {
        let mut best: Option<f64> = None;
        for (i, &f) in self.freqs.iter().enumerate() {
            if !window.contains(f) || !self.peaks[[i, electrode]] {
                continue;
            }
            match best {
                Some(b) if (b - window.center_hz).abs() <= (f - window.center_hz).abs() => {}
                _ => best = Some(f),
            }
        }
        best
    }
}

/// Finds narrowband peaks in mean power spectra.
pub trait PeakDetector {
    /// Detect peaks.
    ///
    /// # Arguments
    ///
    /// * `freqs` - Analyzed frequencies (Hz), ascending
    /// * `mean_power` - Mean power, frequency × electrode
    fn detect(&self, freqs: &[f64], mean_power: ArrayView2<'_, f64>) -> DataResult<SpectralPeaks>;
}

/// Peak detector that removes the 1/f background with a straight-line fit
/// in log-log space and flags local maxima of the residual that rise above
/// a minimum height.
#[derive(Clone, Debug)]
pub struct BackgroundPeakDetector {
    /// Smallest residual (log10 power) counted as a peak
    pub min_residual: f64,
}

impl Default for BackgroundPeakDetector {
    fn default() -> Self {
        Self { min_residual: 0.0 }
    }
}

impl BackgroundPeakDetector {
    /// Residual of log10 power after removing the log-log linear trend
    fn residual(log_f: &[f64], log_p: &[f64]) -> Vec<f64> {
        let n = log_f.len() as f64;
        let mean_x = log_f.iter().sum::<f64>() / n;
        let mean_y = log_p.iter().sum::<f64>() / n;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (&x, &y) in log_f.iter().zip(log_p) {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x) * (x - mean_x);
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;
        log_f
            .iter()
            .zip(log_p)
            .map(|(&x, &y)| y - (intercept + slope * x))
            .collect()
    }
}

impl PeakDetector for BackgroundPeakDetector {
    fn detect(&self, freqs: &[f64], mean_power: ArrayView2<'_, f64>) -> DataResult<SpectralPeaks> {
        if mean_power.nrows() != freqs.len() {
            return Err(DataError::DimensionMismatch {
                context: "mean power frequency axis",
                expected: freqs.len(),
                got: mean_power.nrows(),
            });
        }
        if freqs.iter().any(|&f| !(f > 0.0)) || mean_power.iter().any(|&p| !(p > 0.0) || !p.is_finite()) {
            return Err(DataError::NonFinite {
                context: "log power spectrum",
            });
        }

        let n_freqs = freqs.len();
        let mut peaks = Array2::from_elem((n_freqs, mean_power.ncols()), false);
        if n_freqs < 3 {
            return SpectralPeaks::new(freqs.to_vec(), peaks);
        }

        let log_f: Vec<f64> = freqs.iter().map(|f| f.log10()).collect();
        for (e, column) in mean_power.axis_iter(Axis(1)).enumerate() {
            let log_p: Vec<f64> = column.iter().map(|p| p.log10()).collect();
            let resid = Self::residual(&log_f, &log_p);
            for i in 1..n_freqs - 1 {
                if resid[i] > resid[i - 1] && resid[i] > resid[i + 1] && resid[i] > self.min_residual {
                    peaks[[i, e]] = true;
                }
            }
        }
        SpectralPeaks::new(freqs.to_vec(), peaks)
    }
}

/// Average a power array (event × frequency × electrode) over events.
pub fn mean_power_spectrum(power: ArrayView3<'_, f64>) -> DataResult<Array2<f64>> {
    power.mean_axis(Axis(0)).ok_or(DataError::EmptySelection {
        context: "power spectrum events",
    })
}

// ============================================================================
// Window Binning
// ============================================================================

/// Window × electrode flags: does the electrode have any peak in the window.
#[derive(Clone, Debug, PartialEq)]
pub struct PeakMatrix {
    windows: Vec<FrequencyWindow>,
    flags: Array2<bool>,
}

impl PeakMatrix {
    /// Bin spectral peaks into windows.
    ///
    /// Electrodes whose `allowed` entry is false never carry a flag.
    pub fn from_peaks(peaks: &SpectralPeaks, windows: &[FrequencyWindow], allowed: &[bool]) -> DataResult<Self> {
        if allowed.len() != peaks.n_electrodes() {
            return Err(DataError::DimensionMismatch {
                context: "electrode allow mask",
                expected: peaks.n_electrodes(),
                got: allowed.len(),
            });
        }
        let mut flags = Array2::from_elem((windows.len(), peaks.n_electrodes()), false);
        for (w, window) in windows.iter().enumerate() {
            for (f_idx, &f) in peaks.freqs().iter().enumerate() {
                if !window.contains(f) {
                    continue;
                }
                for (e, &ok) in allowed.iter().enumerate() {
                    if ok && peaks.is_peak(f_idx, e) {
                        flags[[w, e]] = true;
                    }
                }
            }
        }
        Ok(Self {
            windows: windows.to_vec(),
            flags,
        })
    }

    /// Wrap precomputed flags
    pub fn new(windows: Vec<FrequencyWindow>, flags: Array2<bool>) -> DataResult<Self> {
        if flags.nrows() != windows.len() {
            return Err(DataError::DimensionMismatch {
                context: "peak matrix window axis",
                expected: windows.len(),
                got: flags.nrows(),
            });
        }
        Ok(Self { windows, flags })
    }

    /// The windows, in ascending center order
    #[must_use]
    pub fn windows(&self) -> &[FrequencyWindow] {
        &self.windows
    }

    /// Number of electrodes
    #[must_use]
    pub fn n_electrodes(&self) -> usize {
        self.flags.ncols()
    }

    /// Whether `electrode` has a peak in window `window`
    #[inline]
    #[must_use]
    pub fn has_peak(&self, window: usize, electrode: usize) -> bool {
        self.flags[[window, electrode]]
    }

    /// Electrodes with a peak in window `window`
    #[must_use]
    pub fn electrodes_in(&self, window: usize) -> Vec<usize> {
        self.flags
            .row(window)
            .iter()
            .enumerate()
            .filter_map(|(e, &p)| p.then_some(e))
            .collect()
    }

    /// Number of electrodes with a peak, per window
    #[must_use]
    pub fn peak_counts(&self) -> Vec<f64> {
        self.flags
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|&&p| p).count() as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_window_layout() {
        let freqs: Vec<f64> = (2..=10).map(f64::from).collect();
        let windows = frequency_windows(&freqs, 2.0, 1.0);
        assert_eq!(windows.len(), 9);
        assert_abs_diff_eq!(windows[0].low_hz, 1.0);
        assert_abs_diff_eq!(windows[8].center_hz, 10.0);
        assert!(windows[3].contains(4.0) && windows[3].contains(6.0));
        assert!(frequency_windows(&[], 2.0, 1.0).is_empty());
    }

    #[test]
    fn test_nearest_peak_prefers_lower_on_tie() {
        let freqs = vec![3.0, 4.0, 5.0];
        let mut flags = Array2::from_elem((3, 1), false);
        flags[[0, 0]] = true;
        flags[[2, 0]] = true;
        let peaks = SpectralPeaks::new(freqs, flags).unwrap();
        let window = FrequencyWindow::around(4.0, 2.0);
        assert_eq!(peaks.nearest_peak(0, &window), Some(3.0));
    }

    #[test]
    fn test_background_detector_finds_bump() {
        let freqs: Vec<f64> = (1..=20).map(f64::from).collect();
        let mut power = Array2::zeros((20, 2));
        for (i, &f) in freqs.iter().enumerate() {
            let background = 1.0 / f;
            power[[i, 0]] = background;
            power[[i, 1]] = if (f - 8.0).abs() < 0.5 { background * 4.0 } else { background };
        }
        let detector = BackgroundPeakDetector { min_residual: 1e-6 };
        let peaks = detector.detect(&freqs, power.view()).unwrap();
        assert!(peaks.is_peak(7, 1));
        assert!((0..20).all(|i| !peaks.is_peak(i, 0)));
    }

    #[test]
    fn test_detector_rejects_nonpositive_power() {
        let power = Array2::zeros((3, 1));
        let err = BackgroundPeakDetector::default().detect(&[1.0, 2.0, 3.0], power.view());
        assert!(err.is_err());
    }

    #[test]
    fn test_binning_respects_allow_mask() {
        let freqs = vec![4.0, 5.0, 6.0];
        let mut flags = Array2::from_elem((3, 2), false);
        flags[[1, 0]] = true;
        flags[[1, 1]] = true;
        let peaks = SpectralPeaks::new(freqs.clone(), flags).unwrap();
        let windows = frequency_windows(&freqs, 0.5, 1.0);
        let binned = PeakMatrix::from_peaks(&peaks, &windows, &[true, false]).unwrap();
        assert_eq!(binned.electrodes_in(1), vec![0]);
        assert_eq!(binned.peak_counts(), vec![0.0, 1.0, 0.0]);
    }
}
