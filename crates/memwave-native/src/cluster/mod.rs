//! Oscillation cluster detection
//!
//! - [`adjacency`]: Electrode neighbor relation from coordinates
//! - [`peaks`]: Frequency windows, peak detection, window binning
//! - [`extractor`]: Connected-component clustering per frequency window

pub mod adjacency;
pub mod extractor;
pub mod peaks;

pub use adjacency::AdjacencyMatrix;
pub use extractor::{Cluster, ClusterExtractor, ClusterGroup, ClusterMap};
pub use peaks::{
    frequency_windows, mean_power_spectrum, BackgroundPeakDetector, FrequencyWindow, PeakDetector, PeakMatrix,
    SpectralPeaks,
};
