//! Oscillation cluster extraction
//!
//! For every frequency window whose peak count is a local maximum across
//! windows, electrodes with a peak in that window are linked through the
//! adjacency relation and split into strongly connected components. Large
//! enough components become clusters.

use std::collections::BTreeMap;

use memwave_core::config::ClusterConfig;
use memwave_core::error::DataError;
use memwave_core::math::local_maxima;
use memwave_core::types::Electrode;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::adjacency::AdjacencyMatrix;
use super::peaks::{frequency_windows, PeakMatrix, SpectralPeaks};
use crate::error::ClusterResult;

/// A spatially contiguous group of electrodes sharing a spectral peak.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Center of the window the cluster was found in (Hz)
    pub center_hz: f64,
    /// Member electrode indices, ascending
    pub electrodes: Vec<usize>,
    /// Peak frequency of each member, aligned with `electrodes` (Hz)
    pub electrode_freqs: Vec<f64>,
    /// Mean of `electrode_freqs` (Hz)
    pub mean_freq: f64,
}

impl Cluster {
    /// Number of member electrodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.electrodes.len()
    }

    /// True if the cluster has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.electrodes.is_empty()
    }
}

/// Clusters found in one window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterGroup {
    /// Window center (Hz)
    pub center_hz: f64,
    /// Index of the window in the layout
    pub window: usize,
    /// Clusters, ordered by their smallest electrode index
    pub clusters: Vec<Cluster>,
}

/// All clusters of a subject, keyed by window center in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMap {
    groups: Vec<ClusterGroup>,
}

impl ClusterMap {
    /// Groups in ascending center order
    #[must_use]
    pub fn groups(&self) -> &[ClusterGroup] {
        &self.groups
    }

    /// Clusters at a window center
    #[must_use]
    pub fn get(&self, center_hz: f64) -> Option<&[Cluster]> {
        self.groups
            .iter()
            .find(|g| (g.center_hz - center_hz).abs() < 1e-9)
            .map(|g| g.clusters.as_slice())
    }

    /// Number of windows with at least one cluster
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when no clusters were found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every cluster, window by window
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.groups.iter().flat_map(|g| g.clusters.iter())
    }

    /// Total number of clusters
    #[must_use]
    pub fn total_clusters(&self) -> usize {
        self.groups.iter().map(|g| g.clusters.len()).sum()
    }
}

/// Finds oscillation clusters from spectral peaks and electrode geometry.
#[derive(Clone, Debug)]
pub struct ClusterExtractor {
    config: ClusterConfig,
}

impl ClusterExtractor {
    /// Create an extractor with validated settings
    pub fn new(config: ClusterConfig) -> ClusterResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Which electrodes may join clusters, by contact type
    #[must_use]
    pub fn allowed_mask(&self, electrodes: &[Electrode]) -> Vec<bool> {
        electrodes.iter().map(|e| self.config.allows(e.kind)).collect()
    }

    /// Full pass from electrode descriptors and detected peaks.
    pub fn run(&self, electrodes: &[Electrode], peaks: &SpectralPeaks) -> ClusterResult<ClusterMap> {
        let adjacency =
            AdjacencyMatrix::from_electrodes(electrodes, self.config.min_elec_dist, self.config.separate_hemis);
        let allowed = self.allowed_mask(electrodes);
        self.extract(peaks, &adjacency, &allowed)
    }

    /// Extract clusters on the configured window layout.
    pub fn extract(
        &self,
        peaks: &SpectralPeaks,
        adjacency: &AdjacencyMatrix,
        allowed: &[bool],
    ) -> ClusterResult<ClusterMap> {
        let windows = frequency_windows(peaks.freqs(), self.config.cluster_freq_range, self.config.window_step);
        let binned = PeakMatrix::from_peaks(peaks, &windows, allowed)?;
        self.extract_binned(&binned, peaks, adjacency)
    }

    /// Extract clusters from already binned peaks.
    ///
    /// `peaks` supplies the precise per-electrode frequencies.
    pub fn extract_binned(
        &self,
        binned: &PeakMatrix,
        peaks: &SpectralPeaks,
        adjacency: &AdjacencyMatrix,
    ) -> ClusterResult<ClusterMap> {
        let n = binned.n_electrodes();
        for (context, got) in [("adjacency matrix", adjacency.len()), ("spectral peaks", peaks.n_electrodes())] {
            if got != n {
                return Err(DataError::DimensionMismatch {
                    context,
                    expected: n,
                    got,
                }
                .into());
            }
        }

        let mut by_center: BTreeMap<usize, ClusterGroup> = BTreeMap::new();
        for w in local_maxima(&binned.peak_counts()) {
            let window = binned.windows()[w];
            let members = binned.electrodes_in(w);
            let mut clusters = Vec::new();
            for component in strongly_connected(adjacency, &members) {
                if component.len() < self.config.min_num_elecs {
                    continue;
                }
                let electrode_freqs: Vec<f64> = component
                    .iter()
                    .map(|&e| peaks.nearest_peak(e, &window).unwrap_or(window.center_hz))
                    .collect();
                let mean_freq = electrode_freqs.iter().sum::<f64>() / electrode_freqs.len() as f64;
                clusters.push(Cluster {
                    center_hz: window.center_hz,
                    electrodes: component,
                    electrode_freqs,
                    mean_freq,
                });
            }
            if !clusters.is_empty() {
                clusters.sort_by_key(|c| c.electrodes[0]);
                tracing::debug!(center_hz = window.center_hz, count = clusters.len(), "clusters found");
                by_center.insert(
                    w,
                    ClusterGroup {
                        center_hz: window.center_hz,
                        window: w,
                        clusters,
                    },
                );
            }
        }

        Ok(ClusterMap {
            groups: by_center.into_values().collect(),
        })
    }
}

/// Strongly connected components of the adjacency graph restricted to `nodes`.
///
/// Each component is returned sorted ascending.
fn strongly_connected(adjacency: &AdjacencyMatrix, nodes: &[usize]) -> Vec<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), 0);
    let index: Vec<NodeIndex> = nodes.iter().map(|&e| graph.add_node(e)).collect();
    for (a, &ea) in nodes.iter().enumerate() {
        for (b, &eb) in nodes.iter().enumerate() {
            if a != b && adjacency.is_near(ea, eb) {
                graph.add_edge(index[a], index[b], ());
            }
        }
    }
    tarjan_scc(&graph)
        .into_iter()
        .map(|scc| {
            let mut members: Vec<usize> = scc.into_iter().map(|ix| graph[ix]).collect();
            members.sort_unstable();
            members
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwave_core::types::ElectrodeType;
    use nalgebra::Point3;
    use ndarray::Array2;

    fn config(min_num_elecs: usize) -> ClusterConfig {
        ClusterConfig {
            min_num_elecs,
            cluster_freq_range: 0.5,
            window_step: 1.0,
            ..ClusterConfig::default()
        }
    }

    fn line_electrodes(xs: &[f64]) -> Vec<Electrode> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| Electrode::new(format!("E{i}"), ElectrodeType::Grid, Point3::new(x, 10.0, 0.0)))
            .collect()
    }

    fn peaks_at(freqs: &[f64], n_elec: usize, hits: &[(usize, usize)]) -> SpectralPeaks {
        let mut flags = Array2::from_elem((freqs.len(), n_elec), false);
        for &(f, e) in hits {
            flags[[f, e]] = true;
        }
        SpectralPeaks::new(freqs.to_vec(), flags).unwrap()
    }

    #[test]
    fn test_adjacent_pair_forms_cluster() {
        let freqs = [2.0, 3.0, 4.0, 5.0, 6.0];
        let electrodes = line_electrodes(&[10.0, 20.0, 60.0]);
        let peaks = peaks_at(&freqs, 3, &[(2, 0), (2, 1)]);
        let extractor = ClusterExtractor::new(config(2)).unwrap();

        let map = extractor.run(&electrodes, &peaks).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.groups()[0].window, 2);
        let clusters = map.get(4.0).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].electrodes, vec![0, 1]);
        assert_eq!(clusters[0].electrode_freqs, vec![4.0, 4.0]);
    }

    #[test]
    fn test_two_distant_pairs_peak_in_one_window() {
        // {0,1} and {2,3} are 5 mm pairs, 50 mm from each other
        let freqs = [2.0, 3.0, 4.0, 5.0, 6.0];
        let electrodes = line_electrodes(&[10.0, 15.0, 60.0, 65.0]);
        let peaks = peaks_at(&freqs, 4, &[(2, 0), (2, 1)]);
        let cfg = |min_num_elecs| ClusterConfig {
            min_elec_dist: 15.0,
            ..config(min_num_elecs)
        };

        let map = ClusterExtractor::new(cfg(2)).unwrap().run(&electrodes, &peaks).unwrap();
        assert_eq!(map.total_clusters(), 1);
        assert_eq!(map.groups()[0].window, 2);
        let clusters = map.get(4.0).unwrap();
        assert_eq!(clusters[0].electrodes, vec![0, 1]);

        let map = ClusterExtractor::new(cfg(4)).unwrap().run(&electrodes, &peaks).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_peak_in_edge_window_is_not_a_center() {
        let freqs = [2.0, 3.0, 4.0, 5.0, 6.0];
        let electrodes = line_electrodes(&[10.0, 15.0, 20.0]);
        let peaks = peaks_at(&freqs, 3, &[(0, 0), (0, 1), (4, 1), (4, 2)]);
        let map = ClusterExtractor::new(config(2)).unwrap().run(&electrodes, &peaks).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_no_peaks_no_clusters() {
        let freqs = [3.0, 4.0, 5.0, 6.0];
        let electrodes = line_electrodes(&[10.0, 15.0, 20.0, 25.0]);
        let peaks = SpectralPeaks::empty(freqs.to_vec(), 4);
        let map = ClusterExtractor::new(config(1)).unwrap().run(&electrodes, &peaks).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_min_size_filters_and_components_split() {
        let freqs = [4.0, 5.0, 6.0];
        // Two groups of three, 80 mm apart
        let electrodes = line_electrodes(&[10.0, 20.0, 30.0, 110.0, 120.0, 130.0]);
        let hits: Vec<(usize, usize)> = (0..6).map(|e| (1, e)).collect();
        let peaks = peaks_at(&freqs, 6, &hits);

        let map = ClusterExtractor::new(config(3)).unwrap().run(&electrodes, &peaks).unwrap();
        let clusters = map.get(5.0).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].electrodes, vec![0, 1, 2]);
        assert_eq!(clusters[1].electrodes, vec![3, 4, 5]);
        assert!(map.iter().all(|c| c.len() >= 3));

        let map = ClusterExtractor::new(config(4)).unwrap().run(&electrodes, &peaks).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_disallowed_types_excluded() {
        let freqs = [4.0, 5.0, 6.0];
        let mut electrodes = line_electrodes(&[10.0, 20.0, 30.0]);
        electrodes[1].kind = ElectrodeType::Depth;
        let peaks = peaks_at(&freqs, 3, &[(1, 0), (1, 1), (1, 2)]);
        let cfg = ClusterConfig {
            elec_types_allowed: vec![ElectrodeType::Grid],
            ..config(2)
        };
        // Without the depth contact the two grid contacts are 20 mm apart
        let map = ClusterExtractor::new(cfg).unwrap().run(&electrodes, &peaks).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let freqs = [3.0, 4.0, 5.0, 6.0, 7.0];
        let electrodes = line_electrodes(&[0.5, 8.0, 16.0, 24.0, 32.0, 40.0]);
        let hits = [(1, 0), (1, 1), (1, 2), (3, 3), (3, 4), (3, 5), (1, 4)];
        let peaks = peaks_at(&freqs, 6, &hits);
        let extractor = ClusterExtractor::new(config(2)).unwrap();
        let first = extractor.run(&electrodes, &peaks).unwrap();
        let second = extractor.run(&electrodes, &peaks).unwrap();
        assert_eq!(first, second);
        for cluster in first.iter() {
            assert!(cluster.electrodes.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let freqs = [4.0, 5.0, 6.0];
        let peaks = peaks_at(&freqs, 2, &[]);
        let adjacency = AdjacencyMatrix::from_coordinates(&[Point3::origin()], 15.0, true);
        let extractor = ClusterExtractor::new(config(1)).unwrap();
        assert!(extractor.extract(&peaks, &adjacency, &[true, true]).is_err());
    }
}
