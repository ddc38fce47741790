//! Spatial adjacency between electrodes
//!
//! Two electrodes are neighbors when their Euclidean distance is strictly
//! between zero and the threshold. Optionally the left hemisphere is pushed
//! 100 mm away first so no neighbor pair crosses the midline.

use memwave_core::types::Electrode;
use nalgebra::{Point3, Vector3};
use ndarray::Array2;

/// Offset applied to left-hemisphere x coordinates when hemispheres are kept apart (mm)
pub const HEMISPHERE_OFFSET_MM: f64 = 100.0;

/// Symmetric electrode × electrode neighbor relation with a false diagonal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    near: Array2<bool>,
}

impl AdjacencyMatrix {
    /// Build from raw coordinates (mm).
    ///
    /// # Arguments
    ///
    /// * `coords` - Electrode positions
    /// * `threshold_mm` - Pairs closer than this are neighbors
    /// * `separate_hemis` - Shift x < 0 contacts by -100 mm before measuring
    #[must_use]
    pub fn from_coordinates(coords: &[Point3<f64>], threshold_mm: f64, separate_hemis: bool) -> Self {
        let shifted: Vec<Point3<f64>> = coords
            .iter()
            .map(|p| {
                if separate_hemis && p.x < 0.0 {
                    p - Vector3::new(HEMISPHERE_OFFSET_MM, 0.0, 0.0)
                } else {
                    *p
                }
            })
            .collect();

        let n = shifted.len();
        let mut near = Array2::from_elem((n, n), false);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = nalgebra::distance(&shifted[i], &shifted[j]);
                if d > 0.0 && d < threshold_mm {
                    near[[i, j]] = true;
                    near[[j, i]] = true;
                }
            }
        }
        Self { near }
    }

    /// Build from electrode descriptors
    #[must_use]
    pub fn from_electrodes(electrodes: &[Electrode], threshold_mm: f64, separate_hemis: bool) -> Self {
        let coords: Vec<Point3<f64>> = electrodes.iter().map(|e| e.position).collect();
        Self::from_coordinates(&coords, threshold_mm, separate_hemis)
    }

    /// Number of electrodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.near.nrows()
    }

    /// True when there are no electrodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.near.nrows() == 0
    }

    /// Whether electrodes `i` and `j` are neighbors
    #[inline]
    #[must_use]
    pub fn is_near(&self, i: usize, j: usize) -> bool {
        self.near[[i, j]]
    }

    /// Neighbors of electrode `i`
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.near
            .row(i)
            .into_iter()
            .enumerate()
            .filter_map(|(j, &near)| near.then_some(j))
    }

    /// Borrow the boolean matrix
    #[must_use]
    pub fn as_array(&self) -> &Array2<bool> {
        &self.near
    }

    /// Check the relation is symmetric with a false diagonal
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| !self.near[[i, i]] && (0..n).all(|j| self.near[[i, j]] == self.near[[j, i]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_coords() -> Vec<Point3<f64>> {
        (0..12)
            .map(|i| {
                let i = f64::from(i);
                Point3::new(10.0 + (i % 4.0) * 6.0, (i / 4.0).floor() * 9.0, 0.5 * i)
            })
            .collect()
    }

    #[test]
    fn test_symmetric_with_false_diagonal() {
        let adj = AdjacencyMatrix::from_coordinates(&grid_coords(), 15.0, false);
        assert_eq!(adj.len(), 12);
        assert!(adj.is_well_formed());
        assert!(adj.neighbors(0).count() > 0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(15.0, 0.0, 0.0),
            Point3::new(0.0, 14.9, 0.0),
        ];
        let adj = AdjacencyMatrix::from_coordinates(&coords, 15.0, false);
        assert!(!adj.is_near(0, 1));
        assert!(adj.is_near(0, 2));
    }

    #[test]
    fn test_coincident_contacts_are_not_neighbors() {
        let coords = vec![Point3::new(5.0, 5.0, 5.0), Point3::new(5.0, 5.0, 5.0)];
        let adj = AdjacencyMatrix::from_coordinates(&coords, 15.0, false);
        assert!(!adj.is_near(0, 1));
    }

    #[test]
    fn test_hemisphere_separation() {
        let coords = vec![Point3::new(-3.0, 0.0, 0.0), Point3::new(3.0, 0.0, 0.0)];
        assert!(AdjacencyMatrix::from_coordinates(&coords, 15.0, false).is_near(0, 1));
        assert!(!AdjacencyMatrix::from_coordinates(&coords, 15.0, true).is_near(0, 1));
    }

    #[test]
    fn test_no_electrodes() {
        let adj = AdjacencyMatrix::from_coordinates(&[], 15.0, true);
        assert!(adj.is_empty());
        assert!(adj.is_well_formed());
    }
}
