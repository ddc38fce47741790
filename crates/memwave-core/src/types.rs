//! Core types for memwave analyses
//!
//! This module provides the data model shared by the cluster and classifier
//! paths:
//! - Task and task-phase identifiers for the two supported memory tasks
//! - Electrode descriptors (contact type, 3-D position)
//! - Per-event metadata (`Event`, `EventTable`)
//! - The events × features power matrix (`FeatureMatrix`, `FeatureSet`)

use std::collections::BTreeSet;

use nalgebra::Point3;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

// ============================================================================
// Tasks and Task Phases
// ============================================================================

/// Memory experiment the recording came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Treasure Hunt spatial memory task
    #[serde(rename = "RAM_TH1")]
    TreasureHunt,
    /// Verbal free recall task
    #[serde(rename = "RAM_FR1")]
    FreeRecall,
}

impl Task {
    /// Experiment identifier as used by the recording archive
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TreasureHunt => "RAM_TH1",
            Self::FreeRecall => "RAM_FR1",
        }
    }

    /// Map a raw event type onto a task phase.
    ///
    /// Treasure Hunt codes encoding as `CHEST` and retrieval as `REC`; free
    /// recall uses `WORD` and `REC_WORD`. The already-normalized names
    /// `enc` and `rec` are accepted for both tasks.
    #[must_use]
    pub fn phase_for_event_type(self, raw: &str) -> Option<TaskPhase> {
        match (self, raw) {
            (_, "enc") => Some(TaskPhase::Encoding),
            (_, "rec") => Some(TaskPhase::Retrieval),
            (Self::TreasureHunt, "CHEST") | (Self::FreeRecall, "WORD") => Some(TaskPhase::Encoding),
            (Self::TreasureHunt, "REC") | (Self::FreeRecall, "REC_WORD") => Some(TaskPhase::Retrieval),
            _ => None,
        }
    }

    /// Name of the within-session grouping field (trial or list)
    #[inline]
    #[must_use]
    pub const fn list_field(self) -> &'static str {
        match self {
            Self::TreasureHunt => "trial",
            Self::FreeRecall => "list",
        }
    }

    /// Minimum number of lists a session needs to count as complete.
    #[inline]
    #[must_use]
    pub const fn min_lists_per_session(self) -> usize {
        match self {
            Self::TreasureHunt => 30,
            Self::FreeRecall => 15,
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::TreasureHunt
    }
}

/// Experiment phase an event belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPhase {
    /// Item presentation / study period
    #[serde(rename = "enc")]
    Encoding,
    /// Memory retrieval period
    #[serde(rename = "rec")]
    Retrieval,
}

impl TaskPhase {
    /// Short label (`enc` or `rec`)
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encoding => "enc",
            Self::Retrieval => "rec",
        }
    }
}

// ============================================================================
// Electrodes
// ============================================================================

/// Intracranial contact type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectrodeType {
    /// Depth electrode
    #[serde(rename = "D")]
    Depth,
    /// Subdural grid
    #[serde(rename = "G")]
    Grid,
    /// Subdural strip
    #[serde(rename = "S")]
    Strip,
}

impl ElectrodeType {
    /// Parse the single-letter archive code
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'D' => Some(Self::Depth),
            'G' => Some(Self::Grid),
            'S' => Some(Self::Strip),
            _ => None,
        }
    }

    /// Single-letter archive code
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Depth => 'D',
            Self::Grid => 'G',
            Self::Strip => 'S',
        }
    }
}

/// A recording contact with its position in millimetres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Electrode {
    /// Channel label
    pub label: String,
    /// Contact type
    pub kind: ElectrodeType,
    /// Position in subject space (mm)
    pub position: Point3<f64>,
}

impl Electrode {
    /// Create a new electrode descriptor
    #[must_use]
    pub fn new(label: impl Into<String>, kind: ElectrodeType, position: Point3<f64>) -> Self {
        Self {
            label: label.into(),
            kind,
            position,
        }
    }

    /// Left hemisphere contacts have a negative x coordinate
    #[inline]
    #[must_use]
    pub fn is_left(&self) -> bool {
        self.position.x < 0.0
    }
}

// ============================================================================
// Events
// ============================================================================

/// Metadata for one behavioral event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Recording session
    pub session: u32,
    /// Trial (Treasure Hunt) or list (free recall) number within the session
    pub list: i32,
    /// Task phase
    pub phase: TaskPhase,
    /// Whether the item was subsequently remembered
    pub recalled: bool,
    /// Reaction time in seconds, when the task records one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_time: Option<f64>,
    /// Continuous performance measure (e.g. distance error), when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,
}

/// Ordered table of events, one row per feature-matrix row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTable {
    events: Vec<Event>,
}

impl EventTable {
    /// Wrap a list of events
    #[must_use]
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the table holds no events
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over events in row order
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Borrow the events
    #[must_use]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Session id per event
    #[must_use]
    pub fn sessions(&self) -> Vec<u32> {
        self.events.iter().map(|e| e.session).collect()
    }

    /// Sorted unique session ids
    #[must_use]
    pub fn unique_sessions(&self) -> Vec<u32> {
        self.events
            .iter()
            .map(|e| e.session)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// List / trial id per event
    #[must_use]
    pub fn lists(&self) -> Vec<i32> {
        self.events.iter().map(|e| e.list).collect()
    }

    /// Task phase per event
    #[must_use]
    pub fn phases(&self) -> Vec<TaskPhase> {
        self.events.iter().map(|e| e.phase).collect()
    }

    /// Recall label per event
    #[must_use]
    pub fn recalled(&self) -> Vec<bool> {
        self.events.iter().map(|e| e.recalled).collect()
    }

    /// Sorted unique phases present in the table
    #[must_use]
    pub fn unique_phases(&self) -> Vec<TaskPhase> {
        self.events
            .iter()
            .map(|e| e.phase)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keep the rows whose mask entry is true
    #[must_use]
    pub fn filter(&self, mask: &[bool]) -> Self {
        Self {
            events: self
                .events
                .iter()
                .zip(mask)
                .filter(|(_, &keep)| keep)
                .map(|(e, _)| e.clone())
                .collect(),
        }
    }
}

impl FromIterator<Event> for EventTable {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ============================================================================
// Feature Matrix
// ============================================================================

/// Layout of the flattened feature axis.
///
/// Columns are ordered electrode-major, then frequency, then time bin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    /// Number of electrodes (or bipolar pairs)
    pub n_electrodes: usize,
    /// Number of frequencies
    pub n_freqs: usize,
    /// Number of time bins
    pub n_time_bins: usize,
}

impl FeatureShape {
    /// Shape with a single (time-averaged) bin
    #[must_use]
    pub const fn new(n_electrodes: usize, n_freqs: usize) -> Self {
        Self {
            n_electrodes,
            n_freqs,
            n_time_bins: 1,
        }
    }

    /// Total number of feature columns
    #[inline]
    #[must_use]
    pub const fn n_features(self) -> usize {
        self.n_electrodes * self.n_freqs * self.n_time_bins
    }

    /// Column index for an (electrode, frequency, time bin) triple
    #[inline]
    #[must_use]
    pub const fn column(self, electrode: usize, freq: usize, time_bin: usize) -> usize {
        (electrode * self.n_freqs + freq) * self.n_time_bins + time_bin
    }
}

/// Events × features matrix of spectral power.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    data: Array2<f64>,
    shape: FeatureShape,
}

impl FeatureMatrix {
    /// Wrap a matrix, checking the column count against the shape
    pub fn new(data: Array2<f64>, shape: FeatureShape) -> DataResult<Self> {
        if data.ncols() != shape.n_features() {
            return Err(DataError::FeatureShapeMismatch {
                expected: shape.n_features(),
                got: data.ncols(),
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFinite { context: "feature matrix" });
        }
        Ok(Self { data, shape })
    }

    /// Number of events (rows)
    #[inline]
    #[must_use]
    pub fn n_events(&self) -> usize {
        self.data.nrows()
    }

    /// Feature layout
    #[inline]
    #[must_use]
    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    /// Borrow the raw matrix
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Copy out the selected rows
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            data: self.data.select(Axis(0), rows),
            shape: self.shape,
        }
    }
}

/// Feature matrix paired with its event table.
///
/// The event count of both halves always matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    features: FeatureMatrix,
    events: EventTable,
    freqs: Vec<f64>,
}

impl FeatureSet {
    /// Pair features with events
    pub fn new(features: FeatureMatrix, events: EventTable, freqs: Vec<f64>) -> DataResult<Self> {
        if features.n_events() != events.len() {
            return Err(DataError::EventCountMismatch {
                features: features.n_events(),
                events: events.len(),
            });
        }
        if freqs.len() != features.shape().n_freqs {
            return Err(DataError::DimensionMismatch {
                context: "frequency axis",
                expected: features.shape().n_freqs,
                got: freqs.len(),
            });
        }
        Ok(Self {
            features,
            events,
            freqs,
        })
    }

    /// Feature matrix
    #[inline]
    #[must_use]
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Event table
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventTable {
        &self.events
    }

    /// Frequencies (Hz) of the feature frequency axis
    #[inline]
    #[must_use]
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn n_events(&self) -> usize {
        self.events.len()
    }

    /// Keep the events whose mask entry is true
    #[must_use]
    pub fn filter_events(&self, mask: &[bool]) -> Self {
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Self {
            features: self.features.select_rows(&rows),
            events: self.events.filter(mask),
            freqs: self.freqs.clone(),
        }
    }

    /// Re-check the invariants of a set that bypassed [`FeatureSet::new`],
    /// e.g. one deserialized from disk.
    pub fn validate(&self) -> DataResult<()> {
        FeatureMatrix::new(self.features.data.clone(), self.features.shape)?;
        if self.features.n_events() != self.events.len() {
            return Err(DataError::EventCountMismatch {
                features: self.features.n_events(),
                events: self.events.len(),
            });
        }
        if self.freqs.len() != self.features.shape.n_freqs {
            return Err(DataError::DimensionMismatch {
                context: "frequency axis",
                expected: self.features.shape.n_freqs,
                got: self.freqs.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn event(session: u32, list: i32, phase: TaskPhase, recalled: bool) -> Event {
        Event {
            session,
            list,
            phase,
            recalled,
            reaction_time: None,
            performance: None,
        }
    }

    #[test]
    fn test_task_phase_mapping() {
        assert_eq!(
            Task::TreasureHunt.phase_for_event_type("CHEST"),
            Some(TaskPhase::Encoding)
        );
        assert_eq!(
            Task::FreeRecall.phase_for_event_type("REC_WORD"),
            Some(TaskPhase::Retrieval)
        );
        assert_eq!(Task::FreeRecall.phase_for_event_type("CHEST"), None);
    }

    #[test]
    fn test_feature_shape_column_order() {
        let shape = FeatureShape {
            n_electrodes: 3,
            n_freqs: 4,
            n_time_bins: 2,
        };
        assert_eq!(shape.n_features(), 24);
        assert_eq!(shape.column(0, 0, 1), 1);
        assert_eq!(shape.column(1, 0, 0), 8);
        assert_eq!(shape.column(2, 3, 1), 23);
    }

    #[test]
    fn test_feature_set_rejects_count_mismatch() {
        let features = FeatureMatrix::new(array![[1.0, 2.0], [3.0, 4.0]], FeatureShape::new(1, 2)).unwrap();
        let events = EventTable::new(vec![event(0, 1, TaskPhase::Encoding, true)]);
        let err = FeatureSet::new(features, events, vec![3.0, 8.0]).unwrap_err();
        assert_eq!(err, DataError::EventCountMismatch { features: 2, events: 1 });
    }

    #[test]
    fn test_feature_matrix_rejects_wrong_width() {
        let err = FeatureMatrix::new(array![[1.0, 2.0, 3.0]], FeatureShape::new(1, 2)).unwrap_err();
        assert!(matches!(err, DataError::FeatureShapeMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn test_filter_events_keeps_rows_aligned() {
        let features = FeatureMatrix::new(array![[1.0], [2.0], [3.0]], FeatureShape::new(1, 1)).unwrap();
        let events = EventTable::new(vec![
            event(0, 1, TaskPhase::Encoding, true),
            event(0, 2, TaskPhase::Encoding, false),
            event(1, 1, TaskPhase::Retrieval, true),
        ]);
        let set = FeatureSet::new(features, events, vec![5.0]).unwrap();
        let kept = set.filter_events(&[true, false, true]);
        assert_eq!(kept.n_events(), 2);
        assert_eq!(kept.features().data()[[1, 0]], 3.0);
        assert_eq!(kept.events().unique_sessions(), vec![0, 1]);
        assert_eq!(
            kept.events().unique_phases(),
            vec![TaskPhase::Encoding, TaskPhase::Retrieval]
        );
    }

    #[test]
    fn test_validate_catches_deserialized_mismatch() {
        let features = FeatureMatrix::new(array![[1.0], [2.0]], FeatureShape::new(1, 1)).unwrap();
        let events = EventTable::new(vec![
            event(0, 1, TaskPhase::Encoding, true),
            event(0, 2, TaskPhase::Encoding, false),
        ]);
        let set = FeatureSet::new(features, events, vec![5.0]).unwrap();
        assert!(set.validate().is_ok());

        let mut value = serde_json::to_value(&set).unwrap();
        value["events"].as_array_mut().unwrap().pop();
        let stale: FeatureSet = serde_json::from_value(value).unwrap();
        assert_eq!(
            stale.validate().unwrap_err(),
            DataError::EventCountMismatch { features: 2, events: 1 }
        );
    }

    #[test]
    fn test_electrode_hemisphere() {
        let left = Electrode::new("LA1", ElectrodeType::Depth, Point3::new(-20.0, 1.0, 2.0));
        assert!(left.is_left());
        assert_eq!(ElectrodeType::from_code('G'), Some(ElectrodeType::Grid));
        assert_eq!(ElectrodeType::Strip.code(), 'S');
    }
}
