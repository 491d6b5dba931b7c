//! Surgery model and registry.
//!
//! A surgery is a fixed time window that needs one operating room and one
//! anesthesiologist for its whole duration. Times are integer minutes
//! relative to a shared origin (t=0); converting wall-clock timestamps to
//! offsets is the caller's job.

use serde::{Deserialize, Serialize};

use crate::config::StaffingConfig;
use crate::error::{StaffingError, StaffingResult};
use crate::validation::validate_surgeries;

/// A surgery with immutable start and end times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surgery {
    /// Unique surgery identifier.
    pub id: String,
    /// Start offset (minutes).
    pub start_min: i64,
    /// End offset (minutes).
    pub end_min: i64,
}

impl Surgery {
    /// Creates a surgery.
    pub fn new(id: impl Into<String>, start_min: i64, end_min: i64) -> Self {
        Self {
            id: id.into(),
            start_min,
            end_min,
        }
    }

    /// Duration (end - start) in minutes.
    #[inline]
    pub fn duration_min(&self) -> i64 {
        self.end_min - self.start_min
    }
}

/// Validated, start-ordered, read-only set of surgeries.
///
/// Built once and shared by reference with every solver.
#[derive(Debug, Clone, Serialize)]
pub struct SurgeryRegistry {
    surgeries: Vec<Surgery>,
}

impl SurgeryRegistry {
    /// Validates the records and sorts them by `(start, end)`.
    ///
    /// # Errors
    /// Returns `StaffingError::InvalidInput` with every detected problem.
    pub fn new(mut surgeries: Vec<Surgery>, config: &StaffingConfig) -> StaffingResult<Self> {
        validate_surgeries(&surgeries, config).map_err(StaffingError::InvalidInput)?;
        surgeries.sort_by_key(|s| (s.start_min, s.end_min));
        Ok(Self { surgeries })
    }

    pub fn len(&self) -> usize {
        self.surgeries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surgeries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Surgery> {
        self.surgeries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Surgery> {
        self.surgeries.iter()
    }

    /// All surgeries in start order.
    pub fn surgeries(&self) -> &[Surgery] {
        &self.surgeries
    }

    /// Sum of all surgery durations (minutes).
    pub fn total_minutes(&self) -> i64 {
        self.surgeries.iter().map(Surgery::duration_min).sum()
    }

    /// Latest end time (minutes).
    pub fn horizon_min(&self) -> i64 {
        self.surgeries.iter().map(|s| s.end_min).max().unwrap_or(0)
    }

    /// Largest number of surgeries in progress at one instant.
    ///
    /// Intervals are half-open, so a surgery ending at `t` does not overlap
    /// one starting at `t`. This is the fewest rooms any schedule needs.
    pub fn peak_overlap(&self) -> usize {
        let mut events: Vec<(i64, i32)> = self
            .surgeries
            .iter()
            .flat_map(|s| [(s.start_min, 1), (s.end_min, -1)])
            .collect();
        // Ends sort before starts at the same minute
        events.sort_unstable();

        let mut active = 0i32;
        let mut peak = 0i32;
        for (_, delta) in events {
            active += delta;
            peak = peak.max(active);
        }
        peak as usize
    }

    /// Index pairs `(i, j)` where surgery `j` starts exactly when `i` ends.
    pub fn adjacent_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, first) in self.surgeries.iter().enumerate() {
            // Sorted by start: every candidate j lies in one contiguous run
            let from = self
                .surgeries
                .partition_point(|s| s.start_min < first.end_min);
            for (j, second) in self.surgeries.iter().enumerate().skip(from) {
                if second.start_min != first.end_min {
                    break;
                }
                pairs.push((i, j));
            }
        }
        pairs
    }
}
