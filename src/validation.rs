//! Input validation for staffing problems.
//!
//! Checks the normalized surgery records before either solver sees them.
//! Detects:
//! - An empty surgery set
//! - Duplicate IDs
//! - Negative start offsets
//! - Non-positive durations (`end <= start`)
//! - Surgeries longer than the hard shift cap (no anesthesiologist could
//!   ever cover them)
//!
//! All problems are collected, not just the first one.

use std::collections::HashSet;
use std::fmt;

use crate::config::StaffingConfig;
use crate::models::Surgery;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// No surgeries to schedule.
    EmptyInput,
    /// Two surgeries share the same ID.
    DuplicateId,
    /// A surgery starts before the shared origin.
    NegativeStart,
    /// A surgery ends at or before its start.
    NonPositiveDuration,
    /// A surgery is longer than the maximum shift.
    ExceedsShiftCap,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validates normalized surgery records against the configuration.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_surgeries(surgeries: &[Surgery], config: &StaffingConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if surgeries.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptyInput,
            "Surgery set is empty",
        ));
    }

    let max_shift = config.max_shift_min();
    let mut ids = HashSet::new();

    for s in surgeries {
        if !ids.insert(s.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate surgery ID: {}", s.id),
            ));
        }

        if s.start_min < 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::NegativeStart,
                format!("Surgery '{}' starts before the origin ({} min)", s.id, s.start_min),
            ));
        }

        if s.end_min <= s.start_min {
            errors.push(ValidationError::new(
                ValidationErrorKind::NonPositiveDuration,
                format!(
                    "Surgery '{}' ends at {} but starts at {}",
                    s.id, s.end_min, s.start_min
                ),
            ));
        } else if s.duration_min() > max_shift {
            errors.push(ValidationError::new(
                ValidationErrorKind::ExceedsShiftCap,
                format!(
                    "Surgery '{}' lasts {} min, longer than the {} min shift cap",
                    s.id,
                    s.duration_min(),
                    max_shift
                ),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
