//! Staffing domain models.
//!
//! Provides the core data types for the operating-room staffing problem:
//! the immutable surgery set and the schedule every solver produces.
//!
//! # Domain Mappings
//!
//! | u-staffing | Meaning |
//! |------------|---------|
//! | Surgery | Fixed time window needing one room and one anesthesiologist |
//! | Room | Operating room index in `[0, R)` |
//! | Agent | Anesthesiologist index; the pool grows as needed |
//! | Schedule | Surgery → (room, anesthesiologist, actual times) |

mod schedule;
mod surgery;

pub use schedule::{
    AgentShift, Assignment, AssignmentRecord, Schedule, Violation, ViolationType,
};
pub use surgery::{Surgery, SurgeryRegistry};
