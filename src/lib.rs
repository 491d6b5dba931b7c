//! Surgery staffing for the U-Engine ecosystem.
//!
//! Assigns every surgery of a day to an operating room and an
//! anesthesiologist while minimizing total staffing cost. Surgeries have
//! fixed start and end times; the anesthesiologist pool grows on demand.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Surgery`, `SurgeryRegistry`, `Schedule`,
//!   `Assignment`, `AgentShift`, `AssignmentRecord`, `Violation`
//! - **`cost`**: Shift cost model (minimum paid shift, overtime) in exact
//!   fixed-point units, and utilization
//! - **`scheduler`**: Greedy heuristic scheduler and schedule KPIs
//! - **`cp`**: Exact optimizer: CP formulation and parallel branch-and-bound
//! - **`validation`**: Input integrity checks (empty input, duplicate IDs,
//!   negative starts, non-positive or uncoverable durations)
//! - **`config`**: TOML-loadable configuration with validation
//! - **`error`**: Crate error type
//!
//! # Example
//!
//! ```
//! use u_staffing::config::StaffingConfig;
//! use u_staffing::models::{Surgery, SurgeryRegistry};
//! use u_staffing::scheduler::{GreedyScheduler, StaffingKpi};
//!
//! let config = StaffingConfig::default().with_rooms(2);
//! let registry = SurgeryRegistry::new(
//!     vec![
//!         Surgery::new("S1", 480, 720),
//!         Surgery::new("S2", 540, 660),
//!         Surgery::new("S3", 735, 900),
//!     ],
//!     &config,
//! )
//! .unwrap();
//!
//! let schedule = GreedyScheduler::new(&config).schedule(&registry);
//! assert!(schedule.audit(&registry, &config, false).is_empty());
//!
//! let kpi = StaffingKpi::calculate(&schedule, &config.cost_model());
//! assert_eq!(kpi.agents_used, 2);
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Cardoen, Demeulemeester & Beliën (2010), "Operating room planning and
//!   scheduling: A literature review"

pub mod config;
pub mod cost;
pub mod cp;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod validation;
