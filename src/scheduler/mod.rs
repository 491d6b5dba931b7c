//! Greedy staffing and KPI evaluation.
//!
//! Provides the fast room-then-agent heuristic and schedule quality metrics.
//!
//! # Algorithm
//!
//! `GreedyScheduler` assigns rooms with an earliest-free priority queue,
//! delaying surgeries when every room is busy, then hands surgeries to the
//! first anesthesiologist that can take them. It is not optimal and does
//! not enforce the utilization floor, but it always produces a schedule.
//!
//! # KPI
//!
//! `StaffingKpi` computes total cost, aggregate and per-agent utilization,
//! and resource counts.

mod greedy;
mod kpi;

pub use greedy::GreedyScheduler;
pub use kpi::{AgentKpi, StaffingKpi};
