//! Staffing quality metrics (KPIs).
//!
//! Summarizes a schedule the way the staffing office reads it.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Total cost | Sum of shift costs over used anesthesiologists |
//! | Utilization | Surgery minutes / shift minutes (aggregate) |
//! | Avg individual utilization | Mean of per-agent utilization |
//! | Agents used | Distinct anesthesiologists with a shift |
//! | Rooms used | Distinct rooms with a surgery |

use crate::cost::{Cost, CostModel};
use crate::models::Schedule;

/// Per-anesthesiologist summary row.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentKpi {
    /// Anesthesiologist index.
    pub agent: usize,
    /// Shift window length (minutes).
    pub shift_min: i64,
    /// Minutes spent in surgery.
    pub active_min: i64,
    /// active / shift (0.0..1.0).
    pub utilization: f64,
    /// Shift cost.
    pub cost: Cost,
}

/// Schedule performance indicators.
#[derive(Debug, Clone)]
pub struct StaffingKpi {
    /// Total staffing cost.
    pub total_cost: Cost,
    /// Aggregate utilization (0.0..1.0).
    pub utilization: f64,
    /// Mean of per-agent utilization (0.0..1.0).
    pub avg_individual_utilization: f64,
    /// Number of anesthesiologists used.
    pub agents_used: usize,
    /// Number of rooms used.
    pub rooms_used: usize,
    /// Per-agent rows, ordered by agent index.
    pub per_agent: Vec<AgentKpi>,
}

impl StaffingKpi {
    /// Computes KPIs from a schedule.
    pub fn calculate(schedule: &Schedule, cost_model: &CostModel) -> Self {
        let per_agent: Vec<AgentKpi> = schedule
            .agent_shifts()
            .into_iter()
            .map(|shift| AgentKpi {
                agent: shift.agent,
                shift_min: shift.duration_min(),
                active_min: shift.surgery_min,
                utilization: shift.utilization().ratio(),
                cost: cost_model.shift_cost(shift.duration_min()),
            })
            .collect();

        let total_cost = per_agent
            .iter()
            .fold(cost_model.zero(), |acc, row| acc + row.cost);

        let avg_individual_utilization = if per_agent.is_empty() {
            0.0
        } else {
            per_agent.iter().map(|row| row.utilization).sum::<f64>() / per_agent.len() as f64
        };

        Self {
            total_cost,
            utilization: schedule.utilization().ratio(),
            avg_individual_utilization,
            agents_used: per_agent.len(),
            rooms_used: schedule.room_count(),
            per_agent,
        }
    }

    /// Whether the schedule meets the given cost and utilization thresholds.
    pub fn meets_thresholds(&self, max_cost_hours: f64, min_utilization: f64) -> bool {
        self.total_cost.hours() <= max_cost_hours && self.utilization >= min_utilization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaffingConfig;
    use crate::models::Assignment;

    fn assignment(id: &str, agent: usize, room: usize, start: i64, end: i64) -> Assignment {
        Assignment {
            surgery_id: id.into(),
            surgery_index: 0,
            agent,
            room,
            start_min: start,
            end_min: end,
        }
    }

    fn cost_model() -> CostModel {
        StaffingConfig::default().cost_model()
    }

    #[test]
    fn test_kpi_basic() {
        let mut schedule = Schedule::new();
        // Agent 0: 480..1080 (10h) with 8h of surgery
        schedule.add_assignment(assignment("S1", 0, 0, 480, 720));
        schedule.add_assignment(assignment("S2", 0, 0, 840, 1080));
        // Agent 1: 2h
        schedule.add_assignment(assignment("S3", 1, 1, 480, 600));

        let kpi = StaffingKpi::calculate(&schedule, &cost_model());
        assert_eq!(kpi.agents_used, 2);
        assert_eq!(kpi.rooms_used, 2);
        // 10.5h + 5h
        assert!((kpi.total_cost.hours() - 15.5).abs() < 1e-10);
        // (480 + 120) / (600 + 120)
        assert!((kpi.utilization - 600.0 / 720.0).abs() < 1e-10);
        // (0.8 + 1.0) / 2
        assert!((kpi.avg_individual_utilization - 0.9).abs() < 1e-10);

        let row = &kpi.per_agent[0];
        assert_eq!(row.shift_min, 600);
        assert_eq!(row.active_min, 480);
        assert!((row.cost.hours() - 10.5).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_empty() {
        let kpi = StaffingKpi::calculate(&Schedule::new(), &cost_model());
        assert_eq!(kpi.agents_used, 0);
        assert_eq!(kpi.rooms_used, 0);
        assert_eq!(kpi.total_cost.scaled, 0);
        assert_eq!(kpi.utilization, 0.0);
        assert_eq!(kpi.avg_individual_utilization, 0.0);
    }

    #[test]
    fn test_meets_thresholds() {
        let mut schedule = Schedule::new();
        schedule.add_assignment(assignment("S1", 0, 0, 0, 600));
        let kpi = StaffingKpi::calculate(&schedule, &cost_model());
        assert!(kpi.meets_thresholds(10.5, 0.8));
        assert!(!kpi.meets_thresholds(10.0, 0.8));
        assert!(!kpi.meets_thresholds(20.0, 1.5));
    }
}
