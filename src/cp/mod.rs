//! Exact staffing optimizer.
//!
//! Formulates the staffing problem as a constraint model and solves it
//! exactly. The model keeps every surgery at its fixed time and chooses a
//! room and an anesthesiologist for each, minimizing total shift cost
//! subject to room and agent exclusivity, the room-change buffer, the hard
//! shift cap and the aggregate utilization floor.
//!
//! - [`model`]: CP vocabulary (variables, literals, linear expressions,
//!   optional intervals, constraints) with a full-assignment checker
//! - [`builder`]: the staffing formulation and solution decoding
//! - [`solver`]: parallel branch-and-bound search with a time budget
//!
//! Solutions, statuses and search settings are `u_metaheur::cp`'s
//! [`CpSolution`], [`SolverStatus`] and [`CpSolverConfig`].
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling"

pub mod builder;
pub mod model;
pub mod solver;

pub use builder::{ModelShape, ModelVars, PairVars, ShiftVars, StaffingCpBuilder, StaffingModel};
pub use model::{
    BoolVar, Constraint, CpModel, IntVar, IntervalVar, LinearExpr, Literal, ModelViolation, Var,
};
pub use solver::{BranchAndBoundSolver, CpSolver};
pub use u_metaheur::cp::{
    CpSolution, IntervalSolution, SolverConfig as CpSolverConfig, SolverStatus,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SolverConfig, StaffingConfig};
    use crate::error::StaffingError;
    use crate::models::{Schedule, Surgery, SurgeryRegistry};
    use crate::scheduler::GreedyScheduler;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::{Duration, Instant};

    fn config(rooms: usize) -> StaffingConfig {
        StaffingConfig::default()
            .with_rooms(rooms)
            .with_solver(SolverConfig::default().with_workers(2).with_time_limit_secs(30))
    }

    fn registry(surgeries: Vec<Surgery>, config: &StaffingConfig) -> SurgeryRegistry {
        SurgeryRegistry::new(surgeries, config).unwrap()
    }

    fn solve(reg: &SurgeryRegistry, config: &StaffingConfig) -> (Schedule, CpSolution) {
        StaffingCpBuilder::new(reg, config)
            .solve(&BranchAndBoundSolver::from_config(&config.solver))
            .unwrap()
    }

    /// A seeded day of `count` surgeries starting between 07:00 and 17:00.
    fn random_day(count: usize, seed: u64) -> Vec<Surgery> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|k| {
                let start = rng.random_range(420..=1020);
                let length = rng.random_range(30..=270);
                Surgery::new(format!("S{k}"), start, start + length)
            })
            .collect()
    }

    fn cost_hours(schedule: &Schedule, config: &StaffingConfig) -> f64 {
        schedule.total_cost(&config.cost_model()).hours()
    }

    #[test]
    fn test_single_ten_hour_surgery() {
        let cfg = config(1);
        let reg = registry(vec![Surgery::new("S1", 480, 1080)], &cfg);
        let (schedule, solution) = solve(&reg, &cfg);

        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(schedule.agent_count(), 1);
        assert!((cost_hours(&schedule, &cfg) - 10.5).abs() < 1e-10);
        // objective is in the cost model's fixed-point units
        assert_eq!(
            solution.objective_value,
            Some(schedule.total_cost(&cfg.cost_model()).scaled as f64)
        );
    }

    #[test]
    fn test_buffer_keeps_agent_in_room() {
        // B and C both start when A ends; A + C would break the 12h cap
        let cfg = config(2);
        let reg = registry(
            vec![
                Surgery::new("A", 0, 480),
                Surgery::new("B", 480, 540),
                Surgery::new("C", 480, 780),
            ],
            &cfg,
        );
        let (schedule, solution) = solve(&reg, &cfg);

        assert_eq!(solution.status, SolverStatus::Optimal);
        assert!(schedule.audit(&reg, &cfg, true).is_empty());
        let a = schedule.assignment_for_surgery("A").unwrap();
        let b = schedule.assignment_for_surgery("B").unwrap();
        assert_eq!(a.agent, b.agent);
        assert_eq!(a.room, b.room);
        // 9h + 5h minimum
        assert!((cost_hours(&schedule, &cfg) - 14.0).abs() < 1e-10);

        let greedy = GreedyScheduler::new(&cfg).schedule(&reg);
        assert!((cost_hours(&greedy, &cfg) - 14.0).abs() < 1e-10);
    }

    #[test]
    fn test_adjacent_room_change_uses_second_agent() {
        let cfg = config(2);
        let reg = registry(
            vec![
                Surgery::new("A", 480, 600),
                Surgery::new("B", 600, 660),
                Surgery::new("C", 600, 720),
            ],
            &cfg,
        );
        let (schedule, _) = solve(&reg, &cfg);

        assert!(schedule.audit(&reg, &cfg, true).is_empty());
        assert_eq!(schedule.agent_count(), 2);
        for agent in 0..schedule.agent_count() {
            let list = schedule.assignments_for_agent(agent);
            for pair in list.windows(2) {
                if pair[0].end_min == pair[1].start_min {
                    assert_eq!(pair[0].room, pair[1].room);
                }
            }
        }
    }

    #[test]
    fn test_twelve_hour_blocks_need_three_agents() {
        let cfg = config(1);
        let reg = registry(
            vec![
                Surgery::new("S1", 0, 720),
                Surgery::new("S2", 720, 1440),
                Surgery::new("S3", 1440, 2160),
            ],
            &cfg,
        );
        let (schedule, solution) = solve(&reg, &cfg);

        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(schedule.agent_count(), 3);
        // 3 x (12h + 0.5 x 3h)
        assert!((cost_hours(&schedule, &cfg) - 40.5).abs() < 1e-10);
    }

    #[test]
    fn test_four_hour_blocks_prefer_eight_hour_shifts() {
        let cfg = config(1);
        let surgeries = (0..6)
            .map(|k| Surgery::new(format!("S{k}"), k * 240, (k + 1) * 240))
            .collect();
        let reg = registry(surgeries, &cfg);
        let (schedule, solution) = solve(&reg, &cfg);

        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(schedule.agent_count(), 3);
        assert!((cost_hours(&schedule, &cfg) - 24.0).abs() < 1e-10);

        // First-fit packs two 12h shifts at 13.5h each
        let greedy = GreedyScheduler::new(&cfg).schedule(&reg);
        assert_eq!(greedy.agent_count(), 2);
        assert!((cost_hours(&greedy, &cfg) - 27.0).abs() < 1e-10);
    }

    #[test]
    fn test_utilization_floor_splits_idle_shift() {
        let surgeries = || vec![Surgery::new("A", 0, 60), Surgery::new("B", 300, 360)];

        let cfg = config(1);
        let (schedule, _) = solve(&registry(surgeries(), &cfg), &cfg);
        // One 6h shift would be 33% utilized
        assert_eq!(schedule.agent_count(), 2);
        assert!((cost_hours(&schedule, &cfg) - 10.0).abs() < 1e-10);
        assert!(schedule.utilization().meets_floor(80));

        let relaxed = config(1).with_min_utilization(0.0);
        let (schedule, _) = solve(&registry(surgeries(), &relaxed), &relaxed);
        assert_eq!(schedule.agent_count(), 1);
        assert!((cost_hours(&schedule, &relaxed) - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_room_shortage_is_infeasible() {
        let cfg = config(1);
        let reg = registry(
            vec![Surgery::new("A", 0, 60), Surgery::new("B", 30, 90)],
            &cfg,
        );
        let result = StaffingCpBuilder::new(&reg, &cfg).solve(&BranchAndBoundSolver::new());
        assert!(matches!(
            result,
            Err(StaffingError::NoSolution {
                status: SolverStatus::Infeasible
            })
        ));
    }

    #[test]
    fn test_busy_day_without_enough_rooms_fails_fast() {
        let cfg = config(20)
            .with_solver(SolverConfig::default().with_workers(2).with_time_limit_secs(60));
        let reg = registry(random_day(80, 11), &cfg);
        assert!(reg.peak_overlap() > 20, "peak {}", reg.peak_overlap());

        let started = Instant::now();
        let result = StaffingCpBuilder::new(&reg, &cfg)
            .solve(&BranchAndBoundSolver::from_config(&cfg.solver));
        assert!(matches!(
            result,
            Err(StaffingError::NoSolution {
                status: SolverStatus::Infeasible
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_time_budget_returns_best_incumbent() {
        let cfg = StaffingConfig::default()
            .with_rooms(40)
            .with_solver(SolverConfig::default().with_workers(2).with_time_limit_secs(1));
        let reg = registry(random_day(40, 3), &cfg);

        let started = Instant::now();
        let (schedule, solution) = solve(&reg, &cfg);
        assert_eq!(solution.status, SolverStatus::Feasible);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(schedule.assignment_count(), 40);
        let violations = schedule.audit(&reg, &cfg, true);
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(
            solution.objective_value,
            Some(schedule.total_cost(&cfg.cost_model()).scaled as f64)
        );
    }

    #[test]
    fn test_schedule_keeps_fixed_times_and_labels() {
        let cfg = config(2);
        let reg = registry(
            vec![Surgery::new("X", 60, 180), Surgery::new("Y", 90, 200)],
            &cfg,
        );
        let (schedule, _) = solve(&reg, &cfg);

        for a in &schedule.assignments {
            let s = &reg.surgeries()[a.surgery_index];
            assert_eq!((a.start_min, a.end_min), (s.start_min, s.end_min));
        }
        let records = schedule.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.anesthetist_id.starts_with("anesth-")));
        assert!(records.iter().all(|r| r.room_id.starts_with("room-")));
        assert_ne!(records[0].room_id, records[1].room_id);
    }

    #[test]
    fn test_objective_is_stable_across_runs_and_workers() {
        let surgeries = vec![
            Surgery::new("S1", 0, 120),
            Surgery::new("S2", 60, 240),
            Surgery::new("S3", 120, 300),
            Surgery::new("S4", 240, 420),
            Surgery::new("S5", 300, 480),
        ];
        let single = StaffingConfig::default()
            .with_rooms(3)
            .with_solver(SolverConfig::default().with_workers(1).with_time_limit_secs(30));
        let parallel = single
            .clone()
            .with_solver(SolverConfig::default().with_workers(4).with_seed(7).with_time_limit_secs(30));
        let reg = registry(surgeries, &single);

        let (_, first) = solve(&reg, &single);
        let (_, second) = solve(&reg, &single);
        let (_, third) = solve(&reg, &parallel);
        assert_eq!(first.status, SolverStatus::Optimal);
        assert_eq!(first.objective_value, second.objective_value);
        assert_eq!(first.objective_value, third.objective_value);
        assert!(third.num_nodes > 0);
    }

    fn surgery_set() -> impl Strategy<Value = Vec<Surgery>> {
        prop::collection::vec((0i64..20, 1i64..10), 1..6).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(k, (slot, len))| {
                    Surgery::new(format!("S{k}"), slot * 30, slot * 30 + len * 30)
                })
                .collect()
        })
    }

    /// Cheapest assignment that passes the model check, by trying every
    /// agent slot and room for every surgery.
    fn cheapest_by_enumeration(built: &StaffingModel, n: usize, rooms: usize) -> Option<i64> {
        let var_count = built.model.var_count();
        let mut best: Option<i64> = None;
        let mut agent_of = vec![0; n];
        loop {
            let mut room_of = vec![0; n];
            loop {
                let values = built.vars.valuation(var_count, &agent_of, &room_of);
                if built.model.check(&values).is_ok() {
                    let cost = built.model.objective_value(&values).unwrap_or(i64::MAX);
                    best = Some(best.map_or(cost, |b| b.min(cost)));
                }
                if !advance(&mut room_of, rooms) {
                    break;
                }
            }
            if !advance(&mut agent_of, n) {
                break;
            }
        }
        best
    }

    /// Next tuple in `[0, base)^len` order; false after the last.
    fn advance(digits: &mut [usize], base: usize) -> bool {
        for digit in digits.iter_mut() {
            *digit += 1;
            if *digit < base {
                return true;
            }
            *digit = 0;
        }
        false
    }

    fn small_day() -> impl Strategy<Value = (Vec<Surgery>, usize)> {
        let surgeries = prop::collection::vec((0i64..8, 1i64..6), 1..=4).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(k, (slot, len))| {
                    Surgery::new(format!("S{k}"), slot * 60, slot * 60 + len * 60)
                })
                .collect::<Vec<_>>()
        });
        (surgeries, 1usize..=3)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_search_matches_exhaustive_enumeration((surgeries, rooms) in small_day()) {
            let n = surgeries.len();
            let cfg = config(rooms);
            let reg = registry(surgeries, &cfg);
            let built = StaffingCpBuilder::new(&reg, &cfg).build();

            let expected = cheapest_by_enumeration(&built, n, rooms);
            let solution = BranchAndBoundSolver::new().solve(&built, &cfg.solver.cp_config());
            match expected {
                Some(cost) => {
                    prop_assert_eq!(solution.status, SolverStatus::Optimal);
                    prop_assert_eq!(solution.objective_value, Some(cost as f64));
                }
                None => prop_assert_eq!(solution.status, SolverStatus::Infeasible),
            }
        }

        #[test]
        fn prop_exact_is_valid_and_no_costlier_than_greedy(surgeries in surgery_set()) {
            // One room per surgery: greedy never delays, so its schedule is
            // feasible for the exact model when the floor is off
            let cfg = config(surgeries.len()).with_min_utilization(0.0);
            let reg = registry(surgeries, &cfg);
            let (schedule, solution) = solve(&reg, &cfg);

            prop_assert_eq!(solution.status, SolverStatus::Optimal);
            let violations = schedule.audit(&reg, &cfg, true);
            prop_assert!(violations.is_empty(), "{:?}", violations);

            let greedy = GreedyScheduler::new(&cfg).schedule(&reg);
            let model = cfg.cost_model();
            prop_assert!(schedule.total_cost(&model) <= greedy.total_cost(&model));
        }

        #[test]
        fn prop_exact_meets_utilization_floor(surgeries in surgery_set()) {
            let cfg = config(surgeries.len());
            let reg = registry(surgeries, &cfg);
            let (schedule, _) = solve(&reg, &cfg);
            prop_assert!(schedule.utilization().meets_floor(cfg.utilization_floor_percent()));
            prop_assert!(schedule.audit(&reg, &cfg, true).is_empty());
        }
    }
}
