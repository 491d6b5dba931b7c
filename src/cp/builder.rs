//! Staffing CP formulation.
//!
//! Translates a [`SurgeryRegistry`] into a [`CpModel`]:
//!
//! - `room[i][r]`, `agent[i][a]` booleans with exactly-one per surgery
//!   (one candidate anesthesiologist per surgery is a safe upper bound)
//! - optional fixed-time intervals with no-overlap per room and per agent
//! - `used[a] = max_i agent[i][a]`, with `used[a-1] >= used[a]`
//! - per-agent shift window, duration (capped), base/extra terms and cost,
//!   gated to zero for unused agents
//! - room-change buffer on time-adjacent pairs
//! - the aggregate utilization floor
//!
//! The objective minimizes the sum of per-agent costs in the cost model's
//! fixed-point units.

use std::collections::HashMap;

use tracing::warn;
use u_metaheur::cp::CpSolution;

use super::model::{BoolVar, CpModel, IntVar, LinearExpr, Literal, Var};
use super::solver::CpSolver;
use crate::config::StaffingConfig;
use crate::cost::CostModel;
use crate::error::{StaffingError, StaffingResult};
use crate::models::{Assignment, Schedule, SurgeryRegistry};

/// A built model together with the handles needed to read it back.
#[derive(Debug, Clone)]
pub struct StaffingModel {
    pub model: CpModel,
    pub vars: ModelVars,
}

/// Variable handles of the staffing model.
#[derive(Debug, Clone)]
pub struct ModelVars {
    /// `(surgery, room) -> room[i][r]`.
    pub room: HashMap<(usize, usize), BoolVar>,
    /// `(surgery, agent) -> agent[i][a]`.
    pub agent: HashMap<(usize, usize), BoolVar>,
    /// `used[a]` per candidate agent.
    pub used: Vec<BoolVar>,
    /// Shift variables per candidate agent.
    pub shifts: Vec<ShiftVars>,
    /// Helper variables per time-adjacent pair. Empty when the buffer is zero.
    pub pairs: Vec<PairVars>,
    /// Instance data the model was built from.
    pub shape: ModelShape,
}

/// Shift variables of one candidate anesthesiologist.
#[derive(Debug, Clone, Copy)]
pub struct ShiftVars {
    pub start: IntVar,
    pub end: IntVar,
    pub duration: IntVar,
    /// `max(duration, min_shift)`.
    pub base: IntVar,
    /// `max(duration - overtime_threshold, 0)`.
    pub extra: IntVar,
    /// Scaled cost, zero when unused.
    pub cost: IntVar,
    /// Duration, zero when unused.
    pub used_duration: IntVar,
}

/// Helpers for a pair where `second` starts exactly when `first` ends.
#[derive(Debug, Clone)]
pub struct PairVars {
    pub first: usize,
    pub second: usize,
    /// `same_room[r]` iff both surgeries are in room `r`.
    pub same_room: Vec<BoolVar>,
    /// True iff the two surgeries are in different rooms.
    pub diff_room: BoolVar,
}

/// Instance data the model was built from, in registry order.
#[derive(Debug, Clone)]
pub struct ModelShape {
    pub starts: Vec<i64>,
    pub ends: Vec<i64>,
    pub rooms: usize,
    /// Candidate agent slots (one per surgery).
    pub agents: usize,
    /// Most surgeries in progress at once; more than `rooms` is infeasible.
    pub peak_overlap: usize,
    pub max_shift_min: i64,
    /// Utilization floor as an integer percentage.
    pub floor_percent: i64,
    pub cost_model: CostModel,
}

impl ModelShape {
    pub fn surgery_count(&self) -> usize {
        self.starts.len()
    }

    /// Sum of surgery durations (minutes).
    pub fn total_surgery_min(&self) -> i64 {
        self.starts.iter().zip(&self.ends).map(|(s, e)| e - s).sum()
    }
}

impl ModelVars {
    /// Full variable assignment for the given room and agent choices.
    ///
    /// `agent_of[i]` and `room_of[i]` index candidate slots and rooms for
    /// surgery `i`. Every derived variable is filled in consistently.
    pub fn valuation(&self, var_count: usize, agent_of: &[usize], room_of: &[usize]) -> Vec<i64> {
        let shape = &self.shape;
        let cost_model = &shape.cost_model;
        let rate = cost_model.rate();
        let mut values = vec![0; var_count];

        let mut windows: Vec<Option<(i64, i64)>> = vec![None; shape.agents];
        for (i, (&agent, &room)) in agent_of.iter().zip(room_of).enumerate() {
            if let Some(var) = self.agent.get(&(i, agent)) {
                values[var.index()] = 1;
            }
            if let Some(var) = self.room.get(&(i, room)) {
                values[var.index()] = 1;
            }
            if let Some(window) = windows.get_mut(agent) {
                let (s, e) = (shape.starts[i], shape.ends[i]);
                *window = Some(match *window {
                    Some((ws, we)) => (ws.min(s), we.max(e)),
                    None => (s, e),
                });
            }
        }

        for (a, shift) in self.shifts.iter().enumerate() {
            let (start, end) = windows[a].unwrap_or((0, 0));
            let duration = end - start;
            let base = duration.max(cost_model.min_shift_min());
            let extra = (duration - cost_model.overtime_threshold_min()).max(0);
            let used = windows[a].is_some();

            values[self.used[a].index()] = i64::from(used);
            values[shift.start.index()] = start;
            values[shift.end.index()] = end;
            values[shift.duration.index()] = duration;
            values[shift.base.index()] = base;
            values[shift.extra.index()] = extra;
            if used {
                values[shift.cost.index()] = rate.den * base + rate.num * extra;
                values[shift.used_duration.index()] = duration;
            }
        }

        for pair in &self.pairs {
            let (ri, rj) = (room_of[pair.first], room_of[pair.second]);
            for (r, var) in pair.same_room.iter().enumerate() {
                values[var.index()] = i64::from(ri == r && rj == r);
            }
            values[pair.diff_room.index()] = i64::from(ri != rj);
        }

        values
    }
}

/// Builds the staffing CP model from a surgery registry.
///
/// # Example
/// ```
/// use u_staffing::config::{SolverConfig, StaffingConfig};
/// use u_staffing::cp::{BranchAndBoundSolver, StaffingCpBuilder};
/// use u_staffing::models::{Surgery, SurgeryRegistry};
///
/// let config = StaffingConfig::default()
///     .with_rooms(2)
///     .with_solver(SolverConfig::default().with_workers(2).with_time_limit_secs(10));
/// let registry = SurgeryRegistry::new(
///     vec![Surgery::new("S1", 0, 240), Surgery::new("S2", 240, 480)],
///     &config,
/// )
/// .unwrap();
///
/// let builder = StaffingCpBuilder::new(&registry, &config);
/// let solver = BranchAndBoundSolver::from_config(&config.solver);
/// let (schedule, solution) = builder.solve(&solver).unwrap();
/// assert!(solution.is_solution_found());
/// assert_eq!(schedule.assignment_count(), 2);
/// ```
pub struct StaffingCpBuilder<'a> {
    registry: &'a SurgeryRegistry,
    config: &'a StaffingConfig,
}

impl<'a> StaffingCpBuilder<'a> {
    /// Creates a new CP builder.
    pub fn new(registry: &'a SurgeryRegistry, config: &'a StaffingConfig) -> Self {
        Self { registry, config }
    }

    /// Builds the model.
    pub fn build(&self) -> StaffingModel {
        let surgeries = self.registry.surgeries();
        let n = surgeries.len();
        let rooms = self.config.rooms;
        let horizon = self.registry.horizon_min();
        let cap = self.config.max_shift_min();
        let cost_model = self.config.cost_model();
        let rate = cost_model.rate();
        let min_shift = cost_model.min_shift_min();
        let threshold = cost_model.overtime_threshold_min();
        let floor_percent = self.config.utilization_floor_percent();

        let mut model = CpModel::new("surgery_staffing");
        let mut room = HashMap::with_capacity(n * rooms);
        let mut agent = HashMap::with_capacity(n * n);

        // Assignment booleans, exactly one room and one agent per surgery
        let mut room_intervals = vec![Vec::with_capacity(n); rooms];
        let mut agent_intervals = vec![Vec::with_capacity(n); n];
        for (i, surgery) in surgeries.iter().enumerate() {
            let mut choices: Vec<Literal> = Vec::with_capacity(rooms);
            for (r, intervals) in room_intervals.iter_mut().enumerate() {
                let var = model.new_bool_var(format!("room_{i}_{r}"));
                intervals.push(model.new_optional_interval(
                    surgery.start_min,
                    surgery.end_min,
                    var,
                    format!("room_iv_{i}_{r}"),
                ));
                room.insert((i, r), var);
                choices.push(var.into());
            }
            model.add_exactly_one(choices);

            let mut choices: Vec<Literal> = Vec::with_capacity(n);
            for (a, intervals) in agent_intervals.iter_mut().enumerate() {
                let var = model.new_bool_var(format!("agent_{i}_{a}"));
                intervals.push(model.new_optional_interval(
                    surgery.start_min,
                    surgery.end_min,
                    var,
                    format!("agent_iv_{i}_{a}"),
                ));
                agent.insert((i, a), var);
                choices.push(var.into());
            }
            model.add_exactly_one(choices);
        }
        for intervals in room_intervals.into_iter().chain(agent_intervals) {
            model.add_no_overlap(intervals);
        }

        // Agent usage, filled lowest index first
        let mut used: Vec<BoolVar> = Vec::with_capacity(n);
        for a in 0..n {
            let var = model.new_bool_var(format!("used_{a}"));
            let exprs = (0..n).map(|i| LinearExpr::var(agent[&(i, a)])).collect();
            model.add_max_equality(var, exprs);
            if let Some(&prev) = used.last() {
                model.add_linear(LinearExpr::var(prev).plus(var, -1), 0, 1, &[]);
            }
            used.push(var);
        }

        // Shift windows and costs
        let cost_ub = rate.den * cap.max(min_shift) + rate.num * (cap - threshold).max(0);
        let mut shifts = Vec::with_capacity(n);
        for (a, &used_a) in used.iter().enumerate() {
            let start = model.new_int_var(0, horizon, format!("shift_start_{a}"));
            let end = model.new_int_var(0, horizon, format!("shift_end_{a}"));
            let duration = model.new_int_var(0, cap, format!("shift_duration_{a}"));
            let base = model.new_int_var(min_shift, cap.max(min_shift), format!("shift_base_{a}"));
            let extra = model.new_int_var(0, (cap - threshold).max(0), format!("shift_extra_{a}"));
            let cost = model.new_int_var(0, cost_ub, format!("shift_cost_{a}"));
            let used_duration = model.new_int_var(0, cap, format!("used_duration_{a}"));

            for (i, surgery) in surgeries.iter().enumerate() {
                let assigned: Literal = agent[&(i, a)].into();
                model.add_linear(LinearExpr::var(start), i64::MIN, surgery.start_min, &[assigned]);
                model.add_linear(LinearExpr::var(end), surgery.end_min, i64::MAX, &[assigned]);
            }
            model.add_equality(
                LinearExpr::var(end).plus(start, -1).plus(duration, -1),
                0,
                &[],
            );
            model.add_max_equality(
                base,
                vec![LinearExpr::var(duration), LinearExpr::constant(min_shift)],
            );
            model.add_max_equality(
                extra,
                vec![
                    LinearExpr::var(duration).offset(-threshold),
                    LinearExpr::constant(0),
                ],
            );

            let cost_expr = LinearExpr::var(cost)
                .plus(base, -rate.den)
                .plus(extra, -rate.num);
            model.add_equality(cost_expr, 0, &[used_a.into()]);
            model.add_equality(LinearExpr::var(cost), 0, &[used_a.not()]);
            model.add_equality(
                LinearExpr::var(used_duration).plus(duration, -1),
                0,
                &[used_a.into()],
            );
            model.add_equality(LinearExpr::var(used_duration), 0, &[used_a.not()]);

            shifts.push(ShiftVars {
                start,
                end,
                duration,
                base,
                extra,
                cost,
                used_duration,
            });
        }

        // Room-change buffer on time-adjacent pairs
        let mut pairs = Vec::new();
        if self.config.buffer_minutes > 0 {
            for (i, j) in self.registry.adjacent_pairs() {
                let mut same_room = Vec::with_capacity(rooms);
                for r in 0..rooms {
                    let same = model.new_bool_var(format!("same_room_{i}_{j}_{r}"));
                    let (ri, rj) = (room[&(i, r)], room[&(j, r)]);
                    model.add_bool_and(vec![ri.into(), rj.into()], &[same.into()]);
                    model.add_bool_or(vec![ri.not(), rj.not()], &[same.not()]);
                    same_room.push(same);
                }
                let diff_room = model.new_bool_var(format!("diff_room_{i}_{j}"));
                let same_sum = LinearExpr::sum(same_room.iter().copied());
                model.add_equality(same_sum.clone(), 0, &[diff_room.into()]);
                model.add_equality(same_sum, 1, &[diff_room.not()]);

                let gap = surgeries[j].start_min - surgeries[i].end_min;
                for a in 0..n {
                    model.add_linear(
                        LinearExpr::constant(gap),
                        self.config.buffer_minutes,
                        i64::MAX,
                        &[agent[&(i, a)].into(), agent[&(j, a)].into(), diff_room.into()],
                    );
                }
                pairs.push(PairVars {
                    first: i,
                    second: j,
                    same_room,
                    diff_room,
                });
            }
        }

        // Utilization floor: floor% * sum(shift) <= 100 * sum(surgery)
        let shift_sum = shifts.iter().fold(LinearExpr::constant(0), |expr, shift| {
            expr.plus(shift.used_duration, floor_percent)
        });
        model.add_linear(shift_sum, i64::MIN, 100 * self.registry.total_minutes(), &[]);

        model.minimize(LinearExpr::sum(shifts.iter().map(|shift| shift.cost)));

        let shape = ModelShape {
            starts: surgeries.iter().map(|s| s.start_min).collect(),
            ends: surgeries.iter().map(|s| s.end_min).collect(),
            rooms,
            agents: n,
            peak_overlap: self.registry.peak_overlap(),
            max_shift_min: cap,
            floor_percent,
            cost_model,
        };

        StaffingModel {
            model,
            vars: ModelVars {
                room,
                agent,
                used,
                shifts,
                pairs,
                shape,
            },
        }
    }

    /// Builds, solves, and decodes the model.
    ///
    /// # Errors
    /// - `StaffingError::InvalidConfig` if the configuration is invalid
    /// - `StaffingError::NoSolution` if the solver returns no assignment
    pub fn solve<S: CpSolver>(&self, solver: &S) -> StaffingResult<(Schedule, CpSolution)> {
        self.config.validate()?;
        let model = self.build();
        let solution = solver.solve(&model, &self.config.solver.cp_config());
        if !solution.is_solution_found() {
            return Err(StaffingError::NoSolution {
                status: solution.status,
            });
        }
        let schedule = self.decode_solution(&model, &solution)?;
        Ok((schedule, solution))
    }

    /// Decodes room and agent booleans into a schedule with fixed times.
    ///
    /// The solution is re-checked against the model first, so any
    /// [`CpSolver`] is held to the same constraints.
    fn decode_solution(
        &self,
        built: &StaffingModel,
        solution: &CpSolution,
    ) -> StaffingResult<Schedule> {
        let no_solution = || StaffingError::NoSolution {
            status: solution.status,
        };
        let values = built.model.solution_values(solution).ok_or_else(no_solution)?;
        if let Err(violation) = built.model.check(&values) {
            warn!(%violation, "solver returned an assignment that breaks the model");
            return Err(no_solution());
        }

        let n = self.registry.len();
        let vars = &built.vars;
        let chosen = |map: &HashMap<(usize, usize), BoolVar>, i: usize, count: usize| {
            (0..count).find(|&k| map.get(&(i, k)).is_some_and(|var| values[var.index()] != 0))
        };

        let mut schedule = Schedule::new();
        for (i, surgery) in self.registry.iter().enumerate() {
            let (Some(room), Some(agent)) =
                (chosen(&vars.room, i, self.config.rooms), chosen(&vars.agent, i, n))
            else {
                return Err(no_solution());
            };
            schedule.add_assignment(Assignment {
                surgery_id: surgery.id.clone(),
                surgery_index: i,
                agent,
                room,
                start_min: surgery.start_min,
                end_min: surgery.end_min,
            });
        }
        Ok(schedule)
    }
}
