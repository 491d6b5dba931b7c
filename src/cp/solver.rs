//! Parallel branch-and-bound solver for the staffing model.
//!
//! # Algorithm
//!
//! An instance where more surgeries overlap than there are rooms is
//! reported `Infeasible` without searching; interval coloring needs exactly
//! the peak overlap in rooms.
//!
//! Depth-first search over surgeries in start order. Each level picks an
//! anesthesiologist (an existing one that is free and stays under the cap,
//! or the next unused index) and then a room.
//!
//! - **Symmetry.** A new anesthesiologist is always the lowest unused
//!   index, matching the model's `used[a-1] >= used[a]` chain. Free rooms
//!   whose last surgery ended before the current start are
//!   interchangeable, so only one of them (or a fresh room) is tried.
//!   Rooms freed *exactly* at the current start stay distinct, because the
//!   room-change buffer refers to them.
//! - **Bounds.** Shift costs only grow as windows widen, so the running
//!   cost is a lower bound. The utilization floor is checked on the running
//!   shift total, which also only grows.
//! - **Parallelism.** Worker 0 follows a deterministic cheapest-first
//!   order; the other workers shuffle their value orders with seeded RNGs.
//!   All workers share the incumbent bound. The first worker to exhaust its
//!   tree proves optimality (or infeasibility) and stops the others.
//!
//! Every incumbent is turned into a full assignment of model variables and
//! re-checked with [`CpModel::check`](super::CpModel::check) before it is
//! accepted.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use u_metaheur::cp::{CpSolution, SolverConfig, SolverStatus};

use super::{ModelShape, StaffingModel};

/// Nodes explored between wall-clock checks.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// A solver for staffing models.
///
/// Results use `u_metaheur`'s solution form: variables and intervals keyed
/// by name, the objective in the cost model's fixed-point units.
pub trait CpSolver {
    fn solve(&self, model: &StaffingModel, config: &SolverConfig) -> CpSolution;
}

/// Exact parallel branch-and-bound search.
///
/// `config.stop_after_first` ends the search at the first accepted
/// incumbent, reported as `Feasible`.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBoundSolver {
    seed: u64,
}

impl BranchAndBoundSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the shuffle seed from the crate configuration.
    pub fn from_config(config: &crate::config::SolverConfig) -> Self {
        Self::new().with_seed(config.seed)
    }

    /// Sets the seed for the randomized value orders of workers 1..n.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl CpSolver for BranchAndBoundSolver {
    fn solve(&self, model: &StaffingModel, config: &SolverConfig) -> CpSolution {
        let started = Instant::now();
        let shape = &model.vars.shape;

        if shape.peak_overlap > shape.rooms {
            info!(
                peak_overlap = shape.peak_overlap,
                rooms = shape.rooms,
                "more surgeries overlap than there are rooms"
            );
            let mut solution = CpSolution::empty(SolverStatus::Infeasible);
            solution.solve_time_ms = elapsed_ms(started);
            return solution;
        }

        let budget = Duration::from_millis(u64::try_from(config.time_limit_ms).unwrap_or(0));
        let deadline = started + budget;
        let workers = config.num_workers.max(1);
        let shared = Shared::new(config.stop_after_first);

        info!(
            surgeries = shape.surgery_count(),
            variables = model.model.var_count(),
            constraints = model.model.constraint_count(),
            workers,
            time_limit_ms = config.time_limit_ms,
            "exact search started"
        );

        let reports: Vec<WorkerReport> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let shared = &shared;
                    let seed = self.seed.wrapping_add(worker as u64);
                    scope.spawn(move || {
                        let rng = (worker > 0).then(|| StdRng::seed_from_u64(seed));
                        Search::new(model, shared, deadline, rng, worker).run()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

        let completed = reports.iter().any(|r| r.completed);
        let nodes = reports.iter().map(|r| r.nodes).sum();
        let incumbents = shared.incumbents.load(Ordering::Relaxed);
        let incumbent = shared
            .incumbent
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let status = match (completed, incumbent.is_some()) {
            (true, true) => SolverStatus::Optimal,
            (true, false) => SolverStatus::Infeasible,
            (false, true) => SolverStatus::Feasible,
            (false, false) => SolverStatus::Unknown,
        };
        if !completed && !config.stop_after_first {
            warn!(?status, "time budget exhausted before the search completed");
        }

        let mut solution = match &incumbent {
            Some(inc) => model.model.to_solution(status, &inc.values),
            None => CpSolution::empty(status),
        };
        solution.num_nodes = nodes;
        solution.solve_time_ms = elapsed_ms(started);

        info!(
            ?status,
            objective = ?incumbent.as_ref().map(|inc| inc.cost),
            nodes,
            incumbents,
            elapsed_ms = solution.solve_time_ms,
            "exact search finished"
        );
        solution
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// Best solution found so far.
#[derive(Debug)]
struct Incumbent {
    cost: i64,
    values: Vec<i64>,
}

/// State shared by all workers.
struct Shared {
    best: AtomicI64,
    incumbent: Mutex<Option<Incumbent>>,
    incumbents: AtomicU64,
    stop: AtomicBool,
    stop_after_first: bool,
}

impl Shared {
    fn new(stop_after_first: bool) -> Self {
        Self {
            best: AtomicI64::new(i64::MAX),
            incumbent: Mutex::new(None),
            incumbents: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            stop_after_first,
        }
    }

    fn best(&self) -> i64 {
        self.best.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct WorkerReport {
    nodes: u64,
    completed: bool,
}

/// An anesthesiologist choice with its marginal cost and shift growth.
#[derive(Debug, Clone, Copy)]
struct AgentChoice {
    agent: usize,
    delta_cost: i64,
    delta_shift: i64,
}

/// What `apply` overwrote.
#[derive(Debug, Clone, Copy)]
struct Undo {
    new_agent: bool,
    old_agent_end: i64,
    new_room: bool,
    old_room_end: i64,
}

/// One worker's depth-first search.
struct Search<'a> {
    model: &'a StaffingModel,
    shape: &'a ModelShape,
    shared: &'a Shared,
    deadline: Instant,
    rng: Option<StdRng>,
    worker: usize,
    /// For each surgery, the surgeries that end exactly when it starts.
    preds: Vec<Vec<usize>>,
    /// Whether rooms freed exactly at the current start must stay distinct.
    buffered: bool,
    surgery_min: i64,

    agent_of: Vec<usize>,
    room_of: Vec<usize>,
    /// `(start, end)` of every opened anesthesiologist.
    windows: Vec<(i64, i64)>,
    /// Latest end of every opened room.
    room_end: Vec<i64>,
    cost: i64,
    shift: i64,

    nodes: u64,
    aborted: bool,
}

impl<'a> Search<'a> {
    fn new(
        model: &'a StaffingModel,
        shared: &'a Shared,
        deadline: Instant,
        rng: Option<StdRng>,
        worker: usize,
    ) -> Self {
        let shape = &model.vars.shape;
        let n = shape.surgery_count();
        let mut preds = vec![Vec::new(); n];
        for pair in &model.vars.pairs {
            preds[pair.second].push(pair.first);
        }

        Self {
            model,
            shape,
            shared,
            deadline,
            rng,
            worker,
            preds,
            buffered: !model.vars.pairs.is_empty(),
            surgery_min: shape.total_surgery_min(),
            agent_of: vec![0; n],
            room_of: vec![0; n],
            windows: Vec::new(),
            room_end: Vec::new(),
            cost: 0,
            shift: 0,
            nodes: 0,
            aborted: false,
        }
    }

    fn run(mut self) -> WorkerReport {
        if Instant::now() >= self.deadline {
            self.aborted = true;
        } else {
            self.dfs(0);
        }
        let completed = !self.aborted;
        if completed {
            self.shared.stop.store(true, Ordering::Release);
        }
        debug!(worker = self.worker, nodes = self.nodes, completed, "worker finished");
        WorkerReport {
            nodes: self.nodes,
            completed,
        }
    }

    fn dfs(&mut self, i: usize) {
        if self.should_stop() {
            return;
        }
        if i == self.shape.surgery_count() {
            self.record();
            return;
        }

        for choice in self.agent_choices(i) {
            // Choices are sorted by marginal cost
            if self.cost + choice.delta_cost >= self.shared.best() {
                break;
            }
            if !self.within_floor(self.shift + choice.delta_shift) {
                continue;
            }
            for room in self.room_choices(i, choice.agent) {
                if self.cost + choice.delta_cost >= self.shared.best() {
                    break;
                }
                let undo = self.apply(i, choice, room);
                self.dfs(i + 1);
                self.undo(choice, room, undo);
                if self.aborted {
                    return;
                }
            }
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        self.nodes += 1;
        if self.shared.stop.load(Ordering::Acquire)
            || (self.nodes % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline)
        {
            self.aborted = true;
        }
        self.aborted
    }

    fn within_floor(&self, shift_total: i64) -> bool {
        100 * self.surgery_min >= self.shape.floor_percent * shift_total
    }

    fn agent_choices(&mut self, i: usize) -> Vec<AgentChoice> {
        let (start, end) = (self.shape.starts[i], self.shape.ends[i]);
        let cost_model = &self.shape.cost_model;
        let mut choices = Vec::with_capacity(self.windows.len() + 1);

        for (agent, &(w_start, w_end)) in self.windows.iter().enumerate() {
            // All earlier surgeries started no later, so w_end is the only clash
            if start < w_end || end - w_start > self.shape.max_shift_min {
                continue;
            }
            choices.push(AgentChoice {
                agent,
                delta_cost: cost_model.scaled_cost(end - w_start)
                    - cost_model.scaled_cost(w_end - w_start),
                delta_shift: end - w_end,
            });
        }
        if self.windows.len() < self.shape.agents {
            choices.push(AgentChoice {
                agent: self.windows.len(),
                delta_cost: cost_model.scaled_cost(end - start),
                delta_shift: end - start,
            });
        }

        match self.rng.as_mut() {
            Some(rng) => {
                choices.shuffle(rng);
                choices.sort_by_key(|c| c.delta_cost);
            }
            None => choices.sort_by_key(|c| (c.delta_cost, c.delta_shift, c.agent)),
        }
        choices
    }

    fn room_choices(&mut self, i: usize, agent: usize) -> Vec<usize> {
        let start = self.shape.starts[i];

        if self.buffered && agent < self.windows.len() {
            let mut forced = self.preds[i]
                .iter()
                .filter(|&&p| self.agent_of[p] == agent)
                .map(|&p| self.room_of[p]);
            if let Some(room) = forced.next() {
                // Back-to-back with the same anesthesiologist: stay in the room
                let free = self.room_end.get(room).is_some_and(|&e| e <= start);
                let consistent = forced.all(|r| r == room);
                return if free && consistent { vec![room] } else { Vec::new() };
            }
        }

        let mut plain = None;
        let mut tied = Vec::new();
        for (room, &end) in self.room_end.iter().enumerate() {
            if end > start {
                continue;
            }
            if self.buffered && end == start {
                tied.push(room);
            } else if plain.is_none() {
                plain = Some(room);
            }
        }
        if plain.is_none() && self.room_end.len() < self.shape.rooms {
            plain = Some(self.room_end.len());
        }

        let mut rooms: Vec<usize> = plain.into_iter().chain(tied).collect();
        if let Some(rng) = self.rng.as_mut() {
            rooms.shuffle(rng);
        }
        rooms
    }

    fn apply(&mut self, i: usize, choice: AgentChoice, room: usize) -> Undo {
        let (start, end) = (self.shape.starts[i], self.shape.ends[i]);
        let mut undo = Undo {
            new_agent: choice.agent == self.windows.len(),
            old_agent_end: 0,
            new_room: room == self.room_end.len(),
            old_room_end: 0,
        };

        if undo.new_agent {
            self.windows.push((start, end));
        } else {
            undo.old_agent_end = self.windows[choice.agent].1;
            self.windows[choice.agent].1 = end;
        }
        if undo.new_room {
            self.room_end.push(end);
        } else {
            undo.old_room_end = self.room_end[room];
            self.room_end[room] = end;
        }

        self.agent_of[i] = choice.agent;
        self.room_of[i] = room;
        self.cost += choice.delta_cost;
        self.shift += choice.delta_shift;
        undo
    }

    fn undo(&mut self, choice: AgentChoice, room: usize, undo: Undo) {
        self.cost -= choice.delta_cost;
        self.shift -= choice.delta_shift;
        if undo.new_room {
            self.room_end.pop();
        } else {
            self.room_end[room] = undo.old_room_end;
        }
        if undo.new_agent {
            self.windows.pop();
        } else {
            self.windows[choice.agent].1 = undo.old_agent_end;
        }
    }

    fn record(&mut self) {
        let mut incumbent = self
            .shared
            .incumbent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.cost >= self.shared.best() {
            return;
        }

        let values = self.model.vars.valuation(
            self.model.model.var_count(),
            &self.agent_of,
            &self.room_of,
        );
        if let Err(violation) = self.model.model.check(&values) {
            warn!(worker = self.worker, %violation, "incumbent rejected by model check");
            return;
        }

        let cost = self.model.model.objective_value(&values).unwrap_or(self.cost);
        debug!(worker = self.worker, cost, agents = self.windows.len(), "new incumbent");
        self.shared.best.store(cost, Ordering::Release);
        self.shared.incumbents.fetch_add(1, Ordering::Relaxed);
        *incumbent = Some(Incumbent { cost, values });
        if self.shared.stop_after_first {
            self.aborted = true;
            self.shared.stop.store(true, Ordering::Release);
        }
    }
}
