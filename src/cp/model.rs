//! Constraint model vocabulary.
//!
//! A deliberately small CP language: bounded integer variables, booleans
//! (0/1 integers), literals, linear expressions, fixed-time optional
//! intervals, and the handful of constraints the staffing formulation
//! needs. A model is plain data; `CpModel::check` evaluates it against a
//! complete assignment of values.
//!
//! Intervals are `u_metaheur::cp::IntervalVar`s with a fixed start and a
//! presence literal, and solutions are reported in `u_metaheur`'s
//! name-keyed [`CpSolution`] form. The constraint kinds themselves
//! (enforced linear, `BoolAnd`/`BoolOr`, `MaxEquality`) have no
//! `u_metaheur::cp::Constraint` counterpart and live here.
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Perron & Furnon, "OR-Tools CP-SAT" modelling primitives

use thiserror::Error;
use u_metaheur::cp::{self as metaheur, CpSolution, IntervalSolution, SolverStatus};

/// Anything that indexes into the model's variable arena.
pub trait Var: Copy {
    fn index(self) -> usize;
}

/// Integer variable handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVar(usize);

/// Boolean variable handle (an integer variable with domain `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(usize);

/// Interval handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalVar(usize);

impl Var for IntVar {
    fn index(self) -> usize {
        self.0
    }
}

impl Var for BoolVar {
    fn index(self) -> usize {
        self.0
    }
}

impl BoolVar {
    /// Negated literal.
    pub fn not(self) -> Literal {
        Literal {
            var: self,
            negated: true,
        }
    }
}

/// A boolean variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    pub var: BoolVar,
    pub negated: bool,
}

impl From<BoolVar> for Literal {
    fn from(var: BoolVar) -> Self {
        Literal {
            var,
            negated: false,
        }
    }
}

impl Literal {
    fn holds(&self, values: &[i64]) -> bool {
        (values[self.var.0] != 0) != self.negated
    }
}

/// `Σ coeff * var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub terms: Vec<(usize, i64)>,
    pub constant: i64,
}

impl LinearExpr {
    /// A constant expression.
    pub fn constant(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// `1 * var`.
    pub fn var(var: impl Var) -> Self {
        Self::default().plus(var, 1)
    }

    /// `Σ vars`.
    pub fn sum<V: Var>(vars: impl IntoIterator<Item = V>) -> Self {
        vars.into_iter()
            .fold(Self::default(), |expr, v| expr.plus(v, 1))
    }

    /// Adds `coeff * var`.
    pub fn plus(mut self, var: impl Var, coeff: i64) -> Self {
        self.terms.push((var.index(), coeff));
        self
    }

    /// Adds a constant offset.
    pub fn offset(mut self, value: i64) -> Self {
        self.constant += value;
        self
    }

    /// Evaluates under a full assignment.
    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .map(|&(var, coeff)| coeff * values[var])
            .sum::<i64>()
            + self.constant
    }
}

/// Declared variable with its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDef {
    pub name: String,
    pub lb: i64,
    pub ub: i64,
    /// Declared with `new_bool_var`; reported under `bool_vars`.
    pub boolean: bool,
}

/// Fixed-time interval, present only when its literal holds.
#[derive(Debug, Clone)]
pub struct IntervalDef {
    pub var: metaheur::IntervalVar,
    pub presence: Literal,
}

impl IntervalDef {
    pub fn name(&self) -> &str {
        &self.var.name
    }

    pub fn start(&self) -> i64 {
        self.var.start.min
    }

    pub fn end(&self) -> i64 {
        self.var.end.min
    }
}

/// A model constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Exactly one literal holds.
    ExactlyOne(Vec<Literal>),
    /// Present intervals are pairwise disjoint.
    NoOverlap(Vec<IntervalVar>),
    /// `target == max(exprs)`.
    MaxEquality { target: usize, exprs: Vec<LinearExpr> },
    /// `lb <= expr <= ub` whenever every enforcement literal holds.
    Linear {
        expr: LinearExpr,
        lb: i64,
        ub: i64,
        enforce: Vec<Literal>,
    },
    /// All literals hold whenever every enforcement literal holds.
    BoolAnd {
        literals: Vec<Literal>,
        enforce: Vec<Literal>,
    },
    /// At least one literal holds whenever every enforcement literal holds.
    BoolOr {
        literals: Vec<Literal>,
        enforce: Vec<Literal>,
    },
}

/// A model that failed to check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ModelViolation {
    /// Index of the violated constraint, `None` for domain/shape errors.
    pub constraint: Option<usize>,
    pub message: String,
}

/// A constraint model with an optional minimisation objective.
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    name: String,
    vars: Vec<VarDef>,
    intervals: Vec<IntervalDef>,
    constraints: Vec<Constraint>,
    objective: Option<LinearExpr>,
}

impl CpModel {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares an integer variable with domain `[lb, ub]`.
    pub fn new_int_var(&mut self, lb: i64, ub: i64, name: impl Into<String>) -> IntVar {
        self.vars.push(VarDef {
            name: name.into(),
            lb,
            ub,
            boolean: false,
        });
        IntVar(self.vars.len() - 1)
    }

    /// Declares a boolean variable.
    pub fn new_bool_var(&mut self, name: impl Into<String>) -> BoolVar {
        let IntVar(index) = self.new_int_var(0, 1, name);
        self.vars[index].boolean = true;
        BoolVar(index)
    }

    /// Declares a fixed-time interval `[start, end)` gated by `presence`.
    pub fn new_optional_interval(
        &mut self,
        start: i64,
        end: i64,
        presence: impl Into<Literal>,
        name: impl Into<String>,
    ) -> IntervalVar {
        let presence = presence.into();
        let presence_name = match presence.negated {
            false => self.vars[presence.var.0].name.clone(),
            true => format!("!{}", self.vars[presence.var.0].name),
        };
        let var = metaheur::IntervalVar::new(name, start, start, end - start, end)
            .as_optional(presence_name);
        self.intervals.push(IntervalDef { var, presence });
        IntervalVar(self.intervals.len() - 1)
    }

    pub fn add_exactly_one(&mut self, literals: Vec<Literal>) {
        self.constraints.push(Constraint::ExactlyOne(literals));
    }

    pub fn add_no_overlap(&mut self, intervals: Vec<IntervalVar>) {
        self.constraints.push(Constraint::NoOverlap(intervals));
    }

    pub fn add_max_equality(&mut self, target: impl Var, exprs: Vec<LinearExpr>) {
        self.constraints.push(Constraint::MaxEquality {
            target: target.index(),
            exprs,
        });
    }

    /// `lb <= expr <= ub`, enforced only when all `enforce` literals hold.
    pub fn add_linear(&mut self, expr: LinearExpr, lb: i64, ub: i64, enforce: &[Literal]) {
        self.constraints.push(Constraint::Linear {
            expr,
            lb,
            ub,
            enforce: enforce.to_vec(),
        });
    }

    /// `expr == value`, enforced only when all `enforce` literals hold.
    pub fn add_equality(&mut self, expr: LinearExpr, value: i64, enforce: &[Literal]) {
        self.add_linear(expr, value, value, enforce);
    }

    pub fn add_bool_and(&mut self, literals: Vec<Literal>, enforce: &[Literal]) {
        self.constraints.push(Constraint::BoolAnd {
            literals,
            enforce: enforce.to_vec(),
        });
    }

    pub fn add_bool_or(&mut self, literals: Vec<Literal>, enforce: &[Literal]) {
        self.constraints.push(Constraint::BoolOr {
            literals,
            enforce: enforce.to_vec(),
        });
    }

    /// Sets the expression to minimise.
    pub fn minimize(&mut self, expr: LinearExpr) {
        self.objective = Some(expr);
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn var(&self, var: impl Var) -> &VarDef {
        &self.vars[var.index()]
    }

    pub fn interval(&self, interval: IntervalVar) -> &IntervalDef {
        &self.intervals[interval.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> Option<&LinearExpr> {
        self.objective.as_ref()
    }

    /// Objective value under a full assignment.
    pub fn objective_value(&self, values: &[i64]) -> Option<i64> {
        self.objective.as_ref().map(|expr| expr.evaluate(values))
    }

    /// Reports a full assignment as a name-keyed solution.
    pub fn to_solution(&self, status: SolverStatus, values: &[i64]) -> CpSolution {
        let mut solution = CpSolution::empty(status);
        for (def, &value) in self.vars.iter().zip(values) {
            if def.boolean {
                solution.bool_vars.insert(def.name.clone(), value != 0);
            } else {
                solution.int_vars.insert(def.name.clone(), value);
            }
        }
        for def in &self.intervals {
            let (start, end) = (def.start(), def.end());
            solution.intervals.insert(
                def.name().to_string(),
                IntervalSolution {
                    start,
                    end,
                    duration: end - start,
                    is_present: def.presence.holds(values),
                },
            );
        }
        solution.objective_value = self.objective_value(values).map(|v| v as f64);
        solution
    }

    /// Recovers the full assignment from a name-keyed solution.
    ///
    /// `None` if any variable is missing.
    pub fn solution_values(&self, solution: &CpSolution) -> Option<Vec<i64>> {
        self.vars
            .iter()
            .map(|def| match def.boolean {
                true => solution.bool_vars.get(&def.name).map(|&b| i64::from(b)),
                false => solution.int_vars.get(&def.name).copied(),
            })
            .collect()
    }

    /// Checks domains and every constraint under a full assignment.
    pub fn check(&self, values: &[i64]) -> Result<(), ModelViolation> {
        if values.len() != self.vars.len() {
            return Err(ModelViolation {
                constraint: None,
                message: format!(
                    "expected {} values, got {}",
                    self.vars.len(),
                    values.len()
                ),
            });
        }

        for (def, &value) in self.vars.iter().zip(values) {
            if value < def.lb || value > def.ub {
                return Err(ModelViolation {
                    constraint: None,
                    message: format!(
                        "{} = {value} outside domain [{}, {}]",
                        def.name, def.lb, def.ub
                    ),
                });
            }
        }

        for (index, constraint) in self.constraints.iter().enumerate() {
            if !self.satisfied(constraint, values) {
                return Err(ModelViolation {
                    constraint: Some(index),
                    message: format!("constraint #{index} violated: {constraint:?}"),
                });
            }
        }

        Ok(())
    }

    fn satisfied(&self, constraint: &Constraint, values: &[i64]) -> bool {
        let enforced = |lits: &[Literal]| lits.iter().all(|l| l.holds(values));

        match constraint {
            Constraint::ExactlyOne(lits) => lits.iter().filter(|l| l.holds(values)).count() == 1,
            Constraint::NoOverlap(ids) => {
                let mut present: Vec<(i64, i64)> = ids
                    .iter()
                    .map(|&IntervalVar(i)| &self.intervals[i])
                    .filter(|iv| iv.presence.holds(values))
                    .map(|iv| (iv.start(), iv.end()))
                    .collect();
                present.sort_unstable();
                present.windows(2).all(|w| w[0].1 <= w[1].0)
            }
            Constraint::MaxEquality { target, exprs } => exprs
                .iter()
                .map(|e| e.evaluate(values))
                .max()
                .is_some_and(|max| values[*target] == max),
            Constraint::Linear {
                expr,
                lb,
                ub,
                enforce,
            } => {
                if !enforced(enforce) {
                    return true;
                }
                let value = expr.evaluate(values);
                *lb <= value && value <= *ub
            }
            Constraint::BoolAnd { literals, enforce } => {
                !enforced(enforce) || literals.iter().all(|l| l.holds(values))
            }
            Constraint::BoolOr { literals, enforce } => {
                !enforced(enforce) || literals.iter().any(|l| l.holds(values))
            }
        }
    }
}
