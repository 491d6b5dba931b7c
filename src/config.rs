//! Staffing configuration.
//!
//! Every tunable of the staffing problem lives here: room pool size,
//! transfer buffer, shift limits, overtime pricing, the utilization floor
//! and the exact solver's budget. Values are read from TOML; any key left
//! out falls back to the reference hospital setup.
//!
//! ```toml
//! rooms = 20
//! buffer_minutes = 15
//! min_shift_hours = 5.0
//! max_shift_hours = 12.0
//! overtime_threshold_hours = 9.0
//! overtime_rate = 0.5
//! min_utilization = 0.8
//!
//! [solver]
//! time_limit_secs = 120
//! workers = 8
//! seed = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use u_metaheur::cp::SolverConfig as CpSolverConfig;

use crate::cost::{CostModel, OvertimeRate};
use crate::error::{StaffingError, StaffingResult};

/// Problem-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffingConfig {
    /// Number of operating rooms (`R`).
    pub rooms: usize,
    /// Idle minutes required when an anesthesiologist changes rooms.
    pub buffer_minutes: i64,
    /// Minimum paid shift length (hours).
    pub min_shift_hours: f64,
    /// Hard cap on shift length (hours).
    pub max_shift_hours: f64,
    /// Shift length after which overtime is paid (hours).
    pub overtime_threshold_hours: f64,
    /// Extra cost per overtime hour, as a fraction of the base rate.
    pub overtime_rate: f64,
    /// Minimum aggregate utilization (0.0..=1.0), enforced by the exact optimizer.
    pub min_utilization: f64,
    /// Exact solver budget.
    pub solver: SolverConfig,
}

/// Budget and parallelism of the exact solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock time limit in seconds.
    pub time_limit_secs: u64,
    /// Number of parallel search workers.
    pub workers: usize,
    /// Seed for the randomized value orders of workers 1..n.
    pub seed: u64,
}

impl Default for StaffingConfig {
    fn default() -> Self {
        Self {
            rooms: 20,
            buffer_minutes: 15,
            min_shift_hours: 5.0,
            max_shift_hours: 12.0,
            overtime_threshold_hours: 9.0,
            overtime_rate: 0.5,
            min_utilization: 0.8,
            solver: SolverConfig::default(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 120,
            workers: 8,
            seed: 0,
        }
    }
}

impl SolverConfig {
    /// Sets the time limit.
    pub fn with_time_limit_secs(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Sets the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Time limit as a `Duration`.
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// Search settings in `u_metaheur`'s form. The seed is carried by the
    /// solver itself.
    pub fn cp_config(&self) -> CpSolverConfig {
        CpSolverConfig {
            time_limit_ms: i64::try_from(self.time_limit().as_millis()).unwrap_or(i64::MAX),
            num_workers: self.workers,
            stop_after_first: false,
        }
    }
}

impl StaffingConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> StaffingResult<Self> {
        let config: StaffingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: &Path) -> StaffingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Sets the room pool size.
    pub fn with_rooms(mut self, rooms: usize) -> Self {
        self.rooms = rooms;
        self
    }

    /// Sets the room-change buffer.
    pub fn with_buffer_minutes(mut self, minutes: i64) -> Self {
        self.buffer_minutes = minutes;
        self
    }

    /// Sets the hard shift cap.
    pub fn with_max_shift_hours(mut self, hours: f64) -> Self {
        self.max_shift_hours = hours;
        self
    }

    /// Sets the utilization floor.
    pub fn with_min_utilization(mut self, ratio: f64) -> Self {
        self.min_utilization = ratio;
        self
    }

    /// Sets the solver budget.
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Checks value ranges and cross-field consistency.
    pub fn validate(&self) -> StaffingResult<()> {
        let invalid = |msg: String| Err(StaffingError::InvalidConfig(msg));

        if self.rooms == 0 {
            return invalid("rooms must be at least 1".into());
        }
        if self.buffer_minutes < 0 {
            return invalid(format!("buffer_minutes must be >= 0, got {}", self.buffer_minutes));
        }
        for (name, hours) in [
            ("min_shift_hours", self.min_shift_hours),
            ("max_shift_hours", self.max_shift_hours),
            ("overtime_threshold_hours", self.overtime_threshold_hours),
        ] {
            if !hours.is_finite() || hours < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {hours}"));
            }
        }
        if self.max_shift_min() <= 0 {
            return invalid("max_shift_hours must be positive".into());
        }
        if self.min_shift_min() > self.max_shift_min() {
            return invalid(format!(
                "min_shift_hours ({}) exceeds max_shift_hours ({})",
                self.min_shift_hours, self.max_shift_hours
            ));
        }
        if !self.overtime_rate.is_finite() || self.overtime_rate < 0.0 {
            return invalid(format!("overtime_rate must be >= 0, got {}", self.overtime_rate));
        }
        if !(0.0..=1.0).contains(&self.min_utilization) {
            return invalid(format!(
                "min_utilization must be within 0.0..=1.0, got {}",
                self.min_utilization
            ));
        }
        if self.solver.workers == 0 {
            return invalid("solver.workers must be at least 1".into());
        }
        if self.solver.time_limit_secs == 0 {
            return invalid("solver.time_limit_secs must be positive".into());
        }
        Ok(())
    }

    /// Minimum paid shift in minutes.
    pub fn min_shift_min(&self) -> i64 {
        hours_to_minutes(self.min_shift_hours)
    }

    /// Hard shift cap in minutes.
    pub fn max_shift_min(&self) -> i64 {
        hours_to_minutes(self.max_shift_hours)
    }

    /// Overtime threshold in minutes.
    pub fn overtime_threshold_min(&self) -> i64 {
        hours_to_minutes(self.overtime_threshold_hours)
    }

    /// Utilization floor in whole percent (0..=100).
    pub fn utilization_floor_percent(&self) -> i64 {
        (self.min_utilization * 100.0).round() as i64
    }

    /// Builds the fixed-point cost model for these settings.
    pub fn cost_model(&self) -> CostModel {
        CostModel::new(
            self.min_shift_min(),
            self.overtime_threshold_min(),
            OvertimeRate::from_f64(self.overtime_rate),
        )
    }
}

fn hours_to_minutes(hours: f64) -> i64 {
    (hours * 60.0).round() as i64
}
