//! Staffing schedule (solution) model.
//!
//! A schedule maps every surgery to exactly one operating room and one
//! anesthesiologist, together with the times it actually runs. It is the
//! only output of either solver.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::SurgeryRegistry;
use crate::config::StaffingConfig;
use crate::cost::{Cost, CostModel, Utilization};

/// A complete staffing schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// One assignment per surgery, in registry order.
    pub assignments: Vec<Assignment>,
}

/// A surgery-room-anesthesiologist assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned surgery ID.
    pub surgery_id: String,
    /// Position of the surgery in the registry.
    pub surgery_index: usize,
    /// Anesthesiologist index.
    pub agent: usize,
    /// Operating room index in `[0, R)`.
    pub room: usize,
    /// Actual start (minutes). Equals the nominal start unless the room was busy.
    pub start_min: i64,
    /// Actual end (minutes).
    pub end_min: i64,
}

/// One anesthesiologist's shift, derived from its assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentShift {
    /// Anesthesiologist index.
    pub agent: usize,
    /// Earliest assigned start (minutes).
    pub start_min: i64,
    /// Latest assigned end (minutes).
    pub end_min: i64,
    /// Sum of assigned surgery durations (minutes).
    pub surgery_min: i64,
    /// Number of surgeries covered.
    pub surgery_count: usize,
}

impl AgentShift {
    /// Shift window length (minutes).
    #[inline]
    pub fn duration_min(&self) -> i64 {
        self.end_min - self.start_min
    }

    /// This shift's share of the utilization figure.
    pub fn utilization(&self) -> Utilization {
        Utilization::new(self.surgery_min, self.duration_min())
    }
}

/// Output row handed to the external writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    /// Actual start offset (minutes).
    pub start_time: i64,
    /// Actual end offset (minutes).
    pub end_time: i64,
    pub anesthetist_id: String,
    pub room_id: String,
}

/// A broken schedule invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related surgery, room or anesthesiologist.
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of schedule violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// A surgery has no assignment.
    Unassigned,
    /// A surgery has more than one assignment, or an unknown ID.
    DuplicateAssignment,
    /// Room index outside `[0, R)`.
    RoomOutOfRange,
    /// Two surgeries overlap in the same room.
    RoomOverlap,
    /// Two surgeries overlap for the same anesthesiologist.
    AgentOverlap,
    /// Back-to-back surgeries in different rooms without the transfer buffer.
    MissingBuffer,
    /// A shift is longer than the hard cap.
    ShiftCapExceeded,
    /// Aggregate utilization under the configured floor.
    UtilizationBelowFloor,
}

impl Violation {
    fn new(
        violation_type: ViolationType,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }
}

impl Assignment {
    /// Duration in minutes.
    #[inline]
    pub fn duration_min(&self) -> i64 {
        self.end_min - self.start_min
    }

    /// Output row with `anesth-N` / `room-N` labels.
    pub fn to_record(&self) -> AssignmentRecord {
        AssignmentRecord {
            id: self.surgery_id.clone(),
            start_time: self.start_min,
            end_time: self.end_min,
            anesthetist_id: format!("anesth-{}", self.agent),
            room_id: format!("room-{}", self.room),
        }
    }
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment.
    pub fn add_assignment(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    /// Number of assignments.
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Finds the assignment for a given surgery.
    pub fn assignment_for_surgery(&self, surgery_id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.surgery_id == surgery_id)
    }

    /// Returns all assignments of an anesthesiologist.
    pub fn assignments_for_agent(&self, agent: usize) -> Vec<&Assignment> {
        self.assignments.iter().filter(|a| a.agent == agent).collect()
    }

    /// Returns all assignments in a room.
    pub fn assignments_for_room(&self, room: usize) -> Vec<&Assignment> {
        self.assignments.iter().filter(|a| a.room == room).collect()
    }

    /// Shift of every used anesthesiologist, ordered by agent index.
    pub fn agent_shifts(&self) -> Vec<AgentShift> {
        let mut shifts: BTreeMap<usize, AgentShift> = BTreeMap::new();
        for a in &self.assignments {
            shifts
                .entry(a.agent)
                .and_modify(|s| {
                    s.start_min = s.start_min.min(a.start_min);
                    s.end_min = s.end_min.max(a.end_min);
                    s.surgery_min += a.duration_min();
                    s.surgery_count += 1;
                })
                .or_insert(AgentShift {
                    agent: a.agent,
                    start_min: a.start_min,
                    end_min: a.end_min,
                    surgery_min: a.duration_min(),
                    surgery_count: 1,
                });
        }
        shifts.into_values().collect()
    }

    /// Number of distinct anesthesiologists used.
    pub fn agent_count(&self) -> usize {
        self.agent_shifts().len()
    }

    /// Number of distinct rooms used.
    pub fn room_count(&self) -> usize {
        let mut rooms: Vec<usize> = self.assignments.iter().map(|a| a.room).collect();
        rooms.sort_unstable();
        rooms.dedup();
        rooms.len()
    }

    /// Sum of shift costs over used anesthesiologists.
    pub fn total_cost(&self, cost_model: &CostModel) -> Cost {
        cost_model.total_cost(self.agent_shifts().iter().map(AgentShift::duration_min))
    }

    /// Aggregate utilization over used anesthesiologists.
    pub fn utilization(&self) -> Utilization {
        self.agent_shifts()
            .iter()
            .fold(Utilization::default(), |acc, s| acc + s.utilization())
    }

    /// Output rows in assignment order.
    pub fn records(&self) -> Vec<AssignmentRecord> {
        self.assignments.iter().map(Assignment::to_record).collect()
    }

    /// Checks the schedule against every staffing invariant.
    ///
    /// The utilization floor is only checked when `check_utilization` is
    /// set, since the greedy scheduler does not promise it.
    pub fn audit(
        &self,
        registry: &SurgeryRegistry,
        config: &StaffingConfig,
        check_utilization: bool,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        // Coverage: every surgery exactly once
        let mut seen: HashMap<&str, usize> = registry.iter().map(|s| (s.id.as_str(), 0)).collect();
        for a in &self.assignments {
            match seen.get_mut(a.surgery_id.as_str()) {
                Some(count) => *count += 1,
                None => violations.push(Violation::new(
                    ViolationType::DuplicateAssignment,
                    &a.surgery_id,
                    format!("Unknown surgery '{}'", a.surgery_id),
                )),
            }
            if a.room >= config.rooms {
                violations.push(Violation::new(
                    ViolationType::RoomOutOfRange,
                    format!("room-{}", a.room),
                    format!("Surgery '{}' uses room {} of {}", a.surgery_id, a.room, config.rooms),
                ));
            }
        }
        for s in registry.iter() {
            match seen.get(s.id.as_str()).copied().unwrap_or(0) {
                0 => violations.push(Violation::new(
                    ViolationType::Unassigned,
                    &s.id,
                    format!("Surgery '{}' has no assignment", s.id),
                )),
                1 => {}
                n => violations.push(Violation::new(
                    ViolationType::DuplicateAssignment,
                    &s.id,
                    format!("Surgery '{}' is assigned {n} times", s.id),
                )),
            }
        }

        // Room exclusivity
        for (room, list) in self.sorted_by(|a| a.room) {
            for pair in list.windows(2) {
                if pair[0].end_min > pair[1].start_min {
                    violations.push(Violation::new(
                        ViolationType::RoomOverlap,
                        format!("room-{room}"),
                        format!(
                            "Surgeries '{}' and '{}' overlap in room {room}",
                            pair[0].surgery_id, pair[1].surgery_id
                        ),
                    ));
                }
            }
        }

        // Anesthesiologist exclusivity and room-change buffer
        for (agent, list) in self.sorted_by(|a| a.agent) {
            for pair in list.windows(2) {
                let (first, second) = (pair[0], pair[1]);
                if first.end_min > second.start_min {
                    violations.push(Violation::new(
                        ViolationType::AgentOverlap,
                        format!("anesth-{agent}"),
                        format!(
                            "Surgeries '{}' and '{}' overlap for anesthesiologist {agent}",
                            first.surgery_id, second.surgery_id
                        ),
                    ));
                } else if config.buffer_minutes > 0
                    && first.end_min == second.start_min
                    && first.room != second.room
                {
                    violations.push(Violation::new(
                        ViolationType::MissingBuffer,
                        format!("anesth-{agent}"),
                        format!(
                            "Anesthesiologist {agent} moves from room {} to room {} with no buffer after '{}'",
                            first.room, second.room, first.surgery_id
                        ),
                    ));
                }
            }
        }

        // Shift cap
        let cap = config.max_shift_min();
        for shift in self.agent_shifts() {
            if shift.duration_min() > cap {
                violations.push(Violation::new(
                    ViolationType::ShiftCapExceeded,
                    format!("anesth-{}", shift.agent),
                    format!(
                        "Shift of anesthesiologist {} lasts {} min (cap {cap})",
                        shift.agent,
                        shift.duration_min()
                    ),
                ));
            }
        }

        if check_utilization {
            let floor = config.utilization_floor_percent();
            let utilization = self.utilization();
            if !utilization.meets_floor(floor) {
                violations.push(Violation::new(
                    ViolationType::UtilizationBelowFloor,
                    "schedule",
                    format!(
                        "Utilization {:.1}% is below the {floor}% floor",
                        utilization.ratio() * 100.0
                    ),
                ));
            }
        }

        violations
    }

    /// Groups assignments by a key, each group sorted by start time.
    fn sorted_by(&self, key: impl Fn(&Assignment) -> usize) -> BTreeMap<usize, Vec<&Assignment>> {
        let mut groups: BTreeMap<usize, Vec<&Assignment>> = BTreeMap::new();
        for a in &self.assignments {
            groups.entry(key(a)).or_default().push(a);
        }
        for list in groups.values_mut() {
            list.sort_by_key(|a| (a.start_min, a.end_min));
        }
        groups
    }
}
