//! Two-phase greedy staffing heuristic.
//!
//! # Algorithm
//!
//! 1. **Rooms.** Walk surgeries in start order with a min-heap of
//!    `(free_at, room)`. Rooms whose `free_at <= start` return to the free
//!    pool. If fewer than `R` rooms are busy, take the lowest free room;
//!    otherwise pop the earliest-freeing room and push the surgery back to
//!    that room's `free_at`.
//! 2. **Anesthesiologists.** Walk the same order with the actual times and
//!    give each surgery to the *first* agent that is free by then (plus the
//!    transfer buffer when the room changes) and whose shift stays under the
//!    cap. If none qualifies, open a new agent.
//!
//! First-fit is not best-fit: the result is feasible but not cost-minimal,
//! and the utilization floor is never consulted.
//!
//! # Complexity
//! O(n log R) for rooms plus O(n * A) for agents, A = agents opened.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use tracing::{debug, info};

use crate::config::StaffingConfig;
use crate::models::{Assignment, Schedule, SurgeryRegistry};

/// Room and actual time slot chosen for one surgery in the room phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoomSlot {
    room: usize,
    start_min: i64,
    end_min: i64,
}

/// Running state of one anesthesiologist during the agent phase.
#[derive(Debug, Clone)]
struct AgentState {
    shift_start: i64,
    shift_end: i64,
    last_room: usize,
}

/// Greedy room-then-agent scheduler.
///
/// # Example
///
/// ```
/// use u_staffing::config::StaffingConfig;
/// use u_staffing::models::{Surgery, SurgeryRegistry};
/// use u_staffing::scheduler::GreedyScheduler;
///
/// let config = StaffingConfig::default();
/// let registry = SurgeryRegistry::new(
///     vec![Surgery::new("S1", 480, 600), Surgery::new("S2", 600, 720)],
///     &config,
/// )
/// .unwrap();
///
/// let schedule = GreedyScheduler::new(&config).schedule(&registry);
/// assert_eq!(schedule.assignment_count(), 2);
/// assert_eq!(schedule.agent_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct GreedyScheduler {
    rooms: usize,
    buffer_min: i64,
    max_shift_min: i64,
}

impl GreedyScheduler {
    /// Creates a scheduler from the problem configuration.
    pub fn new(config: &StaffingConfig) -> Self {
        Self {
            rooms: config.rooms.max(1),
            buffer_min: config.buffer_minutes,
            max_shift_min: config.max_shift_min(),
        }
    }

    /// Assigns every surgery a room and an anesthesiologist.
    ///
    /// Never fails on a validated registry: in the worst case every surgery
    /// gets its own anesthesiologist.
    pub fn schedule(&self, registry: &SurgeryRegistry) -> Schedule {
        let slots = self.assign_rooms(registry);
        let agents = self.assign_agents(&slots);

        let mut schedule = Schedule::new();
        for (index, ((surgery, slot), agent)) in registry
            .iter()
            .zip(&slots)
            .zip(agents)
            .enumerate()
        {
            schedule.add_assignment(Assignment {
                surgery_id: surgery.id.clone(),
                surgery_index: index,
                agent,
                room: slot.room,
                start_min: slot.start_min,
                end_min: slot.end_min,
            });
        }

        info!(
            surgeries = registry.len(),
            rooms = schedule.room_count(),
            agents = schedule.agent_count(),
            "greedy schedule built"
        );
        schedule
    }

    /// Phase 1: rooms, with delays when every room is busy.
    fn assign_rooms(&self, registry: &SurgeryRegistry) -> Vec<RoomSlot> {
        let mut busy: BinaryHeap<Reverse<(i64, usize)>> = BinaryHeap::with_capacity(self.rooms);
        let mut free: BTreeSet<usize> = BTreeSet::new();
        let mut next_room = 0;
        let mut slots = Vec::with_capacity(registry.len());

        for surgery in registry.iter() {
            // Release rooms that are free by this surgery's nominal start
            while let Some(&Reverse((free_at, room))) = busy.peek() {
                if free_at > surgery.start_min {
                    break;
                }
                busy.pop();
                free.insert(room);
            }

            let earliest = if busy.len() >= self.rooms {
                busy.pop()
            } else {
                None
            };
            let (room, start_min) = match earliest {
                Some(Reverse((free_at, room))) => (room, free_at.max(surgery.start_min)),
                None => {
                    let room = free.pop_first().unwrap_or_else(|| {
                        next_room += 1;
                        next_room - 1
                    });
                    (room, surgery.start_min)
                }
            };

            if start_min > surgery.start_min {
                debug!(
                    surgery = %surgery.id,
                    room,
                    delay_min = start_min - surgery.start_min,
                    "surgery delayed by room contention"
                );
            }

            let end_min = start_min + surgery.duration_min();
            busy.push(Reverse((end_min, room)));
            slots.push(RoomSlot {
                room,
                start_min,
                end_min,
            });
        }

        slots
    }

    /// Phase 2: first-fit anesthesiologists over the actual times.
    fn assign_agents(&self, slots: &[RoomSlot]) -> Vec<usize> {
        let mut agents: Vec<AgentState> = Vec::new();
        let mut assigned = Vec::with_capacity(slots.len());

        for slot in slots {
            let fit = agents.iter().position(|agent| {
                let buffer = if slot.room != agent.last_room {
                    self.buffer_min
                } else {
                    0
                };
                slot.start_min >= agent.shift_end + buffer
                    && slot.end_min - agent.shift_start <= self.max_shift_min
            });

            match fit {
                Some(index) => {
                    let agent = &mut agents[index];
                    agent.shift_end = slot.end_min;
                    agent.last_room = slot.room;
                    assigned.push(index);
                }
                None => {
                    agents.push(AgentState {
                        shift_start: slot.start_min,
                        shift_end: slot.end_min,
                        last_room: slot.room,
                    });
                    assigned.push(agents.len() - 1);
                }
            }
        }

        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Surgery;
    use proptest::prelude::*;

    fn registry(surgeries: Vec<Surgery>, config: &StaffingConfig) -> SurgeryRegistry {
        SurgeryRegistry::new(surgeries, config).unwrap()
    }

    #[test]
    fn test_single_surgery() {
        let config = StaffingConfig::default();
        let reg = registry(vec![Surgery::new("S1", 480, 600)], &config);
        let schedule = GreedyScheduler::new(&config).schedule(&reg);

        let a = schedule.assignment_for_surgery("S1").unwrap();
        assert_eq!((a.room, a.agent), (0, 0));
        assert_eq!((a.start_min, a.end_min), (480, 600));
    }

    #[test]
    fn test_back_to_back_same_room_same_agent() {
        let config = StaffingConfig::default();
        let reg = registry(
            vec![Surgery::new("S1", 480, 600), Surgery::new("S2", 600, 720)],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert_eq!(schedule.room_count(), 1);
        assert_eq!(schedule.agent_count(), 1);
        assert_eq!(schedule.agent_shifts()[0].duration_min(), 240);
    }

    #[test]
    fn test_parallel_surgeries_use_distinct_rooms_and_agents() {
        let config = StaffingConfig::default();
        let reg = registry(
            vec![
                Surgery::new("S1", 480, 600),
                Surgery::new("S2", 490, 610),
                Surgery::new("S3", 500, 620),
            ],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert_eq!(schedule.room_count(), 3);
        assert_eq!(schedule.agent_count(), 3);
    }

    #[test]
    fn test_room_contention_delays_and_propagates() {
        let config = StaffingConfig::default().with_rooms(1);
        let reg = registry(
            vec![
                Surgery::new("S1", 480, 600),
                Surgery::new("S2", 500, 560),
                Surgery::new("S3", 520, 580),
            ],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);

        let s2 = schedule.assignment_for_surgery("S2").unwrap();
        let s3 = schedule.assignment_for_surgery("S3").unwrap();
        assert_eq!((s2.start_min, s2.end_min), (600, 660));
        assert_eq!((s3.start_min, s3.end_min), (660, 720));

        // Delayed end times drive the agent's shift tracking
        let shifts = schedule.agent_shifts();
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].start_min, 480);
        assert_eq!(shifts[0].end_min, 720);
        assert!(schedule.audit(&reg, &config, false).is_empty());
    }

    #[test]
    fn test_room_ids_stay_in_pool() {
        let config = StaffingConfig::default().with_rooms(2);
        let reg = registry(
            vec![
                Surgery::new("A", 0, 100),
                Surgery::new("B", 10, 50),
                Surgery::new("C", 60, 200),
                Surgery::new("D", 120, 130),
            ],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert!(schedule.assignments.iter().all(|a| a.room < 2));
        assert!(schedule.audit(&reg, &config, false).is_empty());
    }

    #[test]
    fn test_room_change_requires_buffer() {
        // Agent 0 (Z, room 0) cannot take B: 470..660 breaks the 3h cap.
        // Agent 1 (A, room 1) ends at 600; B lands in room 0 at 605.
        let surgeries = vec![
            Surgery::new("Z", 470, 590),
            Surgery::new("A", 480, 600),
            Surgery::new("B", 605, 660),
        ];

        let config = StaffingConfig::default()
            .with_max_shift_hours(3.0)
            .with_buffer_minutes(15);
        let schedule = GreedyScheduler::new(&config).schedule(&registry(surgeries.clone(), &config));
        let b = schedule.assignment_for_surgery("B").unwrap();
        assert_eq!(b.room, 0);
        assert_eq!(b.agent, 2);

        let config = config.with_buffer_minutes(5);
        let schedule = GreedyScheduler::new(&config).schedule(&registry(surgeries, &config));
        assert_eq!(schedule.assignment_for_surgery("B").unwrap().agent, 1);
    }

    #[test]
    fn test_first_fit_not_best_fit() {
        // S3 could pack tighter behind S2, but agent 0 is scanned first
        let config = StaffingConfig::default();
        let reg = registry(
            vec![
                Surgery::new("S1", 480, 540),
                Surgery::new("S2", 500, 600),
                Surgery::new("S3", 620, 700),
            ],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert_eq!(schedule.assignment_for_surgery("S3").unwrap().agent, 0);
    }

    #[test]
    fn test_shift_cap_forces_new_agents() {
        // 3 back-to-back 12h surgeries in one room → 3 agents
        let config = StaffingConfig::default().with_rooms(1);
        let reg = registry(
            vec![
                Surgery::new("S1", 0, 720),
                Surgery::new("S2", 720, 1440),
                Surgery::new("S3", 1440, 2160),
            ],
            &config,
        );
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert_eq!(schedule.agent_count(), 3);

        // 6 back-to-back 4h surgeries (24h) → ceil(24 / 12) = 2
        let surgeries = (0..6)
            .map(|k| Surgery::new(format!("S{k}"), k * 240, (k + 1) * 240))
            .collect();
        let reg = registry(surgeries, &config);
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        assert_eq!(schedule.agent_count(), 2);
        assert!(schedule
            .agent_shifts()
            .iter()
            .all(|s| s.duration_min() <= 720));
    }

    #[test]
    fn test_total_cost() {
        let config = StaffingConfig::default();
        let reg = registry(vec![Surgery::new("S1", 0, 600)], &config);
        let schedule = GreedyScheduler::new(&config).schedule(&reg);
        let cost = schedule.total_cost(&config.cost_model());
        assert!((cost.hours() - 10.5).abs() < 1e-10);
    }

    fn surgery_set() -> impl Strategy<Value = Vec<Surgery>> {
        prop::collection::vec((0i64..1440, 1i64..300), 1..40).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(k, (start, dur))| Surgery::new(format!("S{k}"), start, start + dur))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_greedy_respects_invariants(surgeries in surgery_set(), rooms in 1usize..6) {
            let config = StaffingConfig::default().with_rooms(rooms);
            let reg = registry(surgeries, &config);
            let schedule = GreedyScheduler::new(&config).schedule(&reg);

            prop_assert_eq!(schedule.assignment_count(), reg.len());
            let violations = schedule.audit(&reg, &config, false);
            prop_assert!(violations.is_empty(), "{:?}", violations);

            // Durations are preserved, starts only move later
            for a in &schedule.assignments {
                let s = &reg.surgeries()[a.surgery_index];
                prop_assert_eq!(a.duration_min(), s.duration_min());
                prop_assert!(a.start_min >= s.start_min);
            }
        }

        #[test]
        fn prop_greedy_is_deterministic(surgeries in surgery_set()) {
            let config = StaffingConfig::default().with_rooms(3);
            let reg = registry(surgeries, &config);
            let scheduler = GreedyScheduler::new(&config);
            prop_assert_eq!(scheduler.schedule(&reg), scheduler.schedule(&reg));
        }
    }
}
