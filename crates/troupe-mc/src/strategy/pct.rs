//! Priority-bounded exploration: random priorities with a bounded number of
//! priority change points per iteration.

use super::SchedulingStrategy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use troupe_machine::MachineId;

/// Priority-bounded strategy.
///
/// Each machine gets a random priority on first sight; the highest-priority
/// runnable machine runs, except at a change point, where the current highest
/// is demoted to the lowest priority. With `d` change points the strategy
/// covers every bug of priority-inversion depth at most `d`.
pub struct PctStrategy {
    seed: u64,
    rng: StdRng,
    /// Front is the highest priority.
    priorities: Vec<MachineId>,
    change_points: HashSet<usize>,
    max_priority_changes: usize,
    /// Scheduling decisions made this iteration (change points index these).
    sched_steps: usize,
    /// Longest iteration seen, for spreading the next change points.
    longest_iteration: usize,
    steps: usize,
    max_steps: usize,
}

impl PctStrategy {
    pub fn new(seed: u64, max_priority_changes: usize, max_steps: usize) -> Self {
        let mut strategy = Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            priorities: Vec::new(),
            change_points: HashSet::new(),
            max_priority_changes,
            sched_steps: 0,
            longest_iteration: 0,
            steps: 0,
            max_steps,
        };
        strategy.sample_change_points();
        strategy
    }

    /// Draw `max_priority_changes` distinct scheduling steps to demote at.
    fn sample_change_points(&mut self) {
        self.change_points.clear();
        let horizon = self.longest_iteration.max(self.max_priority_changes).max(1);
        let mut steps: Vec<usize> = (0..horizon).collect();
        steps.shuffle(&mut self.rng);
        self.change_points
            .extend(steps.into_iter().take(self.max_priority_changes));
    }

    /// A change point on a step with a single candidate is wasted; slide it
    /// to the next free step.
    fn slide_change_point(&mut self) {
        self.change_points.remove(&self.sched_steps);
        let mut next = self.sched_steps + 1;
        while self.change_points.contains(&next) {
            next += 1;
        }
        self.change_points.insert(next);
    }
}

impl SchedulingStrategy for PctStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], _current: MachineId) -> Option<MachineId> {
        if runnable.is_empty() {
            return None;
        }
        // Insert machines seen for the first time at random priorities.
        for &id in runnable {
            if !self.priorities.contains(&id) {
                let slot = self.rng.gen_range(0..=self.priorities.len());
                self.priorities.insert(slot, id);
            }
        }
        if self.change_points.contains(&self.sched_steps) {
            if runnable.len() == 1 {
                self.slide_change_point();
            } else if let Some(pos) = self
                .priorities
                .iter()
                .position(|id| runnable.contains(id))
            {
                let demoted = self.priorities.remove(pos);
                self.priorities.push(demoted);
            }
        }
        let picked = self
            .priorities
            .iter()
            .find(|id| runnable.contains(*id))
            .copied();
        self.sched_steps += 1;
        self.steps += 1;
        picked
    }

    fn next_bool(&mut self, max_value: usize) -> Option<bool> {
        self.steps += 1;
        Some(self.rng.gen_range(0..max_value.max(1)) == 0)
    }

    fn next_int(&mut self, max_value: usize) -> Option<usize> {
        self.steps += 1;
        Some(self.rng.gen_range(0..max_value.max(1)))
    }

    fn explored_steps(&self) -> usize {
        self.steps
    }

    fn max_steps_reached(&self) -> bool {
        self.max_steps > 0 && self.steps >= self.max_steps
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn has_finished(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.longest_iteration = self.longest_iteration.max(self.sched_steps);
        self.sched_steps = 0;
        self.steps = 0;
        self.priorities.clear();
        self.sample_change_points();
    }

    fn reset(&mut self) {
        *self = Self::new(self.seed, self.max_priority_changes, self.max_steps);
    }

    fn description(&self) -> String {
        format!(
            "pct[seed={},changes={}]",
            self.seed, self.max_priority_changes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ns: &[u64]) -> Vec<MachineId> {
        ns.iter().copied().map(MachineId).collect()
    }

    #[test]
    fn highest_priority_runnable_machine_wins_repeatedly() {
        let runnable = ids(&[0, 1, 2]);
        let mut strategy = PctStrategy::new(11, 0, 0);
        let first = strategy.next_machine(&runnable, MachineId(0)).unwrap();
        // With no change points the same machine keeps running.
        for _ in 0..10 {
            assert_eq!(strategy.next_machine(&runnable, MachineId(0)), Some(first));
        }
    }

    #[test]
    fn blocked_machines_fall_through_to_lower_priorities() {
        let mut strategy = PctStrategy::new(11, 0, 0);
        let all = ids(&[0, 1]);
        let first = strategy.next_machine(&all, MachineId(0)).unwrap();
        let other = if first == MachineId(0) {
            MachineId(1)
        } else {
            MachineId(0)
        };
        // The top machine left the runnable set: the next one runs.
        assert_eq!(strategy.next_machine(&[other], MachineId(0)), Some(other));
    }

    #[test]
    fn deterministic_for_a_seed() {
        let runnable = ids(&[0, 1, 2, 3]);
        let mut a = PctStrategy::new(5, 2, 0);
        let mut b = PctStrategy::new(5, 2, 0);
        for _ in 0..30 {
            assert_eq!(
                a.next_machine(&runnable, MachineId(0)),
                b.next_machine(&runnable, MachineId(0))
            );
        }
    }

    #[test]
    fn iterations_reshuffle_priorities() {
        let runnable = ids(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut strategy = PctStrategy::new(17, 1, 0);
        let mut picks = Vec::new();
        for _ in 0..12 {
            picks.push(strategy.next_machine(&runnable, MachineId(0)).unwrap());
            strategy.configure_next_iteration();
        }
        // Fresh priorities per iteration make a single winner vanishingly
        // unlikely across twelve iterations of eight machines.
        assert!(picks.iter().any(|p| *p != picks[0]));
    }
}
