//! Delay-bounded exploration over a round-robin schedule.

use super::SchedulingStrategy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use troupe_machine::MachineId;

/// Delay-bounded strategy.
///
/// The baseline schedule is deterministic round-robin: keep running the
/// current machine, falling over to the next id when it blocks. Each
/// iteration spends up to `delay_budget` delays at randomly drawn scheduling
/// steps; a delay skips the machine that would have run and takes the next
/// one in id order. Small budgets cover most real-world ordering bugs.
pub struct DelayBoundedStrategy {
    seed: u64,
    rng: StdRng,
    delay_budget: usize,
    delay_points: HashSet<usize>,
    sched_steps: usize,
    longest_iteration: usize,
    steps: usize,
    max_steps: usize,
}

impl DelayBoundedStrategy {
    pub fn new(seed: u64, delay_budget: usize, max_steps: usize) -> Self {
        let mut strategy = Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            delay_budget,
            delay_points: HashSet::new(),
            sched_steps: 0,
            longest_iteration: 0,
            steps: 0,
            max_steps,
        };
        strategy.sample_delay_points();
        strategy
    }

    fn sample_delay_points(&mut self) {
        self.delay_points.clear();
        let horizon = self.longest_iteration.max(self.delay_budget).max(1);
        let mut steps: Vec<usize> = (0..horizon).collect();
        steps.shuffle(&mut self.rng);
        self.delay_points
            .extend(steps.into_iter().take(self.delay_budget));
    }
}

impl SchedulingStrategy for DelayBoundedStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], current: MachineId) -> Option<MachineId> {
        if runnable.is_empty() {
            return None;
        }
        // Round-robin base point: the current machine if runnable, else the
        // next runnable id after it.
        let mut index = runnable
            .iter()
            .position(|id| *id >= current)
            .unwrap_or(0);
        if self.delay_points.contains(&self.sched_steps) {
            index = (index + 1) % runnable.len();
        }
        self.sched_steps += 1;
        self.steps += 1;
        Some(runnable[index])
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
        self.sample_delay_points();
    }

    fn reset(&mut self) {
        *self = Self::new(self.seed, self.delay_budget, self.max_steps);
    }

    fn description(&self) -> String {
        format!(
            "delay-bounded[seed={},delays={}]",
            self.seed, self.delay_budget
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
    fn zero_budget_is_pure_round_robin() {
        let runnable = ids(&[0, 1, 2]);
        let mut strategy = DelayBoundedStrategy::new(9, 0, 0);
        // The current machine keeps running while it stays runnable.
        assert_eq!(
            strategy.next_machine(&runnable, MachineId(1)),
            Some(MachineId(1))
        );
        // When the current machine is gone, the next id in order runs.
        assert_eq!(
            strategy.next_machine(&ids(&[0, 2]), MachineId(1)),
            Some(MachineId(2))
        );
        // Wrap-around past the highest id.
        assert_eq!(
            strategy.next_machine(&ids(&[0]), MachineId(2)),
            Some(MachineId(0))
        );
    }

    #[test]
    fn budget_spends_at_most_that_many_delays() {
        let runnable = ids(&[0, 1]);
        let mut strategy = DelayBoundedStrategy::new(13, 1, 0);
        let mut deviations = 0;
        for _ in 0..40 {
            if strategy.next_machine(&runnable, MachineId(0)) != Some(MachineId(0)) {
                deviations += 1;
            }
        }
        assert!(deviations <= 1);
    }

    #[test]
    fn deterministic_for_a_seed() {
        let runnable = ids(&[0, 1, 2]);
        let mut a = DelayBoundedStrategy::new(21, 2, 0);
        let mut b = DelayBoundedStrategy::new(21, 2, 0);
        for _ in 0..30 {
            assert_eq!(
                a.next_machine(&runnable, MachineId(1)),
                b.next_machine(&runnable, MachineId(1))
            );
        }
    }
}
