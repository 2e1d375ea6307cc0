//! Seeded random walk over schedules and choices.

use super::SchedulingStrategy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use troupe_machine::MachineId;

/// Uniform random strategy.
///
/// The RNG keeps rolling across iterations so each iteration explores a
/// different schedule; `reset` reseeds from the original seed. The fair
/// variant differs only in how the driver bounds and accounts it.
pub struct RandomStrategy {
    seed: u64,
    rng: StdRng,
    fair: bool,
    max_steps: usize,
    steps: usize,
}

impl RandomStrategy {
    pub fn new(seed: u64, max_steps: usize) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            fair: false,
            max_steps,
            steps: 0,
        }
    }

    /// Fair variant: probabilistically grants every always-enabled machine a
    /// turn, bounded by the fair step budget.
    pub fn fair(seed: u64, max_steps: usize) -> Self {
        Self {
            fair: true,
            ..Self::new(seed, max_steps)
        }
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], _current: MachineId) -> Option<MachineId> {
        if runnable.is_empty() {
            return None;
        }
        self.steps += 1;
        runnable.choose(&mut self.rng).copied()
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
        self.fair
    }

    fn has_finished(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.steps = 0;
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.steps = 0;
    }

    fn description(&self) -> String {
        if self.fair {
            format!("fair-random[seed={}]", self.seed)
        } else {
            format!("random[seed={}]", self.seed)
        }
    }
}
