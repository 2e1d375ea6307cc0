//! Iterative-deepening depth-first enumeration.

use super::dfs::DfsStrategy;
use super::SchedulingStrategy;
use tracing::debug;
use troupe_machine::MachineId;

const INITIAL_BOUND: usize = 16;

/// Depth-first search restarted with a doubled step bound each time the
/// bounded tree is exhausted, up to `cap` (0 = deepen forever).
///
/// Shallow bugs are found at small bounds without paying for the full tree;
/// the strategy only finishes once the tree at the cap is exhausted.
pub struct IddfsStrategy {
    inner: DfsStrategy,
    bound: usize,
    cap: usize,
}

impl IddfsStrategy {
    pub fn new(cap: usize) -> Self {
        let bound = if cap == 0 {
            INITIAL_BOUND
        } else {
            cap.min(INITIAL_BOUND)
        };
        Self {
            inner: DfsStrategy::new(bound),
            bound,
            cap,
        }
    }

    fn at_cap(&self) -> bool {
        self.cap > 0 && self.bound >= self.cap
    }

    /// Current per-iteration step bound.
    pub fn bound(&self) -> usize {
        self.bound
    }
}

impl SchedulingStrategy for IddfsStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], current: MachineId) -> Option<MachineId> {
        self.inner.next_machine(runnable, current)
    }

    fn next_bool(&mut self, max_value: usize) -> Option<bool> {
        self.inner.next_bool(max_value)
    }

    fn next_int(&mut self, max_value: usize) -> Option<usize> {
        self.inner.next_int(max_value)
    }

    fn explored_steps(&self) -> usize {
        self.inner.explored_steps()
    }

    fn max_steps_reached(&self) -> bool {
        self.inner.max_steps_reached()
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn has_finished(&self) -> bool {
        self.inner.has_finished() && self.at_cap()
    }

    fn configure_next_iteration(&mut self) {
        self.inner.configure_next_iteration();
        if self.inner.has_finished() && !self.at_cap() {
            self.bound = if self.cap == 0 {
                self.bound.saturating_mul(2)
            } else {
                self.bound.saturating_mul(2).min(self.cap)
            };
            debug!(bound = self.bound, "deepening exhausted tree");
            self.inner.reset();
            self.inner.set_max_steps(self.bound);
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.cap);
    }

    fn description(&self) -> String {
        format!("iddfs[bound={}]", self.bound)
    }
}
