//! Deterministic exhaustive depth-first enumeration.

use super::SchedulingStrategy;
use troupe_machine::MachineId;

/// One alternative at a decision level.
#[derive(Debug, Clone)]
struct Choice<T> {
    value: T,
    done: bool,
}

impl<T> Choice<T> {
    fn new(value: T) -> Self {
        Self { value, done: false }
    }
}

fn pick<T: Copy>(level: &[Choice<T>]) -> Option<T> {
    level.iter().find(|c| !c.done).map(|c| c.value)
}

/// Mark the taken choice at the deepest level done and prune exhausted
/// levels. Returns true when a sibling remains to explore in this stack.
fn advance<T>(stack: &mut Vec<Vec<Choice<T>>>) -> bool {
    while let Some(level) = stack.last_mut() {
        if let Some(c) = level.iter_mut().find(|c| !c.done) {
            c.done = true;
        }
        if level.iter().any(|c| !c.done) {
            return true;
        }
        stack.pop();
    }
    false
}

/// Depth-first strategy: enumerates every schedule and nondeterministic
/// choice combination, one path per iteration.
///
/// Decision levels are kept per choice type, with the path taken being the
/// first not-done alternative at each level. Between iterations the deepest
/// stack with an unexplored sibling advances (integers first, then booleans,
/// then schedule points); stacks deeper than the divergence are discarded, so
/// a changed prefix never replays stale alternatives.
pub struct DfsStrategy {
    sch_stack: Vec<Vec<Choice<MachineId>>>,
    bool_stack: Vec<Vec<Choice<bool>>>,
    int_stack: Vec<Vec<Choice<usize>>>,
    sch_index: usize,
    bool_index: usize,
    int_index: usize,
    steps: usize,
    max_steps: usize,
    finished: bool,
}

impl DfsStrategy {
    pub fn new(max_steps: usize) -> Self {
        Self {
            sch_stack: Vec::new(),
            bool_stack: Vec::new(),
            int_stack: Vec::new(),
            sch_index: 0,
            bool_index: 0,
            int_index: 0,
            steps: 0,
            max_steps,
            finished: false,
        }
    }

    /// Replace the per-iteration step bound (used by iterative deepening).
    pub(crate) fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps;
    }
}

impl SchedulingStrategy for DfsStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], _current: MachineId) -> Option<MachineId> {
        if runnable.is_empty() {
            return None;
        }
        if let Some(level) = self.sch_stack.get(self.sch_index) {
            let same = level.len() == runnable.len()
                && level.iter().zip(runnable).all(|(c, id)| c.value == *id);
            if !same {
                // The candidate set diverged from the recorded prefix.
                self.sch_stack.truncate(self.sch_index);
            }
        }
        if self.sch_index == self.sch_stack.len() {
            self.sch_stack
                .push(runnable.iter().copied().map(Choice::new).collect());
        }
        let value = pick(&self.sch_stack[self.sch_index])?;
        self.sch_index += 1;
        self.steps += 1;
        Some(value)
    }

    fn next_bool(&mut self, _max_value: usize) -> Option<bool> {
        if self.bool_index == self.bool_stack.len() {
            self.bool_stack
                .push(vec![Choice::new(false), Choice::new(true)]);
        }
        let value = pick(&self.bool_stack[self.bool_index])?;
        self.bool_index += 1;
        self.steps += 1;
        Some(value)
    }

    fn next_int(&mut self, max_value: usize) -> Option<usize> {
        let width = max_value.max(1);
        if let Some(level) = self.int_stack.get(self.int_index) {
            if level.len() != width {
                self.int_stack.truncate(self.int_index);
            }
        }
        if self.int_index == self.int_stack.len() {
            self.int_stack.push((0..width).map(Choice::new).collect());
        }
        let value = pick(&self.int_stack[self.int_index])?;
        self.int_index += 1;
        self.steps += 1;
        Some(value)
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
        self.finished
    }

    fn configure_next_iteration(&mut self) {
        self.sch_index = 0;
        self.bool_index = 0;
        self.int_index = 0;
        self.steps = 0;
        // Advance the deepest stack with an unexplored sibling. A failed
        // advance leaves that stack empty, so shallower advances never see
        // stale levels from the abandoned subtree.
        if advance(&mut self.int_stack) {
            return;
        }
        if advance(&mut self.bool_stack) {
            return;
        }
        if advance(&mut self.sch_stack) {
            return;
        }
        self.finished = true;
    }

    fn reset(&mut self) {
        let max_steps = self.max_steps;
        *self = Self::new(max_steps);
    }

    fn description(&self) -> String {
        "dfs".to_string()
    }
}
