//! Combo strategy: a prefix strategy up to the safety prefix depth, then a
//! suffix strategy.

use super::SchedulingStrategy;
use troupe_machine::MachineId;

/// Runs `prefix` for the first `prefix_depth` steps of each iteration and
/// `suffix` from then on.
///
/// The usual pairing is an unfair prefix for safety bugs with a fair suffix
/// for liveness: the prefix churns through orderings cheaply, and the suffix
/// guarantees progress so liveness verdicts mean something. Explored steps
/// count prefix steps while in the prefix, and `prefix_depth` plus the
/// suffix's steps after the switch.
pub struct ComboStrategy {
    prefix: Box<dyn SchedulingStrategy>,
    suffix: Box<dyn SchedulingStrategy>,
    prefix_depth: usize,
}

impl ComboStrategy {
    pub fn new(
        prefix: Box<dyn SchedulingStrategy>,
        suffix: Box<dyn SchedulingStrategy>,
        prefix_depth: usize,
    ) -> Self {
        Self {
            prefix,
            suffix,
            prefix_depth,
        }
    }

    fn in_prefix(&self) -> bool {
        self.prefix.explored_steps() < self.prefix_depth
    }
}

impl SchedulingStrategy for ComboStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], current: MachineId) -> Option<MachineId> {
        if self.in_prefix() {
            self.prefix.next_machine(runnable, current)
        } else {
            self.suffix.next_machine(runnable, current)
        }
    }

    fn next_bool(&mut self, max_value: usize) -> Option<bool> {
        if self.in_prefix() {
            self.prefix.next_bool(max_value)
        } else {
            self.suffix.next_bool(max_value)
        }
    }

    fn next_int(&mut self, max_value: usize) -> Option<usize> {
        if self.in_prefix() {
            self.prefix.next_int(max_value)
        } else {
            self.suffix.next_int(max_value)
        }
    }

    fn explored_steps(&self) -> usize {
        if self.in_prefix() {
            self.prefix.explored_steps()
        } else {
            self.prefix_depth + self.suffix.explored_steps()
        }
    }

    fn max_steps_reached(&self) -> bool {
        if self.in_prefix() {
            self.prefix.max_steps_reached()
        } else {
            self.suffix.max_steps_reached()
        }
    }

    fn is_fair(&self) -> bool {
        self.suffix.is_fair()
    }

    fn has_finished(&self) -> bool {
        self.prefix.has_finished() || self.suffix.has_finished()
    }

    fn configure_next_iteration(&mut self) {
        self.prefix.configure_next_iteration();
        self.suffix.configure_next_iteration();
    }

    fn reset(&mut self) {
        self.prefix.reset();
        self.suffix.reset();
    }

    fn description(&self) -> String {
        format!(
            "combo[{} then {} after {}]",
            self.prefix.description(),
            self.suffix.description(),
            self.prefix_depth
        )
    }
}
