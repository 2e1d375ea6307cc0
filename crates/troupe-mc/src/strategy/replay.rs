//! Replay strategy: follow a previously recorded schedule trace.

use super::SchedulingStrategy;
use crate::trace::{ScheduleTrace, TraceEntry};
use tracing::warn;
use troupe_machine::MachineId;

/// Replays a recorded trace decision by decision.
///
/// Exhausts (returns `None`) when the trace ends, or when the program
/// diverges from the recording — a schedule entry naming a machine that is
/// not runnable, or a choice entry of the wrong kind. One iteration is
/// enough: the strategy finishes after the first.
pub struct ReplayStrategy {
    trace: ScheduleTrace,
    cursor: usize,
    steps: usize,
    done_once: bool,
}

impl ReplayStrategy {
    pub fn new(trace: ScheduleTrace) -> Self {
        Self {
            trace,
            cursor: 0,
            steps: 0,
            done_once: false,
        }
    }

    fn take(&mut self) -> Option<TraceEntry> {
        let entry = self.trace.get(self.cursor).cloned();
        if entry.is_some() {
            self.cursor += 1;
            self.steps += 1;
        }
        entry
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn next_machine(&mut self, runnable: &[MachineId], _current: MachineId) -> Option<MachineId> {
        match self.trace.get(self.cursor) {
            Some(TraceEntry::ScheduleChoice(id)) if runnable.contains(id) => {
                let id = *id;
                self.cursor += 1;
                self.steps += 1;
                Some(id)
            }
            Some(entry) => {
                warn!(?entry, cursor = self.cursor, "replay diverged from trace");
                None
            }
            None => None,
        }
    }

    fn next_bool(&mut self, _max_value: usize) -> Option<bool> {
        match self.take() {
            Some(TraceEntry::BoolChoice(v)) | Some(TraceEntry::FairBoolChoice(_, v)) => Some(v),
            Some(entry) => {
                warn!(?entry, "replay diverged at boolean choice");
                None
            }
            None => None,
        }
    }

    fn next_int(&mut self, _max_value: usize) -> Option<usize> {
        match self.take() {
            Some(TraceEntry::IntChoice(v)) => Some(v),
            Some(entry) => {
                warn!(?entry, "replay diverged at integer choice");
                None
            }
            None => None,
        }
    }

    fn explored_steps(&self) -> usize {
        self.steps
    }

    fn max_steps_reached(&self) -> bool {
        false
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn has_finished(&self) -> bool {
        self.done_once
    }

    fn configure_next_iteration(&mut self) {
        self.done_once = true;
        self.cursor = 0;
        self.steps = 0;
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.steps = 0;
        self.done_once = false;
    }

    fn description(&self) -> String {
        format!("replay[{} entries]", self.trace.len())
    }
}
