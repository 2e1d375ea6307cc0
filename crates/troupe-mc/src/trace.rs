//! Schedule trace: the replayable record of one iteration's decisions.

use serde::{Deserialize, Serialize};
use troupe_machine::MachineId;

/// One recorded scheduling or nondeterministic decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEntry {
    /// The strategy granted the turn to a machine.
    ScheduleChoice(MachineId),
    /// Nondeterministic boolean choice.
    BoolChoice(bool),
    /// Nondeterministic boolean choice tagged with its fair-choice id.
    FairBoolChoice(String, bool),
    /// Nondeterministic integer choice.
    IntChoice(usize),
}

/// Append-only record of all decisions made during one iteration.
///
/// Reset at the start of each iteration; written only while the writer holds
/// the scheduler turn; sufficient for the replay strategy to reproduce the
/// iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    entries: Vec<TraceEntry>,
}

impl ScheduleTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry.
    pub fn head(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn get(&self, index: usize) -> Option<&TraceEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Number of turn grants recorded.
    pub fn schedule_choices(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, TraceEntry::ScheduleChoice(_)))
            .count()
    }

    /// Number of nondeterministic choices recorded.
    pub fn nondet_choices(&self) -> usize {
        self.entries.len() - self.schedule_choices()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_split_by_entry_kind() {
        let mut trace = ScheduleTrace::new();
        trace.push(TraceEntry::ScheduleChoice(MachineId(0)));
        trace.push(TraceEntry::BoolChoice(true));
        trace.push(TraceEntry::FairBoolChoice("loop".into(), false));
        trace.push(TraceEntry::IntChoice(3));
        trace.push(TraceEntry::ScheduleChoice(MachineId(1)));
        assert_eq!(trace.schedule_choices(), 2);
        assert_eq!(trace.nondet_choices(), 3);
        assert_eq!(trace.head(), Some(&TraceEntry::ScheduleChoice(MachineId(1))));
    }

    #[test]
    fn serializes_round_trip() {
        let mut trace = ScheduleTrace::new();
        trace.push(TraceEntry::ScheduleChoice(MachineId(2)));
        trace.push(TraceEntry::IntChoice(9));
        let json = serde_json::to_string(&trace).unwrap();
        let back: ScheduleTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
    }
}
