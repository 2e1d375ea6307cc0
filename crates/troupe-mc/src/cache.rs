//! State-cache hook: an opaque sink fed the trace head at each step past the
//! safety prefix.

use crate::trace::TraceEntry;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Sink invoked by the scheduler after each fingerprint-worthy step.
pub trait StateCache: Send {
    /// Record the most recent trace entry.
    fn capture(&mut self, head: &TraceEntry);

    /// Forget the current iteration's position (called between iterations).
    fn reset(&mut self);
}

/// Default cache: folds each captured entry into a running prefix hash and
/// remembers every distinct prefix seen across iterations.
///
/// Two iterations that reach the same schedule prefix hash to the same
/// fingerprint, so `distinct_prefixes` measures how much of the schedule
/// space the run actually covered.
#[derive(Default)]
pub struct TraceFingerprintCache {
    prefix: u64,
    seen: HashSet<u64>,
    captures: u64,
}

impl TraceFingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct schedule prefixes captured so far.
    pub fn distinct_prefixes(&self) -> usize {
        self.seen.len()
    }

    /// Total capture calls across all iterations.
    pub fn captures(&self) -> u64 {
        self.captures
    }

    fn entry_hash(entry: &TraceEntry) -> u64 {
        let mut hasher = ahash::AHasher::default();
        entry.hash(&mut hasher);
        hasher.finish()
    }
}

impl StateCache for TraceFingerprintCache {
    fn capture(&mut self, head: &TraceEntry) {
        self.prefix = self
            .prefix
            .rotate_left(7)
            .wrapping_mul(0x9e3779b97f4a7c15)
            ^ Self::entry_hash(head);
        self.seen.insert(self.prefix);
        self.captures += 1;
    }

    fn reset(&mut self) {
        self.prefix = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_machine::MachineId;

    #[test]
    fn identical_prefixes_collapse() {
        let mut cache = TraceFingerprintCache::new();
        let steps = [
            TraceEntry::ScheduleChoice(MachineId(0)),
            TraceEntry::BoolChoice(true),
        ];
        for entry in &steps {
            cache.capture(entry);
        }
        cache.reset();
        for entry in &steps {
            cache.capture(entry);
        }
        assert_eq!(cache.captures(), 4);
        assert_eq!(cache.distinct_prefixes(), 2);
    }

    #[test]
    fn diverging_prefixes_stay_distinct() {
        let mut cache = TraceFingerprintCache::new();
        cache.capture(&TraceEntry::ScheduleChoice(MachineId(0)));
        cache.reset();
        cache.capture(&TraceEntry::ScheduleChoice(MachineId(1)));
        assert_eq!(cache.distinct_prefixes(), 2);
    }

    #[test]
    fn order_matters_for_prefix_hash() {
        let mut cache = TraceFingerprintCache::new();
        cache.capture(&TraceEntry::BoolChoice(true));
        cache.capture(&TraceEntry::BoolChoice(false));
        cache.reset();
        cache.capture(&TraceEntry::BoolChoice(false));
        cache.capture(&TraceEntry::BoolChoice(true));
        assert_eq!(cache.distinct_prefixes(), 4);
    }
}
