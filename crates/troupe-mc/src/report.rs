//! Test report: bug records plus exploration statistics.

use crate::config::Config;
use crate::error::BugKind;
use crate::trace::ScheduleTrace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reported bug: the message, the schedule that produced it, and the
/// strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub kind: BugKind,
    pub message: String,
    pub trace: ScheduleTrace,
    pub strategy: String,
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (found by {})", self.message, self.strategy)
    }
}

/// Aggregated statistics over all iterations of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub num_bugs: usize,
    pub bug_reports: Vec<BugReport>,
    pub num_explored_fair_schedules: usize,
    pub num_explored_unfair_schedules: usize,
    /// Fair iterations that hit the fair step bound.
    pub max_fair_steps_hit_in_fair_tests: usize,
    /// Fair iterations whose prefix hit the unfair step bound.
    pub max_unfair_steps_hit_in_fair_tests: usize,
    /// Unfair iterations that hit the unfair step bound.
    pub max_unfair_steps_hit_in_unfair_tests: usize,
    pub total_explored_fair_steps: u64,
    /// Negative means no fair iteration ran yet.
    pub min_explored_fair_steps: i64,
    pub max_explored_fair_steps: i64,
    /// Configuration snapshot for this run.
    pub config: Config,
}

impl TestReport {
    pub fn new(config: Config) -> Self {
        Self {
            num_bugs: 0,
            bug_reports: Vec::new(),
            num_explored_fair_schedules: 0,
            num_explored_unfair_schedules: 0,
            max_fair_steps_hit_in_fair_tests: 0,
            max_unfair_steps_hit_in_fair_tests: 0,
            max_unfair_steps_hit_in_unfair_tests: 0,
            total_explored_fair_steps: 0,
            min_explored_fair_steps: -1,
            max_explored_fair_steps: -1,
            config,
        }
    }

    /// Fold one finished iteration into the counters.
    pub fn record_iteration(&mut self, fair: bool, explored_steps: usize) {
        let steps = explored_steps as i64;
        if fair {
            self.num_explored_fair_schedules += 1;
            self.total_explored_fair_steps += explored_steps as u64;
            if self.min_explored_fair_steps < 0 || steps < self.min_explored_fair_steps {
                self.min_explored_fair_steps = steps;
            }
            if steps > self.max_explored_fair_steps {
                self.max_explored_fair_steps = steps;
            }
            if self.config.max_fair_steps > 0 && explored_steps >= self.config.max_fair_steps {
                self.max_fair_steps_hit_in_fair_tests += 1;
            }
            if self.config.max_unfair_steps > 0 && explored_steps >= self.config.max_unfair_steps
            {
                self.max_unfair_steps_hit_in_fair_tests += 1;
            }
        } else {
            self.num_explored_unfair_schedules += 1;
            if self.config.max_unfair_steps > 0 && explored_steps >= self.config.max_unfair_steps
            {
                self.max_unfair_steps_hit_in_unfair_tests += 1;
            }
        }
    }

    pub fn add_bug(&mut self, bug: BugReport) {
        self.num_bugs += 1;
        self.bug_reports.push(bug);
    }

    /// Total iterations folded in so far.
    pub fn num_explored_schedules(&self) -> usize {
        self.num_explored_fair_schedules + self.num_explored_unfair_schedules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fair_step_extremes_track_iterations() {
        let mut report = TestReport::new(Config::default());
        assert_eq!(report.min_explored_fair_steps, -1);
        report.record_iteration(true, 10);
        report.record_iteration(true, 4);
        report.record_iteration(true, 7);
        assert_eq!(report.min_explored_fair_steps, 4);
        assert_eq!(report.max_explored_fair_steps, 10);
        assert_eq!(report.total_explored_fair_steps, 21);
        assert_eq!(report.num_explored_fair_schedules, 3);
    }

    #[test]
    fn unfair_bound_hits_count_only_at_bound() {
        let mut config = Config::default();
        config.max_unfair_steps = 5;
        let mut report = TestReport::new(config);
        report.record_iteration(false, 4);
        report.record_iteration(false, 5);
        report.record_iteration(false, 9);
        assert_eq!(report.num_explored_unfair_schedules, 3);
        assert_eq!(report.max_unfair_steps_hit_in_unfair_tests, 2);
    }

    #[test]
    fn bugs_accumulate() {
        let mut report = TestReport::new(Config::default());
        report.add_bug(BugReport {
            kind: BugKind::AssertionFailure,
            message: "Assertion failed: x".into(),
            trace: ScheduleTrace::new(),
            strategy: "random[seed=1]".into(),
        });
        assert_eq!(report.num_bugs, 1);
        assert_eq!(report.bug_reports.len(), 1);
    }
}
