//! Test configuration.

use crate::trace::ScheduleTrace;
use serde::{Deserialize, Serialize};

/// Which scheduling strategy drives the exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Seeded uniform random walk.
    Random,
    /// Deterministic exhaustive depth-first enumeration.
    Dfs,
    /// Iterative-deepening depth-first enumeration.
    Iddfs,
    /// Priority-bounded exploration (random priorities plus change points).
    PriorityBounded,
    /// Delay-bounded exploration over a round-robin order.
    DelayBounded,
    /// Prefix strategy up to the safety prefix, then a fair suffix.
    Combo,
    /// Follow a previously recorded schedule trace.
    Replay,
}

/// Configuration for one test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of iterations to explore (at least 1).
    pub num_iterations: usize,
    /// Strategy selection.
    pub strategy: StrategyKind,
    /// Seed for seeded strategies; None draws a fresh seed per run.
    pub seed: Option<u64>,
    /// Step bound for fair strategies (0 = unbounded).
    pub max_fair_steps: usize,
    /// Step bound for unfair strategies (0 = unbounded).
    pub max_unfair_steps: usize,
    /// Steps before liveness/state-capture kicks in (0 = `max_unfair_steps`).
    pub safety_prefix_bound: usize,
    /// Feed the state-cache hook at each step past the safety prefix.
    pub cache_program_state: bool,
    /// Treat hitting the step bound as a bug instead of a normal stop.
    pub depth_bound_is_bug: bool,
    /// Pause on the first bug so a debugger can attach.
    pub attach_debugger: bool,
    /// Extra logging detail: 0 quiet, 1 machine events, 2 scheduler decisions.
    pub verbosity: u8,
    /// Priority change points per iteration for the priority-bounded strategy.
    pub pct_priority_changes: usize,
    /// Delay budget per iteration for the delay-bounded strategy.
    pub delay_budget: usize,
    /// Trace to follow when `strategy` is `Replay`.
    pub replay_trace: Option<ScheduleTrace>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_iterations: 1,
            strategy: StrategyKind::Random,
            seed: None,
            max_fair_steps: 100_000,
            max_unfair_steps: 10_000,
            safety_prefix_bound: 0,
            cache_program_state: false,
            depth_bound_is_bug: false,
            attach_debugger: false,
            verbosity: 0,
            pct_priority_changes: 2,
            delay_budget: 2,
            replay_trace: None,
        }
    }
}

impl Config {
    /// The effective safety prefix: 0 means "same as the unfair bound".
    pub fn effective_safety_prefix(&self) -> usize {
        if self.safety_prefix_bound == 0 {
            self.max_unfair_steps
        } else {
            self.safety_prefix_bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_prefix_defaults_to_unfair_bound() {
        let mut config = Config::default();
        config.max_unfair_steps = 42;
        assert_eq!(config.effective_safety_prefix(), 42);
        config.safety_prefix_bound = 7;
        assert_eq!(config.effective_safety_prefix(), 7);
    }
}
