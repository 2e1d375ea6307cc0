//! Scheduling strategies: the decision oracles consulted at every scheduling
//! point and nondeterministic choice point.

use crate::config::{Config, StrategyKind};
use parking_lot::Mutex;
use std::sync::Arc;
use troupe_machine::MachineId;

pub mod combo;
pub mod delay;
pub mod dfs;
pub mod iddfs;
pub mod pct;
pub mod random;
pub mod replay;

pub use combo::ComboStrategy;
pub use delay::DelayBoundedStrategy;
pub use dfs::DfsStrategy;
pub use iddfs::IddfsStrategy;
pub use pct::PctStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

/// Decision oracle for one exploration.
///
/// The scheduler is the only caller and always holds the turn, so
/// implementations are single-threaded by construction. Determinism contract:
/// given the same seed and the same sequence of queries, a strategy emits the
/// same sequence of answers; `reset` restores the initial state, and the only
/// state carried across iterations is what `configure_next_iteration`
/// preserves.
pub trait SchedulingStrategy: Send {
    /// Pick the next machine to run from `runnable` (sorted by machine id).
    /// `current` is the machine at the current scheduling point. Returning
    /// `None` signals exhaustion of the current schedule.
    fn next_machine(&mut self, runnable: &[MachineId], current: MachineId) -> Option<MachineId>;

    /// Draw a boolean, true with probability 1/`max_value`. `None` signals
    /// exhaustion.
    fn next_bool(&mut self, max_value: usize) -> Option<bool>;

    /// Draw an integer in `0..max_value`. `None` signals exhaustion.
    fn next_int(&mut self, max_value: usize) -> Option<usize>;

    /// Decisions consumed in the current iteration.
    fn explored_steps(&self) -> usize;

    /// The iteration's step bound has been reached.
    fn max_steps_reached(&self) -> bool;

    /// Whether the strategy guarantees progress for always-enabled machines.
    fn is_fair(&self) -> bool;

    /// The whole schedule space has been explored; the driver stops.
    fn has_finished(&self) -> bool;

    /// Prepare for the next iteration, preserving cross-iteration state.
    fn configure_next_iteration(&mut self);

    /// Restore the initial state.
    fn reset(&mut self);

    /// Human-readable description for bug reports.
    fn description(&self) -> String;
}

/// Strategy handle shared between the driver and per-iteration schedulers.
pub type SharedStrategy = Arc<Mutex<Box<dyn SchedulingStrategy>>>;

/// Build the strategy selected by the configuration.
///
/// `Combo` pairs an unfair random prefix (bounded by the safety prefix) with
/// a fair random suffix, so liveness properties are only exercised past the
/// prefix. `Replay` requires `config.replay_trace`.
pub fn from_config(config: &Config) -> Box<dyn SchedulingStrategy> {
    let seed = config.seed.unwrap_or_else(rand::random);
    match config.strategy {
        StrategyKind::Random => Box::new(RandomStrategy::new(seed, config.max_unfair_steps)),
        StrategyKind::Dfs => Box::new(DfsStrategy::new(config.max_unfair_steps)),
        StrategyKind::Iddfs => Box::new(IddfsStrategy::new(config.max_unfair_steps)),
        StrategyKind::PriorityBounded => Box::new(PctStrategy::new(
            seed,
            config.pct_priority_changes,
            config.max_unfair_steps,
        )),
        StrategyKind::DelayBounded => Box::new(DelayBoundedStrategy::new(
            seed,
            config.delay_budget,
            config.max_unfair_steps,
        )),
        StrategyKind::Combo => Box::new(ComboStrategy::new(
            Box::new(RandomStrategy::new(seed, config.max_unfair_steps)),
            Box::new(RandomStrategy::fair(
                seed.wrapping_add(1),
                config.max_fair_steps,
            )),
            config.effective_safety_prefix(),
        )),
        StrategyKind::Replay => Box::new(ReplayStrategy::new(
            config.replay_trace.clone().unwrap_or_default(),
        )),
    }
}

/// Wrap a strategy for sharing with per-iteration schedulers.
pub fn shared(strategy: Box<dyn SchedulingStrategy>) -> SharedStrategy {
    Arc::new(Mutex::new(strategy))
}
