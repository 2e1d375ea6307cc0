//! Systematic concurrency tester for actor-style state machines.
//!
//! Programs built from `troupe-machine` declarations run under a serialized
//! scheduler: all machine activity is forced onto a single logical execution,
//! a pluggable strategy decides every scheduling and nondeterministic choice,
//! and each iteration's decisions are recorded in a replayable trace. The
//! driver repeats iterations, folding bugs and statistics into a report.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod info;
pub mod liveness;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod strategy;
pub mod trace;

pub use cache::{StateCache, TraceFingerprintCache};
pub use config::{Config, StrategyKind};
pub use driver::IterationDriver;
pub use error::{BugKind, RuntimeError, RuntimeResult};
pub use info::MachineInfo;
pub use liveness::{LivenessMonitor, MonitorFn};
pub use report::{BugReport, TestReport};
pub use runtime::Runtime;
pub use scheduler::{FailureObserver, Scheduler};
pub use strategy::{
    ComboStrategy, DelayBoundedStrategy, DfsStrategy, IddfsStrategy, PctStrategy, RandomStrategy,
    ReplayStrategy, SchedulingStrategy,
};
pub use trace::{ScheduleTrace, TraceEntry};
