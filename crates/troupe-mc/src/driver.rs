//! Iteration driver: runs the entry routine under a fresh runtime per
//! iteration and aggregates the test report.

use crate::cache::StateCache;
use crate::config::Config;
use crate::error::{BugKind, RuntimeError, RuntimeResult};
use crate::liveness::LivenessMonitor;
use crate::report::TestReport;
use crate::runtime::Runtime;
use crate::scheduler::{FailureObserver, SharedCache, SharedMonitor};
use crate::strategy::{self, SchedulingStrategy, SharedStrategy};
use crate::trace::ScheduleTrace;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs up to `num_iterations` explorations of one program.
///
/// The strategy is instantiated once and carried across iterations; each
/// iteration gets a fresh runtime, and the previous iteration's runtime is
/// disposed so captured references fail deterministically. The outer loop
/// stops when the strategy has finished, or at the first bug.
pub struct IterationDriver {
    config: Arc<Config>,
    strategy: SharedStrategy,
    cache: SharedCache,
    liveness: SharedMonitor,
    on_failure: Option<FailureObserver>,
    report: TestReport,
    last_trace: Option<ScheduleTrace>,
}

impl IterationDriver {
    /// Driver with the strategy selected by the configuration.
    pub fn new(config: Config) -> Self {
        let strategy = strategy::from_config(&config);
        Self::with_strategy(config, strategy)
    }

    /// Driver with an explicitly supplied strategy.
    pub fn with_strategy(config: Config, strategy: Box<dyn SchedulingStrategy>) -> Self {
        Self {
            report: TestReport::new(config.clone()),
            config: Arc::new(config),
            strategy: strategy::shared(strategy),
            cache: Arc::new(Mutex::new(None)),
            liveness: Arc::new(Mutex::new(None)),
            on_failure: None,
            last_trace: None,
        }
    }

    /// Install a state cache fed at each step past the safety prefix.
    pub fn with_state_cache(self, cache: Box<dyn StateCache>) -> Self {
        *self.cache.lock() = Some(cache);
        self
    }

    /// Install a liveness monitor consulted at every scheduling step.
    pub fn with_liveness_monitor(self, monitor: Box<dyn LivenessMonitor>) -> Self {
        *self.liveness.lock() = Some(monitor);
        self
    }

    /// Install an observer notified once for the first bug of the run.
    pub fn with_on_failure(mut self, observer: FailureObserver) -> Self {
        self.on_failure = Some(observer);
        self
    }

    pub fn report(&self) -> &TestReport {
        &self.report
    }

    /// The schedule trace of the most recent iteration.
    pub fn last_trace(&self) -> Option<&ScheduleTrace> {
        self.last_trace.as_ref()
    }

    /// Handle to the installed state cache (inspection after a run).
    pub fn state_cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Run the exploration. `entry` is invoked on the driver's own worker
    /// with each iteration's runtime; a disposed-runtime error from it is
    /// recorded as that iteration's bug.
    pub fn run<F>(&mut self, entry: F) -> &TestReport
    where
        F: Fn(&Arc<Runtime>) -> RuntimeResult<()>,
    {
        for iteration in 0..self.config.num_iterations {
            if self.strategy.lock().has_finished() {
                debug!(iteration, "strategy finished; stopping the run");
                break;
            }
            if self.config.verbosity >= 1 {
                debug!(iteration, "starting iteration");
            }
            let runtime = Runtime::new(
                self.config.clone(),
                self.strategy.clone(),
                self.cache.clone(),
                self.liveness.clone(),
                self.on_failure.clone(),
            );
            match entry(&runtime) {
                Ok(()) => {}
                Err(RuntimeError::Disposed) => {
                    let _ = runtime.scheduler().notify_assertion_failure(
                        BugKind::DisposedRuntime,
                        "Cannot access a disposed runtime.".to_string(),
                        true,
                    );
                }
                Err(other) => {
                    let _ = runtime.scheduler().notify_assertion_failure(
                        BugKind::AssertionFailure,
                        format!("Test entry failed: {other}."),
                        true,
                    );
                }
            }
            // An entry that created no machines leaves nothing to explore.
            if runtime.machine_count() == 0 {
                runtime.shutdown();
            }
            let _ = runtime.wait();

            let (fair, steps) = {
                let strategy = self.strategy.lock();
                (strategy.is_fair(), strategy.explored_steps())
            };
            self.report.record_iteration(fair, steps);
            self.last_trace = Some(runtime.trace());
            let bug = runtime.bug_report();
            runtime.dispose();
            if let Some(cache) = self.cache.lock().as_mut() {
                cache.reset();
            }
            if let Some(monitor) = self.liveness.lock().as_mut() {
                monitor.reset();
            }
            if let Some(bug) = bug {
                info!(message = %bug.message, "stopping after the first bug");
                self.report.add_bug(bug);
                break;
            }
            self.strategy.lock().configure_next_iteration();
        }
        &self.report
    }
}
