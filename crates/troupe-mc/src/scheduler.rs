//! The serialized scheduler: turn-taking, notifications, cancellation,
//! termination, and livelock detection.
//!
//! All machine activity is forced onto a single logical execution: exactly
//! one worker is unparked outside the scheduler's own critical sections, and
//! every scheduling point consults the strategy before the next worker runs.

use crate::cache::StateCache;
use crate::config::Config;
use crate::error::BugKind;
use crate::liveness::LivenessMonitor;
use crate::report::BugReport;
use crate::strategy::{SchedulingStrategy, SharedStrategy};
use crate::trace::{ScheduleTrace, TraceEntry};
use crate::info::MachineInfo;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use troupe_machine::{Cancelled, MachineId, StepResult, WorkerId};

/// Observer invoked once for the first bug of a run.
pub type FailureObserver = Arc<dyn Fn(&BugReport) + Send + Sync>;

/// Cross-iteration state-cache slot shared by the driver and schedulers.
pub type SharedCache = Arc<Mutex<Option<Box<dyn StateCache>>>>;

/// Cross-iteration liveness-monitor slot shared by the driver and schedulers.
pub type SharedMonitor = Arc<Mutex<Option<Box<dyn LivenessMonitor>>>>;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Allocate a process-unique worker handle.
pub(crate) fn alloc_worker_id() -> WorkerId {
    WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bind the calling thread to a worker handle.
pub(crate) fn set_current_worker(worker: WorkerId) {
    CURRENT_WORKER.with(|w| w.set(Some(worker)));
}

/// The worker handle bound to the calling thread, if any.
pub fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(|w| w.get())
}

/// One-shot completion signal with double-checked assignment.
#[derive(Default)]
struct DoneSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

impl DoneSignal {
    /// Complete the signal; later calls are no-ops.
    fn complete(&self) {
        let mut done = self.done.lock();
        if *done {
            return;
        }
        *done = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cv.wait(&mut done);
        }
    }
}

/// Mutable scheduler tables, guarded by one lock.
struct SchedulerState {
    /// One record per machine, indexed by machine id (dense, creation order).
    infos: Vec<Arc<MachineInfo>>,
    /// Worker handle to machine for every not-yet-completed worker.
    task_map: HashMap<WorkerId, MachineId>,
    /// Machine currently granted the turn.
    scheduled: Option<MachineId>,
}

/// The serialization engine for one iteration.
pub struct Scheduler {
    config: Arc<Config>,
    strategy: SharedStrategy,
    state: Mutex<SchedulerState>,
    trace: Mutex<ScheduleTrace>,
    cache: SharedCache,
    liveness: SharedMonitor,
    running: AtomicBool,
    bug_found: AtomicBool,
    fully_explored: AtomicBool,
    bug: Mutex<Option<BugReport>>,
    on_failure: Mutex<Option<FailureObserver>>,
    done: DoneSignal,
    /// The driver's own worker; scheduling points called from it are no-ops.
    root: WorkerId,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        strategy: SharedStrategy,
        root: WorkerId,
        cache: SharedCache,
        liveness: SharedMonitor,
        on_failure: Option<FailureObserver>,
    ) -> Self {
        Self {
            config,
            strategy,
            state: Mutex::new(SchedulerState {
                infos: Vec::new(),
                task_map: HashMap::new(),
                scheduled: None,
            }),
            trace: Mutex::new(ScheduleTrace::new()),
            cache,
            liveness,
            running: AtomicBool::new(true),
            bug_found: AtomicBool::new(false),
            fully_explored: AtomicBool::new(false),
            bug: Mutex::new(None),
            on_failure: Mutex::new(on_failure),
            done: DoneSignal::default(),
            root,
        }
    }

    /// Yield at a scheduling point: consult the strategy and hand the turn to
    /// the machine it picks, parking the caller until its next turn.
    pub fn schedule(&self) -> StepResult<()> {
        let Some(caller) = current_worker() else {
            return Err(self.external_sync_failure());
        };
        if caller == self.root {
            return Ok(());
        }
        let Some(current) = self.info_for_worker(caller) else {
            return Err(self.external_sync_failure());
        };
        if !self.running.load(Ordering::Acquire) {
            return Err(self.stop());
        }
        self.check_step_bound()?;

        // Candidates sorted by machine id: infos are in creation order.
        let mut runnable: SmallVec<[MachineId; 8]> = SmallVec::new();
        {
            let st = self.state.lock();
            for info in &st.infos {
                if info.is_runnable() {
                    runnable.push(info.id);
                }
            }
        }
        let picked = {
            let mut strategy = self.strategy.lock();
            strategy.next_machine(&runnable, current.id)
        };
        let Some(next_id) = picked else {
            if runnable.is_empty() {
                if let Some(waiter) = self.lowest_waiting_machine() {
                    return Err(self.livelock_failure(&waiter.name));
                }
            }
            debug!("schedule fully explored");
            self.fully_explored.store(true, Ordering::Release);
            return Err(self.stop());
        };
        let Some(next) = self.info_for_machine(next_id) else {
            return Err(self.external_sync_failure());
        };
        if self.config.verbosity >= 2 {
            trace!(machine = %next_id, "turn granted");
        }
        self.trace.lock().push(TraceEntry::ScheduleChoice(next_id));
        self.state.lock().scheduled = Some(next_id);
        next.reset_program_counter();
        self.capture_program_state();
        self.check_liveness()?;

        if next_id != current.id {
            current.deactivate();
            next.activate();
            current.park_until_active()?;
        }
        Ok(())
    }

    /// Draw a nondeterministic boolean; a fair-choice id switches the trace
    /// entry to the fair variant.
    pub fn next_bool_choice(
        &self,
        max_value: usize,
        unique_id: Option<&str>,
    ) -> StepResult<bool> {
        if !self.running.load(Ordering::Acquire) {
            return Err(self.stop());
        }
        self.check_step_bound()?;
        let choice = self.strategy.lock().next_bool(max_value);
        let Some(value) = choice else {
            return Err(self.stop());
        };
        self.trace.lock().push(match unique_id {
            Some(id) => TraceEntry::FairBoolChoice(id.to_string(), value),
            None => TraceEntry::BoolChoice(value),
        });
        if let Some(active) = self.scheduled_info() {
            active.bump_program_counter();
        }
        self.capture_program_state();
        self.check_liveness()?;
        Ok(value)
    }

    /// Draw a nondeterministic integer in `0..max_value`.
    pub fn next_int_choice(&self, max_value: usize) -> StepResult<usize> {
        if !self.running.load(Ordering::Acquire) {
            return Err(self.stop());
        }
        self.check_step_bound()?;
        let choice = self.strategy.lock().next_int(max_value);
        let Some(value) = choice else {
            return Err(self.stop());
        };
        self.trace.lock().push(TraceEntry::IntChoice(value));
        if let Some(active) = self.scheduled_info() {
            active.bump_program_counter();
        }
        self.capture_program_state();
        self.check_liveness()?;
        Ok(value)
    }

    /// Register a worker for a machine. The very first machine starts active
    /// so the bootstrap worker proceeds without waiting to be scheduled in;
    /// a machine whose previous worker completed is rebound to the new one.
    pub fn notify_worker_created(&self, worker: WorkerId, id: MachineId, name: &str) {
        let mut st = self.state.lock();
        if let Some(info) = st.infos.get(id.as_usize()) {
            info.rebind(worker);
        } else {
            let first = st.infos.is_empty();
            st.infos
                .push(Arc::new(MachineInfo::new(id, name.to_string(), worker, first)));
        }
        st.task_map.insert(worker, id);
    }

    /// Called from inside a newly spawned worker before it runs user code:
    /// release the creator's start barrier, then park for the first turn.
    pub fn notify_worker_started(&self, worker: WorkerId) -> StepResult<()> {
        let Some(info) = self.info_for_worker(worker) else {
            return Err(self.external_sync_failure());
        };
        info.mark_started();
        info.park_until_active()
    }

    /// Creator-side causality barrier: do not proceed past machine creation
    /// until the child worker has registered.
    pub fn wait_for_worker_start(&self, worker: WorkerId) {
        let (info, single) = {
            let st = self.state.lock();
            let info = st
                .task_map
                .get(&worker)
                .and_then(|id| st.infos.get(id.as_usize()).cloned());
            (info, st.task_map.len() == 1)
        };
        let Some(info) = info else { return };
        if single {
            info.activate();
            return;
        }
        info.wait_until_started();
    }

    /// The caller's machine blocks on a typed receive. Does not yield: the
    /// caller is expected to call `schedule` next.
    pub fn notify_blocked_on_receive(&self, worker: WorkerId) -> StepResult<()> {
        let Some(info) = self.info_for_worker(worker) else {
            return Err(self.external_sync_failure());
        };
        info.set_waiting_to_receive();
        Ok(())
    }

    /// The awaited event arrived: the machine rejoins the runnable set.
    pub fn notify_event_received(&self, machine: MachineId) {
        if let Some(info) = self.info_for_machine(machine) {
            info.set_event_received();
        }
    }

    /// The scheduled machine's execution crossed an asynchronous boundary:
    /// the old worker handle is retired and the new one inherits the turn.
    pub fn notify_worker_changed(&self, new_worker: WorkerId) {
        let mut st = self.state.lock();
        let Some(id) = st.scheduled else { return };
        let Some(info) = st.infos.get(id.as_usize()).cloned() else {
            return;
        };
        let old = info.worker();
        st.task_map.remove(&old);
        info.change_worker(new_worker);
        st.task_map.insert(new_worker, id);
    }

    /// The caller's worker is done: hand the turn off and retire the handle.
    pub fn notify_worker_completed(&self, worker: WorkerId) -> StepResult<()> {
        let Some(info) = self.info_for_worker(worker) else {
            return Err(self.external_sync_failure());
        };
        info.complete();
        self.schedule()?;
        self.state.lock().task_map.remove(&worker);
        Ok(())
    }

    /// Record a bug; the first call wins. Stops the scheduler unless
    /// `kill_workers` is false. Returns the cancellation for the caller to
    /// propagate.
    pub fn notify_assertion_failure(
        &self,
        kind: BugKind,
        message: String,
        kill_workers: bool,
    ) -> Cancelled {
        if !self.bug_found.swap(true, Ordering::SeqCst) {
            let strategy = self.strategy.lock().description();
            error!(%message, %strategy, "bug found");
            let report = BugReport {
                kind,
                message,
                trace: self.trace.lock().clone(),
                strategy,
            };
            *self.bug.lock() = Some(report.clone());
            let observer = self.on_failure.lock().clone();
            if let Some(observer) = observer {
                observer(&report);
            }
            if self.config.attach_debugger {
                warn!(
                    pid = std::process::id(),
                    "bug found; attach a debugger to inspect the stopped run"
                );
            }
        }
        if kill_workers {
            self.stop()
        } else {
            Cancelled
        }
    }

    /// Stop the iteration: mark every machine disabled-and-active to force it
    /// out of sleep, pulse all parkers, and complete the done signal.
    pub fn stop(&self) -> Cancelled {
        self.running.store(false, Ordering::Release);
        let infos: Vec<Arc<MachineInfo>> = self.state.lock().infos.clone();
        for info in &infos {
            info.force_cancel();
        }
        self.done.complete();
        Cancelled
    }

    /// Block until the iteration is over. Idempotent.
    pub fn wait(&self) {
        self.done.wait();
    }

    /// Swap the strategy under the scheduler turn, returning the old one.
    pub fn switch_strategy(
        &self,
        new: Box<dyn SchedulingStrategy>,
    ) -> Box<dyn SchedulingStrategy> {
        std::mem::replace(&mut *self.strategy.lock(), new)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn bug_found(&self) -> bool {
        self.bug_found.load(Ordering::Acquire)
    }

    /// The iteration ended because the strategy ran out of schedules.
    pub fn has_fully_explored_schedule(&self) -> bool {
        self.fully_explored.load(Ordering::Acquire)
    }

    pub fn bug_report(&self) -> Option<BugReport> {
        self.bug.lock().clone()
    }

    pub fn trace(&self) -> ScheduleTrace {
        self.trace.lock().clone()
    }

    /// Snapshot of all machine records (tests and tooling).
    pub fn machine_infos(&self) -> Vec<Arc<MachineInfo>> {
        self.state.lock().infos.clone()
    }

    fn info_for_worker(&self, worker: WorkerId) -> Option<Arc<MachineInfo>> {
        let st = self.state.lock();
        st.task_map
            .get(&worker)
            .and_then(|id| st.infos.get(id.as_usize()).cloned())
    }

    fn info_for_machine(&self, id: MachineId) -> Option<Arc<MachineInfo>> {
        self.state.lock().infos.get(id.as_usize()).cloned()
    }

    fn scheduled_info(&self) -> Option<Arc<MachineInfo>> {
        let st = self.state.lock();
        st.scheduled.and_then(|id| st.infos.get(id.as_usize()).cloned())
    }

    /// Lowest-id machine blocked on a receive, for the livelock verdict.
    fn lowest_waiting_machine(&self) -> Option<Arc<MachineInfo>> {
        let st = self.state.lock();
        st.infos
            .iter()
            .find(|info| !info.is_completed() && info.is_waiting_to_receive())
            .cloned()
    }

    fn external_sync_failure(&self) -> Cancelled {
        self.notify_assertion_failure(
            BugKind::ExternalSynchronization,
            "Synchronization not controlled by the runtime.".to_string(),
            true,
        )
    }

    fn livelock_failure(&self, name: &str) -> Cancelled {
        self.notify_assertion_failure(
            BugKind::Livelock,
            format!(
                "Livelock detected. Machine '{name}' is waiting for an event, \
                 but no other machine is enabled."
            ),
            true,
        )
    }

    /// Enforce the logical step bound at a suspension point.
    fn check_step_bound(&self) -> StepResult<()> {
        let (reached, steps) = {
            let strategy = self.strategy.lock();
            (strategy.max_steps_reached(), strategy.explored_steps())
        };
        if !reached {
            return Ok(());
        }
        if self.config.depth_bound_is_bug {
            Err(self.notify_assertion_failure(
                BugKind::StepBoundReached,
                format!("Scheduling steps bound of {steps} reached."),
                true,
            ))
        } else {
            debug!(steps, "scheduling steps bound reached");
            Err(self.stop())
        }
    }

    /// Feed the state cache once past the safety prefix.
    fn capture_program_state(&self) {
        if !self.config.cache_program_state {
            return;
        }
        let steps = self.strategy.lock().explored_steps();
        if self.config.effective_safety_prefix() <= steps {
            let mut cache = self.cache.lock();
            if let Some(cache) = cache.as_mut() {
                let trace = self.trace.lock();
                if let Some(head) = trace.head() {
                    cache.capture(head);
                }
            }
        }
    }

    /// Run the liveness hook; a violation fails the iteration.
    fn check_liveness(&self) -> StepResult<()> {
        let violation = {
            let mut monitor = self.liveness.lock();
            monitor.as_mut().and_then(|m| m.check_at_scheduling_step())
        };
        match violation {
            Some(message) => {
                Err(self.notify_assertion_failure(BugKind::AssertionFailure, message, true))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{shared, RandomStrategy};

    fn scheduler() -> (Scheduler, WorkerId) {
        let root = alloc_worker_id();
        let scheduler = Scheduler::new(
            Arc::new(Config::default()),
            shared(Box::new(RandomStrategy::new(1, 0))),
            root,
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            None,
        );
        (scheduler, root)
    }

    #[test]
    fn root_worker_scheduling_point_is_a_no_op() {
        let (scheduler, root) = scheduler();
        set_current_worker(root);
        assert_eq!(scheduler.schedule(), Ok(()));
        assert_eq!(scheduler.trace().len(), 0);
    }

    #[test]
    fn unknown_worker_is_an_external_synchronization_bug() {
        let (scheduler, _root) = scheduler();
        set_current_worker(alloc_worker_id());
        assert_eq!(scheduler.schedule(), Err(Cancelled));
        let bug = scheduler.bug_report().unwrap();
        assert_eq!(bug.kind, BugKind::ExternalSynchronization);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn worker_changed_retires_the_old_handle() {
        let (scheduler, _root) = scheduler();
        let w1 = alloc_worker_id();
        scheduler.notify_worker_created(w1, MachineId(0), "A()");
        set_current_worker(w1);
        // Grant the turn to the only machine: no hand-off, scheduled is set.
        assert_eq!(scheduler.schedule(), Ok(()));
        assert_eq!(scheduler.trace().schedule_choices(), 1);

        let w2 = alloc_worker_id();
        scheduler.notify_worker_changed(w2);
        // The new handle inherits the turn...
        set_current_worker(w2);
        assert_eq!(scheduler.schedule(), Ok(()));
        // ...and the old handle is no longer controlled by the runtime.
        set_current_worker(w1);
        assert_eq!(scheduler.schedule(), Err(Cancelled));
        assert_eq!(
            scheduler.bug_report().unwrap().kind,
            BugKind::ExternalSynchronization
        );
    }

    #[test]
    fn first_bug_wins() {
        let (scheduler, _root) = scheduler();
        scheduler.notify_assertion_failure(BugKind::AssertionFailure, "first".into(), true);
        scheduler.notify_assertion_failure(BugKind::Livelock, "second".into(), true);
        let bug = scheduler.bug_report().unwrap();
        assert_eq!(bug.message, "first");
        assert_eq!(bug.kind, BugKind::AssertionFailure);
    }

    #[test]
    fn failure_observer_fires_exactly_once() {
        let root = alloc_worker_id();
        let hits = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&hits);
        let scheduler = Scheduler::new(
            Arc::new(Config::default()),
            shared(Box::new(RandomStrategy::new(1, 0))),
            root,
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Some(Arc::new(move |_report| {
                observed.fetch_add(1, Ordering::SeqCst);
            })),
        );
        scheduler.notify_assertion_failure(BugKind::AssertionFailure, "a".into(), true);
        scheduler.notify_assertion_failure(BugKind::AssertionFailure, "b".into(), true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_and_wait_are_idempotent() {
        let (scheduler, _root) = scheduler();
        scheduler.stop();
        scheduler.stop();
        scheduler.wait();
        scheduler.wait();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn switch_strategy_swaps_under_the_turn() {
        let (scheduler, _root) = scheduler();
        let old = scheduler.switch_strategy(Box::new(RandomStrategy::new(9, 0)));
        assert_eq!(old.description(), "random[seed=1]");
        assert_eq!(
            scheduler.switch_strategy(Box::new(RandomStrategy::new(1, 0))).description(),
            "random[seed=9]"
        );
    }

    #[test]
    fn choices_are_recorded_with_fair_ids() {
        let (scheduler, _root) = scheduler();
        let w1 = alloc_worker_id();
        scheduler.notify_worker_created(w1, MachineId(0), "A()");
        set_current_worker(w1);
        scheduler.schedule().unwrap();
        scheduler.next_bool_choice(2, None).unwrap();
        scheduler.next_bool_choice(2, Some("retry-loop")).unwrap();
        scheduler.next_int_choice(5).unwrap();
        let entries = scheduler.trace();
        let entries = entries.entries();
        assert!(matches!(entries[1], TraceEntry::BoolChoice(_)));
        assert!(
            matches!(&entries[2], TraceEntry::FairBoolChoice(id, _) if id.as_str() == "retry-loop")
        );
        assert!(matches!(entries[3], TraceEntry::IntChoice(_)));
        // Choices bumped the active machine's program counter.
        let infos = scheduler.machine_infos();
        assert_eq!(infos[0].program_counter(), 3);
    }
}
