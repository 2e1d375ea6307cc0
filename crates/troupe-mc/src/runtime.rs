//! Per-iteration testing runtime: machine table, worker spawner, and the
//! context machines program against.
//!
//! The runtime owns the scheduler and the machine instances; the scheduler
//! owns all scheduling state. Workers are OS threads, one per machine at a
//! time: a machine whose inbox drains lets its worker complete, and a later
//! send spawns a fresh worker for it.

use crate::config::Config;
use crate::error::{BugKind, RuntimeError, RuntimeResult};
use crate::report::BugReport;
use crate::scheduler::{
    alloc_worker_id, current_worker, set_current_worker, FailureObserver, Scheduler, SharedCache,
    SharedMonitor,
};
use crate::strategy::SharedStrategy;
use crate::trace::ScheduleTrace;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, trace};
use troupe_machine::{
    Cancelled, Delivery, EntryFn, Event, HandlerFn, Machine, MachineContext, MachineDecl,
    MachineId, On, StepResult, WorkerId,
};

/// One iteration's runtime.
///
/// Created fresh per iteration and disposed afterwards; any use of a disposed
/// runtime deterministically fails instead of reading stale state.
pub struct Runtime {
    config: Arc<Config>,
    scheduler: Arc<Scheduler>,
    machines: Mutex<Vec<Arc<Mutex<Machine>>>>,
    disposed: AtomicBool,
}

impl Runtime {
    /// Build a runtime bound to the calling thread as the root worker.
    pub fn new(
        config: Arc<Config>,
        strategy: SharedStrategy,
        cache: SharedCache,
        liveness: SharedMonitor,
        on_failure: Option<FailureObserver>,
    ) -> Arc<Self> {
        let root = alloc_worker_id();
        set_current_worker(root);
        let scheduler = Arc::new(Scheduler::new(
            config.clone(),
            strategy,
            root,
            cache,
            liveness,
            on_failure,
        ));
        Arc::new(Self {
            config,
            scheduler,
            machines: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Create a machine and start its worker. Usable from entry code; inside
    /// handlers use [`MachineContext::create`].
    pub fn create_machine(
        self: &Arc<Self>,
        decl: Arc<MachineDecl>,
        name: Option<String>,
    ) -> RuntimeResult<MachineId> {
        self.ensure_live()?;
        let id = self.register_machine(decl, name);
        // A stopped scheduler cancels the spawn; the machine is still
        // registered so the driver can fold the iteration up normally.
        let _ = self.start_machine(id);
        let _ = self.scheduler.schedule();
        Ok(id)
    }

    /// Send an event from entry code (the root worker).
    pub fn send_event(self: &Arc<Self>, target: MachineId, event: Event) -> RuntimeResult<()> {
        self.ensure_live()?;
        let _ = self.deliver(target, event);
        let _ = self.scheduler.schedule();
        Ok(())
    }

    /// Write a line through the runtime's logger.
    pub fn log(&self, message: &str) -> RuntimeResult<()> {
        self.ensure_live()?;
        info!(target: "troupe", "{message}");
        Ok(())
    }

    /// Block until the iteration is over.
    pub fn wait(&self) -> RuntimeResult<()> {
        self.ensure_live()?;
        self.scheduler.wait();
        Ok(())
    }

    /// Force the iteration to stop (driver shutdown path).
    pub fn shutdown(&self) {
        let _ = self.scheduler.stop();
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn bug_report(&self) -> Option<BugReport> {
        self.scheduler.bug_report()
    }

    pub fn trace(&self) -> ScheduleTrace {
        self.scheduler.trace()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.lock().len()
    }

    /// Mark this runtime stale. Every later call through the public surface
    /// reports a disposed-object failure.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> RuntimeResult<()> {
        if self.is_disposed() {
            return Err(RuntimeError::Disposed);
        }
        Ok(())
    }

    fn machine(&self, id: MachineId) -> Option<Arc<Mutex<Machine>>> {
        self.machines.lock().get(id.as_usize()).cloned()
    }

    fn machine_name(&self, id: MachineId) -> String {
        self.machine(id)
            .map(|slot| slot.lock().display_name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn register_machine(&self, decl: Arc<MachineDecl>, name: Option<String>) -> MachineId {
        let mut machines = self.machines.lock();
        let id = MachineId(machines.len() as u64);
        machines.push(Arc::new(Mutex::new(Machine::new(id, decl, name))));
        id
    }

    /// Spawn a worker for a machine and wait for it to register.
    fn start_machine(self: &Arc<Self>, id: MachineId) -> StepResult<()> {
        let worker = alloc_worker_id();
        let name = self.machine_name(id);
        self.scheduler.notify_worker_created(worker, id, &name);
        let rt = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("troupe-{id}"))
            .spawn(move || {
                set_current_worker(worker);
                let _ = rt.run_machine(id, worker);
            });
        if let Err(e) = spawned {
            return Err(self.scheduler.notify_assertion_failure(
                BugKind::AssertionFailure,
                format!("Failed to spawn a worker for machine '{name}': {e}."),
                true,
            ));
        }
        self.scheduler.wait_for_worker_start(worker);
        Ok(())
    }

    /// Machine-layer delivery: hand the event to the target, waking a blocked
    /// receive or spawning a fresh worker for a quiescent machine.
    fn deliver(self: &Arc<Self>, target: MachineId, event: Event) -> StepResult<()> {
        let Some(slot) = self.machine(target) else {
            return Err(self.scheduler.notify_assertion_failure(
                BugKind::AssertionFailure,
                format!(
                    "Cannot send event '{}' to unknown machine {target}.",
                    event.name
                ),
                true,
            ));
        };
        let event_name = event.name.clone();
        let (outcome, needs_worker) = {
            let mut machine = slot.lock();
            let outcome = machine.try_deliver(event);
            let needs_worker = matches!(outcome, Delivery::Enqueued) && !machine.has_live_worker();
            if needs_worker {
                machine.set_live_worker(true);
            }
            (outcome, needs_worker)
        };
        match outcome {
            Delivery::Direct => self.scheduler.notify_event_received(target),
            Delivery::Dropped => {
                trace!(machine = %target, event = %event_name, "event dropped by halted machine");
            }
            Delivery::Enqueued => {
                if needs_worker {
                    self.start_machine(target)?;
                }
            }
        }
        Ok(())
    }

    /// Worker body: register, run the entry body once per machine lifetime,
    /// then drain events until halted or quiescent.
    fn run_machine(self: &Arc<Self>, id: MachineId, worker: WorkerId) -> StepResult<()> {
        self.scheduler.notify_worker_started(worker)?;
        let Some(slot) = self.machine(id) else {
            return Err(Cancelled);
        };
        if self.config.verbosity >= 1 {
            debug!(machine = %id, "worker activated");
        }
        let entry = {
            let mut machine = slot.lock();
            if machine.entry_done() {
                None
            } else {
                machine.mark_entry_done();
                machine.current_entry()
            }
        };
        if let Some(entry) = entry {
            self.invoke_entry(id, entry)?;
            self.scheduler.schedule()?;
        }
        loop {
            let next = {
                let mut machine = slot.lock();
                if machine.is_halted() {
                    None
                } else {
                    machine.dequeue()
                }
            };
            let Some(event) = next else { break };
            self.dispatch(id, event)?;
        }
        // Quiescence must be visible before the turn is handed off, so a
        // later sender knows to spawn a replacement worker.
        slot.lock().set_live_worker(false);
        self.scheduler.notify_worker_completed(worker)
    }

    /// Resolve and run the current state's reaction to one event.
    fn dispatch(self: &Arc<Self>, id: MachineId, event: Event) -> StepResult<()> {
        let Some(slot) = self.machine(id) else {
            return Err(Cancelled);
        };
        let (reaction, ignored, name, state) = {
            let machine = slot.lock();
            (
                machine.reaction(&event.name),
                machine.is_ignored(&event.name),
                machine.display_name().to_string(),
                machine.current_state_name(),
            )
        };
        if self.config.verbosity >= 1 {
            debug!(machine = %id, event = %event, state = %state, "handling event");
        }
        let Some(reaction) = reaction else {
            if ignored {
                return Ok(());
            }
            return Err(self.scheduler.notify_assertion_failure(
                BugKind::UnhandledEvent,
                format!(
                    "Machine '{name}' received event '{}' that cannot be handled in state '{state}'.",
                    event.name
                ),
                true,
            ));
        };
        match reaction {
            On::Action(handler) => self.invoke_handler(id, handler, &event)?,
            On::Goto(state) => self.enter_state(id, &state, false)?,
            On::Push(state) => self.enter_state(id, &state, true)?,
        }
        self.scheduler.schedule()
    }

    /// Goto/push a state and run its entry body.
    fn enter_state(self: &Arc<Self>, id: MachineId, state: &str, push: bool) -> StepResult<()> {
        let Some(slot) = self.machine(id) else {
            return Err(Cancelled);
        };
        let entry = {
            let mut machine = slot.lock();
            let Some(idx) = machine.decl().state_index(state) else {
                let name = machine.display_name().to_string();
                drop(machine);
                return Err(self.scheduler.notify_assertion_failure(
                    BugKind::AssertionFailure,
                    format!("Machine '{name}' cannot transition to unknown state '{state}'."),
                    true,
                ));
            };
            if push {
                machine.push_state(idx);
            } else {
                machine.goto_state(idx);
            }
            machine.current_entry()
        };
        if let Some(entry) = entry {
            self.invoke_entry(id, entry)?;
        }
        Ok(())
    }

    fn invoke_entry(self: &Arc<Self>, id: MachineId, entry: EntryFn) -> StepResult<()> {
        let mut ctx = Ctx { rt: self, id };
        let result = panic::catch_unwind(AssertUnwindSafe(|| entry(&mut ctx)));
        self.handler_outcome(id, result)
    }

    fn invoke_handler(
        self: &Arc<Self>,
        id: MachineId,
        handler: HandlerFn,
        event: &Event,
    ) -> StepResult<()> {
        let mut ctx = Ctx { rt: self, id };
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut ctx, event)));
        self.handler_outcome(id, result)
    }

    /// A panic escaping a handler is reported as a bug and unwinds the
    /// worker; a clean result passes through.
    fn handler_outcome(
        &self,
        id: MachineId,
        result: Result<StepResult<()>, Box<dyn Any + Send>>,
    ) -> StepResult<()> {
        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let name = self.machine_name(id);
                Err(self.scheduler.notify_assertion_failure(
                    BugKind::UnhandledPanic,
                    format!(
                        "Unhandled exception in machine '{name}': {}.",
                        panic_text(&payload)
                    ),
                    true,
                ))
            }
        }
    }
}

fn panic_text(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Context handed to handlers: the machine id plus the runtime behind it.
struct Ctx<'a> {
    rt: &'a Arc<Runtime>,
    id: MachineId,
}

impl Ctx<'_> {
    fn slot(&self) -> StepResult<Arc<Mutex<Machine>>> {
        self.rt.machine(self.id).ok_or(Cancelled)
    }
}

impl MachineContext for Ctx<'_> {
    fn self_id(&self) -> MachineId {
        self.id
    }

    fn send(&mut self, target: MachineId, event: Event) -> StepResult<()> {
        if self.rt.config.verbosity >= 1 {
            debug!(from = %self.id, to = %target, event = %event, "send");
        }
        self.rt.deliver(target, event)?;
        self.rt.scheduler.schedule()
    }

    fn create(&mut self, decl: Arc<MachineDecl>, name: Option<String>) -> StepResult<MachineId> {
        let id = self.rt.register_machine(decl, name);
        self.rt.start_machine(id)?;
        self.rt.scheduler.schedule()?;
        Ok(id)
    }

    fn receive(&mut self, names: &[&str]) -> StepResult<Event> {
        let slot = self.slot()?;
        let pending = slot.lock().begin_receive(names);
        if let Some(event) = pending {
            return Ok(event);
        }
        let worker = current_worker().ok_or(Cancelled)?;
        self.rt.scheduler.notify_blocked_on_receive(worker)?;
        self.rt.scheduler.schedule()?;
        let result = slot.lock().take_received().ok_or(Cancelled);
        result
    }

    fn raise(&mut self, event: Event) -> StepResult<()> {
        self.slot()?.lock().raise(event);
        Ok(())
    }

    fn push(&mut self, state: &str) -> StepResult<()> {
        self.rt.enter_state(self.id, state, true)
    }

    fn goto(&mut self, state: &str) -> StepResult<()> {
        self.rt.enter_state(self.id, state, false)
    }

    fn pop(&mut self) -> StepResult<()> {
        let slot = self.slot()?;
        let popped = slot.lock().pop_state();
        if !popped {
            let name = self.rt.machine_name(self.id);
            return Err(self.rt.scheduler.notify_assertion_failure(
                BugKind::UnbalancedPop,
                format!("Machine '{name}' popped with no matching push."),
                true,
            ));
        }
        Ok(())
    }

    fn halt(&mut self) -> StepResult<()> {
        self.slot()?.lock().halt();
        Ok(())
    }

    fn assert(&mut self, condition: bool, message: &str) -> StepResult<()> {
        if condition {
            return Ok(());
        }
        Err(self.rt.scheduler.notify_assertion_failure(
            BugKind::AssertionFailure,
            format!("Assertion failed: {message}"),
            true,
        ))
    }

    fn random_bool(&mut self, max_value: usize) -> StepResult<bool> {
        self.rt.scheduler.next_bool_choice(max_value, None)
    }

    fn fair_random_bool(&mut self, unique_id: &str) -> StepResult<bool> {
        self.rt.scheduler.next_bool_choice(2, Some(unique_id))
    }

    fn random_int(&mut self, max_value: usize) -> StepResult<usize> {
        self.rt.scheduler.next_int_choice(max_value)
    }

    fn log(&mut self, message: &str) -> StepResult<()> {
        info!(target: "troupe", machine = %self.id, "{message}");
        Ok(())
    }
}
