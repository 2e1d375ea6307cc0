//! Per-machine scheduling record and parking primitive.

use parking_lot::{Condvar, Mutex};
use troupe_machine::{Cancelled, MachineId, StepResult, WorkerId};

/// Flag block guarded by the record's lock.
///
/// At most one record has `is_active` set between scheduling points; a worker
/// runs user code only while its record is active.
#[derive(Debug)]
pub(crate) struct Flags {
    /// Worker currently bound to this machine.
    pub worker: WorkerId,
    /// This machine holds the turn.
    pub is_active: bool,
    /// Candidate for scheduling: not halted, cancelled, or waiting.
    pub is_enabled: bool,
    /// Blocked on a typed receive.
    pub is_waiting_to_receive: bool,
    /// The worker has returned.
    pub is_completed: bool,
    /// The worker has registered and parked for its first turn.
    pub has_started: bool,
    /// Nondeterministic choices consumed while active since the last grant.
    pub program_counter: u64,
}

/// Scheduling record for one machine.
///
/// Owned exclusively by the scheduler. The machine's worker parks on `cv`
/// whenever another machine holds the turn; every wake path re-checks
/// `is_enabled` and unwinds with `Cancelled` when it is clear.
pub struct MachineInfo {
    pub id: MachineId,
    /// Display name, for bug messages.
    pub name: String,
    flags: Mutex<Flags>,
    cv: Condvar,
}

impl MachineInfo {
    pub(crate) fn new(id: MachineId, name: String, worker: WorkerId, first: bool) -> Self {
        Self {
            id,
            name,
            flags: Mutex::new(Flags {
                worker,
                // The very first machine starts active so the bootstrap worker
                // proceeds without waiting to be scheduled in.
                is_active: first,
                is_enabled: true,
                is_waiting_to_receive: false,
                is_completed: false,
                has_started: first,
                program_counter: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.lock().is_enabled
    }

    pub fn is_active(&self) -> bool {
        self.flags.lock().is_active
    }

    pub fn is_waiting_to_receive(&self) -> bool {
        self.flags.lock().is_waiting_to_receive
    }

    pub fn is_completed(&self) -> bool {
        self.flags.lock().is_completed
    }

    pub fn has_started(&self) -> bool {
        self.flags.lock().has_started
    }

    pub fn program_counter(&self) -> u64 {
        self.flags.lock().program_counter
    }

    pub(crate) fn worker(&self) -> WorkerId {
        self.flags.lock().worker
    }

    /// A machine is runnable when enabled; waiting and completed machines
    /// already cleared the flag.
    pub(crate) fn is_runnable(&self) -> bool {
        self.flags.lock().is_enabled
    }

    /// Rebind a fresh worker to a machine whose previous worker completed.
    pub(crate) fn rebind(&self, worker: WorkerId) {
        let mut f = self.flags.lock();
        f.worker = worker;
        f.is_active = false;
        f.is_enabled = true;
        f.is_waiting_to_receive = false;
        f.is_completed = false;
        f.has_started = false;
    }

    /// Hand over to a new worker mid-turn, keeping every other flag.
    pub(crate) fn change_worker(&self, worker: WorkerId) {
        self.flags.lock().worker = worker;
    }

    /// Grant the turn and wake the parked worker.
    pub(crate) fn activate(&self) {
        let mut f = self.flags.lock();
        f.is_active = true;
        self.cv.notify_all();
    }

    pub(crate) fn deactivate(&self) {
        self.flags.lock().is_active = false;
    }

    pub(crate) fn reset_program_counter(&self) {
        self.flags.lock().program_counter = 0;
    }

    pub(crate) fn bump_program_counter(&self) {
        self.flags.lock().program_counter += 1;
    }

    /// Mark the worker registered and wake anyone in the start barrier.
    pub(crate) fn mark_started(&self) {
        let mut f = self.flags.lock();
        f.has_started = true;
        self.cv.notify_all();
    }

    /// Creator-side causality barrier: block until the child registered.
    pub(crate) fn wait_until_started(&self) {
        let mut f = self.flags.lock();
        while !f.has_started {
            self.cv.wait(&mut f);
        }
    }

    /// Park the calling worker until this machine is granted the turn.
    ///
    /// Completed workers do not park: they are on their way out. On wake a
    /// cleared `is_enabled` means the iteration is tearing down.
    pub(crate) fn park_until_active(&self) -> StepResult<()> {
        let mut f = self.flags.lock();
        if f.is_completed {
            return Ok(());
        }
        while !f.is_active {
            self.cv.wait(&mut f);
        }
        if !f.is_enabled {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Leave the runnable set while blocked on a typed receive.
    pub(crate) fn set_waiting_to_receive(&self) {
        let mut f = self.flags.lock();
        f.is_waiting_to_receive = true;
        f.is_enabled = false;
    }

    /// Rejoin the runnable set after the awaited event arrived.
    pub(crate) fn set_event_received(&self) {
        let mut f = self.flags.lock();
        f.is_waiting_to_receive = false;
        f.is_enabled = true;
    }

    pub(crate) fn complete(&self) {
        let mut f = self.flags.lock();
        f.is_completed = true;
        f.is_enabled = false;
    }

    /// Force the worker out of any sleep so it can unwind: disabled, active,
    /// started, and pulsed.
    pub(crate) fn force_cancel(&self) {
        let mut f = self.flags.lock();
        f.is_enabled = false;
        f.is_active = true;
        f.has_started = true;
        self.cv.notify_all();
    }
}
