//! The operation surface machine handlers program against.

use crate::decl::MachineDecl;
use crate::error::StepResult;
use crate::event::Event;
use crate::id::MachineId;
use std::sync::Arc;

/// Operations a machine may perform while it holds the turn.
///
/// Implemented by the testing runtime; handlers receive it as a trait object
/// so the machine layer stays independent of the scheduler. Methods that are
/// scheduling points yield to the scheduler before returning; all of them
/// propagate the cancellation sentinel with `?`.
pub trait MachineContext {
    /// Id of the machine running this handler.
    fn self_id(&self) -> MachineId;

    /// Enqueue an event for `target` and yield. Delivery is FIFO per sender.
    fn send(&mut self, target: MachineId, event: Event) -> StepResult<()>;

    /// Create a machine, wait for its worker to register, and yield.
    fn create(&mut self, decl: Arc<MachineDecl>, name: Option<String>) -> StepResult<MachineId>;

    /// Block until an event with one of the given names arrives.
    ///
    /// If a matching event is already pending it is taken without yielding;
    /// otherwise the machine leaves the runnable set until a matching send
    /// wakes it.
    fn receive(&mut self, names: &[&str]) -> StepResult<Event>;

    /// Queue an event to this machine ahead of its inbox. Not a scheduling
    /// point: the raised event is handled before anything else.
    fn raise(&mut self, event: Event) -> StepResult<()>;

    /// Push a state onto the state stack and run its entry body.
    fn push(&mut self, state: &str) -> StepResult<()>;

    /// Replace the top of the state stack and run the new state's entry body.
    fn goto(&mut self, state: &str) -> StepResult<()>;

    /// Pop the current state. Popping the last state is a reported bug.
    fn pop(&mut self) -> StepResult<()>;

    /// Mark this machine halted; its worker stops at the next dispatch
    /// boundary. Events sent to a halted machine are dropped.
    fn halt(&mut self) -> StepResult<()>;

    /// Report a bug and stop the iteration if `condition` is false.
    fn assert(&mut self, condition: bool, message: &str) -> StepResult<()>;

    /// Draw a nondeterministic boolean; true with probability 1/`max_value`.
    fn random_bool(&mut self, max_value: usize) -> StepResult<bool>;

    /// Draw a nondeterministic boolean recorded under a fair-choice id.
    fn fair_random_bool(&mut self, unique_id: &str) -> StepResult<bool>;

    /// Draw a nondeterministic integer in `0..max_value`.
    fn random_int(&mut self, max_value: usize) -> StepResult<usize>;

    /// Write a line through the runtime's logger.
    fn log(&mut self, message: &str) -> StepResult<()>;
}
