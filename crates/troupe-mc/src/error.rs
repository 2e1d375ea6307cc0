//! Error and bug taxonomy for the testing runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use troupe_machine::MachineId;

/// Classification of a reported bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugKind {
    /// A user or runtime invariant was violated.
    AssertionFailure,
    /// Some machine waits to receive while no machine is runnable.
    Livelock,
    /// An event arrived that the current state neither handles nor ignores.
    UnhandledEvent,
    /// A state was popped with no matching push.
    UnbalancedPop,
    /// A worker not registered with the scheduler entered a scheduling point.
    ExternalSynchronization,
    /// The step bound was hit and the configuration treats that as a bug.
    StepBoundReached,
    /// A panic escaped a machine handler.
    UnhandledPanic,
    /// A previous iteration's runtime was used.
    DisposedRuntime,
}

/// User-facing errors from the runtime surface (entry code, not handlers).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("cannot access a disposed runtime")]
    Disposed,

    #[error("unknown machine {0}")]
    UnknownMachine(MachineId),

    #[error("unknown state '{0}'")]
    UnknownState(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
