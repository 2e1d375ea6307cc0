//! The cancellation sentinel shared by every scheduling-point operation.

use thiserror::Error;

/// Unwind signal used to tear down a worker at the end of an iteration.
///
/// Not a user-visible error: every scheduling-point operation returns
/// `StepResult` and propagates this with `?`, and only the worker's outer
/// frame consumes it. Handlers must never swallow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution cancelled")]
pub struct Cancelled;

/// Result of any operation that crosses a scheduling point.
pub type StepResult<T> = Result<T, Cancelled>;
