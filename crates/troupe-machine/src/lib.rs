//! Machine-layer contract for the troupe concurrency tester.
//!
//! This crate defines what a machine *is* — identifiers, events, state
//! declarations, the per-instance record, and the operation surface handlers
//! program against — without any scheduling logic. The serialized scheduler
//! and test driver live in `troupe-mc`.

pub mod context;
pub mod decl;
pub mod error;
pub mod event;
pub mod id;
pub mod machine;

pub use context::MachineContext;
pub use decl::{EntryFn, HandlerFn, MachineDecl, On, StateDecl};
pub use error::{Cancelled, StepResult};
pub use event::{Event, Value};
pub use id::{MachineId, WorkerId};
pub use machine::{Delivery, Machine};
