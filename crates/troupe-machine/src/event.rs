//! Events and their payload values.

use crate::id::MachineId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A payload value carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Value {
    /// No payload.
    #[default]
    Unit,
    /// Boolean payload.
    Bool(bool),
    /// Integer payload.
    Int(i64),
    /// A machine reference, e.g. a reply-to address.
    Id(MachineId),
}

impl Value {
    /// Return a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Id(_) => "Id",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<MachineId> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }
}

/// A typed message delivered to a machine's inbox.
///
/// Handlers are keyed by `name`; the payload is opaque to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: Arc<str>,
    pub payload: Value,
}

impl Event {
    /// An event with no payload.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Unit,
        }
    }

    /// An event carrying a payload.
    pub fn with_payload(name: impl Into<Arc<str>>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Value::Unit => write!(f, "{}", self.name),
            p => write!(f, "{}({:?})", self.name, p),
        }
    }
}
