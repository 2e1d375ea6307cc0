//! Declarative machine definitions: named states and per-state handlers.

use crate::context::MachineContext;
use crate::error::StepResult;
use crate::event::Event;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An event-handler body. Runs on the machine's worker while it holds the turn.
pub type HandlerFn =
    Arc<dyn Fn(&mut dyn MachineContext, &Event) -> StepResult<()> + Send + Sync>;

/// A state-entry body. Runs when the state is entered (start, goto, push).
pub type EntryFn = Arc<dyn Fn(&mut dyn MachineContext) -> StepResult<()> + Send + Sync>;

/// How a state reacts to one event name.
#[derive(Clone)]
pub enum On {
    /// Run an action in the current state.
    Action(HandlerFn),
    /// Replace the top of the state stack and run the new state's entry.
    Goto(Arc<str>),
    /// Push a state onto the stack and run its entry.
    Push(Arc<str>),
}

/// One named state: optional entry body plus event reactions.
pub struct StateDecl {
    pub name: Arc<str>,
    pub entry: Option<EntryFn>,
    pub handlers: HashMap<Arc<str>, On>,
    /// Events silently dropped in this state.
    pub ignored: HashSet<Arc<str>>,
}

impl StateDecl {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            handlers: HashMap::new(),
            ignored: HashSet::new(),
        }
    }

    pub fn on_entry(
        mut self,
        body: impl Fn(&mut dyn MachineContext) -> StepResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.entry = Some(Arc::new(body));
        self
    }

    pub fn on(
        mut self,
        event: impl Into<Arc<str>>,
        body: impl Fn(&mut dyn MachineContext, &Event) -> StepResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(event.into(), On::Action(Arc::new(body)));
        self
    }

    pub fn on_goto(mut self, event: impl Into<Arc<str>>, state: impl Into<Arc<str>>) -> Self {
        self.handlers.insert(event.into(), On::Goto(state.into()));
        self
    }

    pub fn on_push(mut self, event: impl Into<Arc<str>>, state: impl Into<Arc<str>>) -> Self {
        self.handlers.insert(event.into(), On::Push(state.into()));
        self
    }

    pub fn ignore(mut self, event: impl Into<Arc<str>>) -> Self {
        self.ignored.insert(event.into());
        self
    }
}

/// A machine declaration: kind name plus states. Index 0 is the initial state.
pub struct MachineDecl {
    pub kind: Arc<str>,
    pub states: Vec<StateDecl>,
}

impl MachineDecl {
    pub fn new(kind: impl Into<Arc<str>>, states: Vec<StateDecl>) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.into(),
            states,
        })
    }

    /// Resolve a state name to its index.
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| &*s.name == name)
    }
}
