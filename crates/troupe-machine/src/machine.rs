//! Per-machine instance state: state stack, inbox, receive bookkeeping.
//!
//! All methods are plain data operations; the runtime calls them under the
//! machine's lock while the owning worker holds the turn.

use crate::decl::{EntryFn, MachineDecl, On};
use crate::event::Event;
use crate::id::MachineId;
use std::collections::VecDeque;
use std::sync::Arc;

/// What happened to an event offered to a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The machine was blocked waiting for this event name; it was handed
    /// over directly and the machine must be re-enabled.
    Direct,
    /// Appended to the inbox.
    Enqueued,
    /// The machine has halted; the event was dropped.
    Dropped,
}

/// A live machine instance.
pub struct Machine {
    id: MachineId,
    decl: Arc<MachineDecl>,
    display_name: String,
    /// Stack of indices into `decl.states`; the top is the current state.
    state_stack: Vec<usize>,
    inbox: VecDeque<Event>,
    /// Event raised by the current handler; dequeued before the inbox.
    raised: Option<Event>,
    /// Event names a blocked receive is waiting for.
    wait_set: Option<Vec<Arc<str>>>,
    /// Event handed over while blocked, consumed on wake.
    received: Option<Event>,
    halted: bool,
    /// True from the spawn decision until the worker goes quiescent.
    has_live_worker: bool,
    entry_done: bool,
}

impl Machine {
    pub fn new(id: MachineId, decl: Arc<MachineDecl>, name: Option<String>) -> Self {
        let display_name = name.unwrap_or_else(|| format!("{}()", decl.kind));
        Self {
            id,
            decl,
            display_name,
            state_stack: vec![0],
            inbox: VecDeque::new(),
            raised: None,
            wait_set: None,
            received: None,
            halted: false,
            has_live_worker: true,
            entry_done: false,
        }
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn decl(&self) -> &Arc<MachineDecl> {
        &self.decl
    }

    /// User-supplied name, or `{kind}()` when unnamed.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn current_state_name(&self) -> Arc<str> {
        let idx = self.state_stack[self.state_stack.len() - 1];
        self.decl.states[idx].name.clone()
    }

    /// Entry body of the current state.
    pub fn current_entry(&self) -> Option<EntryFn> {
        let idx = self.state_stack[self.state_stack.len() - 1];
        self.decl.states[idx].entry.clone()
    }

    /// Reaction of the current state to an event name, if declared.
    pub fn reaction(&self, event: &str) -> Option<On> {
        let idx = self.state_stack[self.state_stack.len() - 1];
        self.decl.states[idx].handlers.get(event).cloned()
    }

    pub fn is_ignored(&self, event: &str) -> bool {
        let idx = self.state_stack[self.state_stack.len() - 1];
        self.decl.states[idx].ignored.contains(event)
    }

    /// Take the next event to handle: a raised event wins over the inbox.
    pub fn dequeue(&mut self) -> Option<Event> {
        self.raised.take().or_else(|| self.inbox.pop_front())
    }

    pub fn raise(&mut self, event: Event) {
        self.raised = Some(event);
    }

    /// Offer an event to this machine.
    pub fn try_deliver(&mut self, event: Event) -> Delivery {
        if self.halted {
            return Delivery::Dropped;
        }
        if let Some(names) = &self.wait_set {
            if names.iter().any(|n| **n == *event.name) {
                self.wait_set = None;
                self.received = Some(event);
                return Delivery::Direct;
            }
        }
        self.inbox.push_back(event);
        Delivery::Enqueued
    }

    /// Start a blocking receive: take a matching pending event if one exists,
    /// otherwise record the wait set.
    pub fn begin_receive(&mut self, names: &[&str]) -> Option<Event> {
        if let Some(pos) = self
            .inbox
            .iter()
            .position(|e| names.iter().any(|n| *n == &*e.name))
        {
            return self.inbox.remove(pos);
        }
        self.wait_set = Some(names.iter().map(|n| Arc::from(*n)).collect());
        None
    }

    /// Consume the event handed over by a direct delivery.
    pub fn take_received(&mut self) -> Option<Event> {
        self.received.take()
    }

    pub fn push_state(&mut self, idx: usize) {
        self.state_stack.push(idx);
    }

    pub fn goto_state(&mut self, idx: usize) {
        let top = self.state_stack.len() - 1;
        self.state_stack[top] = idx;
    }

    /// Pop the current state. Returns false when there is no matching push.
    pub fn pop_state(&mut self) -> bool {
        if self.state_stack.len() <= 1 {
            return false;
        }
        self.state_stack.pop();
        true
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn has_live_worker(&self) -> bool {
        self.has_live_worker
    }

    pub fn set_live_worker(&mut self, live: bool) {
        self.has_live_worker = live;
    }

    /// True once the initial state's entry body has run.
    pub fn entry_done(&self) -> bool {
        self.entry_done
    }

    pub fn mark_entry_done(&mut self) {
        self.entry_done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::StateDecl;

    fn machine() -> Machine {
        let decl = MachineDecl::new(
            "M",
            vec![
                StateDecl::new("Init").on("Go", |_, _| Ok(())).ignore("Hum"),
                StateDecl::new("Busy"),
            ],
        );
        Machine::new(MachineId(0), decl, None)
    }

    #[test]
    fn unnamed_machine_displays_kind() {
        assert_eq!(machine().display_name(), "M()");
        let named = Machine::new(
            MachineId(1),
            MachineDecl::new("M", vec![StateDecl::new("Init")]),
            Some("M1".to_string()),
        );
        assert_eq!(named.display_name(), "M1");
    }

    #[test]
    fn raised_event_wins_over_inbox() {
        let mut m = machine();
        m.try_deliver(Event::new("Go"));
        m.raise(Event::new("Urgent"));
        assert_eq!(&*m.dequeue().unwrap().name, "Urgent");
        assert_eq!(&*m.dequeue().unwrap().name, "Go");
        assert!(m.dequeue().is_none());
    }

    #[test]
    fn delivery_to_halted_machine_is_dropped() {
        let mut m = machine();
        m.halt();
        assert_eq!(m.try_deliver(Event::new("Go")), Delivery::Dropped);
        assert!(m.dequeue().is_none());
    }

    #[test]
    fn waiting_receive_takes_matching_event_directly() {
        let mut m = machine();
        assert!(m.begin_receive(&["Ack"]).is_none());
        assert_eq!(m.try_deliver(Event::new("Other")), Delivery::Enqueued);
        assert_eq!(m.try_deliver(Event::new("Ack")), Delivery::Direct);
        assert_eq!(&*m.take_received().unwrap().name, "Ack");
        // The non-matching event stayed in the inbox.
        assert_eq!(&*m.dequeue().unwrap().name, "Other");
    }

    #[test]
    fn begin_receive_prefers_pending_match() {
        let mut m = machine();
        m.try_deliver(Event::new("Ack"));
        let e = m.begin_receive(&["Ack"]).unwrap();
        assert_eq!(&*e.name, "Ack");
    }

    #[test]
    fn pop_without_push_is_rejected() {
        let mut m = machine();
        assert!(!m.pop_state());
        m.push_state(1);
        assert_eq!(&*m.current_state_name(), "Busy");
        assert!(m.pop_state());
        assert_eq!(&*m.current_state_name(), "Init");
    }

    #[test]
    fn reactions_resolve_in_current_state() {
        let mut m = machine();
        assert!(m.reaction("Go").is_some());
        assert!(m.is_ignored("Hum"));
        m.goto_state(1);
        assert!(m.reaction("Go").is_none());
        assert!(!m.is_ignored("Hum"));
    }
}
