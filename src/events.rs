//! Graph change notifications
//!
//! Every graph mutation is announced on an [`EventBus`]. Delivery is
//! synchronous, in mutation order, on the mutating thread. The bus is a cheap
//! clonable handle so nodes owned by a graph can publish on the graph's bus.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;

use crate::nodes::attribute::AttrValue;
use crate::nodes::graph::{Edge, Preferences};
use crate::nodes::NodeId;

/// A change to the graph or one of its nodes
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodesAdded { ids: Vec<NodeId> },
    NodesRemoved { ids: Vec<NodeId> },
    EdgesAdded { edges: Vec<Edge> },
    EdgesRemoved { edges: Vec<Edge> },
    NodePositionChanged { id: NodeId, pos: Vec2 },
    NodeNameChanged { id: NodeId, new_name: String },
    AttributeUpdated { id: NodeId, name: String, value: AttrValue },
    /// The whole graph was replaced, e.g. by restoring a snapshot
    GraphUpdated,
    GraphAboutToBeSaved,
    GraphRead { preferences: Preferences },
}

/// Receiver of graph events
pub trait GraphListener {
    fn on_event(&mut self, event: &GraphEvent);
}

impl<F> GraphListener for F
where
    F: FnMut(&GraphEvent),
{
    fn on_event(&mut self, event: &GraphEvent) {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

#[derive(Default)]
struct Listeners {
    next_id: usize,
    /// A slot is empty while its listener is running
    entries: Vec<(ListenerId, Option<Box<dyn GraphListener>>)>,
}

/// Shared, single threaded event dispatcher
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl GraphListener + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Some(Box::new(listener))));
        id
    }

    /// Removes a listener. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            match inner.entries.iter().position(|(entry, _)| *entry == id) {
                Some(index) => inner.entries.remove(index),
                None => return false,
            }
        };
        drop(removed);
        true
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Delivers `event` to every listener in subscription order.
    ///
    /// Listeners may subscribe or unsubscribe from inside their callback.
    /// Listeners subscribed during delivery first hear the next event. Events
    /// emitted from inside a callback reach every listener except the ones
    /// currently running.
    pub fn emit(&self, event: GraphEvent) {
        log::trace!("emit {:?}", event);
        let ids: Vec<ListenerId> = self.inner.borrow().entries.iter().map(|(id, _)| *id).collect();

        for id in ids {
            let Some(mut listener) = self.take_listener(id) else {
                continue;
            };
            listener.on_event(&event);
            self.return_listener(id, listener);
        }
    }

    fn take_listener(&self, id: ListenerId) -> Option<Box<dyn GraphListener>> {
        let mut inner = self.inner.borrow_mut();
        inner
            .entries
            .iter_mut()
            .find(|(entry, _)| *entry == id)
            .and_then(|(_, slot)| slot.take())
    }

    /// Puts a listener back unless it unsubscribed while running
    fn return_listener(&self, id: ListenerId, listener: Box<dyn GraphListener>) {
        let mut inner = self.inner.borrow_mut();
        match inner.entries.iter_mut().find(|(entry, _)| *entry == id) {
            Some((_, slot)) => *slot = Some(listener),
            None => {
                drop(inner);
                drop(listener);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
