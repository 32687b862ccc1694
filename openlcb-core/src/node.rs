use std::collections::HashSet;

use crate::event_id::EventId;
use crate::node_id::NodeId;
use crate::pip::PipSet;
use crate::snip::Snip;

/// Lifecycle state of a tracked node, local or remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initialized,
}

/// Produced/consumed event IDs a node has announced.
///
/// Deliberately does not track anything about event *routing*: only which
/// IDs a node produces or consumes, matching `spec.md`'s Non-goal of
/// "event routing beyond recording produced/consumed event IDs".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalEventStore {
    produced: HashSet<EventId>,
    consumed: HashSet<EventId>,
}

impl LocalEventStore {
    pub fn produces(&mut self, event: EventId) {
        self.produced.insert(event);
    }

    pub fn consumes(&mut self, event: EventId) {
        self.consumed.insert(event);
    }

    pub fn produced(&self) -> impl Iterator<Item = &EventId> {
        self.produced.iter()
    }

    pub fn consumed(&self) -> impl Iterator<Item = &EventId> {
        self.consumed.iter()
    }
}

/// A network node: either the local node this stack implements, or an
/// image of a remote node learned from observed traffic.
///
/// Equality and hashing are defined by [`NodeId`] alone: two `Node`s with
/// the same id are the same node even if their cached SNIP/PIP data
/// currently disagrees (e.g. mid-refresh).
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub snip: Snip,
    pub pip_set: PipSet,
    pub state: NodeState,
    pub events: LocalEventStore,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            snip: Snip::default(),
            pip_set: PipSet::EMPTY,
            state: NodeState::Uninitialized,
            events: LocalEventStore::default(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
