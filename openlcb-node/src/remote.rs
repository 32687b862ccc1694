//! Tracks image nodes representing physical peers seen on the network.
//!
//! Deliberately does not track memory (configuration, CDI) contents, only
//! lifecycle state, PIP, SNIP, and produced/consumed event IDs.

use openlcb_core::{EventId, Message, Mti, Node, NodeId, NodeState, PipSet};

use crate::store::NodeStore;

/// Updates one tracked remote node's cached state in response to
/// messages either from it or about it.
#[derive(Debug, Clone, Copy)]
pub struct RemoteNodeProcessor {
    local_node_id: NodeId,
}

impl RemoteNodeProcessor {
    pub fn new(local_node_id: NodeId) -> Self {
        Self { local_node_id }
    }

    /// Update `node`'s cached state for `message` and return any requests
    /// that should be sent out as a result (PIP/SNIP/event-identify probes
    /// for a freshly-seen node).
    pub fn process(&self, message: &Message, node: &mut Node) -> Vec<Message> {
        let from_node = message.source == node.id;
        let to_node = message.destination == Some(node.id);
        if !(message.mti.is_global() || from_node || to_node) {
            return Vec::new();
        }

        if from_node {
            node.state = NodeState::Initialized;
        }

        match message.mti {
            Mti::InitializationComplete | Mti::InitializationCompleteSimple if from_node => {
                node.state = NodeState::Initialized;
                node.pip_set = PipSet::EMPTY;
                node.snip = openlcb_core::Snip::default();
                Vec::new()
            }
            Mti::ProtocolSupportReply if from_node => {
                node.pip_set = PipSet::from_payload(&message.data);
                Vec::new()
            }
            Mti::LinkLayerUp | Mti::LinkLayerDown => {
                node.state = NodeState::Uninitialized;
                Vec::new()
            }
            Mti::SimpleNodeIdentInfoRequest if to_node => {
                node.snip.clear_for_refresh();
                Vec::new()
            }
            Mti::SimpleNodeIdentInfoReply if from_node => {
                if message.data.len() > 2 {
                    node.snip.add_data(&message.data);
                }
                Vec::new()
            }
            Mti::ProducerIdentifiedActive
            | Mti::ProducerIdentifiedInactive
            | Mti::ProducerIdentifiedUnknown
            | Mti::ProducerConsumerEventReport
                if from_node =>
            {
                node.events.produces(EventId::from_bytes(&message.data));
                Vec::new()
            }
            Mti::ConsumerIdentifiedActive | Mti::ConsumerIdentifiedInactive | Mti::ConsumerIdentifiedUnknown
                if from_node =>
            {
                node.events.consumes(EventId::from_bytes(&message.data));
                Vec::new()
            }
            Mti::NewNodeSeen if from_node => self.new_node_seen(node),
            _ => Vec::new(),
        }
    }

    fn new_node_seen(&self, node: &Node) -> Vec<Message> {
        vec![
            Message::addressed(Mti::ProtocolSupportInquiry, self.local_node_id, node.id, vec![]),
            Message::addressed(Mti::SimpleNodeIdentInfoRequest, self.local_node_id, node.id, vec![]),
            Message::addressed(Mti::IdentifyEventsAddressed, self.local_node_id, node.id, vec![]),
        ]
    }
}

/// Accumulates nodes seen on the network, skipping the local node and the
/// reserved all-zero NodeID.
pub struct RemoteNodeStore {
    local_node_id: NodeId,
    processor: RemoteNodeProcessor,
    store: NodeStore,
}

impl RemoteNodeStore {
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            processor: RemoteNodeProcessor::new(local_node_id),
            store: NodeStore::new(),
        }
    }

    pub fn is_present(&self, id: NodeId) -> bool {
        self.store.is_present(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.store.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.store.nodes()
    }

    fn should_track_as_new(&self, message: &Message) -> bool {
        let source = message.source;
        source != self.local_node_id && !source.is_none() && !self.store.is_present(source)
    }

    /// Feed a message from the link layer to every tracked node's
    /// processor, creating a new tracked node first if the source hasn't
    /// been seen before. Returns any requests the processor generated.
    pub fn process_message(&mut self, message: &Message) -> Vec<Message> {
        let mut outbound = Vec::new();

        if self.should_track_as_new(message) {
            let new_id = message.source;
            self.store.store(Node::new(new_id));
            let seen = Message::new(Mti::NewNodeSeen, new_id, None, Vec::new());
            if let Some(node) = self.store.get_mut(new_id) {
                outbound.extend(self.processor.process(&seen, node));
            }
        }

        for node in self.store.nodes_mut() {
            outbound.extend(self.processor.process(message, node));
        }
        outbound
    }
}
