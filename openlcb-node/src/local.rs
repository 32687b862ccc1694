//! Processes messages directed at the node this application implements.
//!
//! This is a stateless processor: every piece of node-specific state
//! (identity, SNIP, PIP, lifecycle) lives in the [`openlcb_core::Node`]
//! passed into [`LocalNodeProcessor::process`], so one processor serves
//! any number of local nodes.

use openlcb_core::{Message, Mti, Node, NodeId, NodeState, PipSet};

/// Handles inbound traffic for a single local node and returns whatever
/// reply messages (zero or more) should be sent back out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalNodeProcessor;

impl LocalNodeProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Process `message` against `node`. `message` must already be known
    /// to be global or addressed to `node.id`; callers typically check
    /// this once before dispatching to every local node they host.
    pub fn process(&self, message: &Message, node: &mut Node) -> Vec<Message> {
        match message.mti {
            Mti::LinkLayerUp => self.link_up(node),
            Mti::LinkLayerDown => {
                node.state = NodeState::Uninitialized;
                Vec::new()
            }
            Mti::VerifyNodeIdNumberGlobal => self.verify_global(message, node),
            Mti::VerifyNodeIdNumberAddressed => vec![self.verified_node_id(message, node)],
            Mti::ProtocolSupportInquiry => vec![self.protocol_support_reply(message, node)],
            Mti::SimpleNodeIdentInfoRequest => vec![self.snip_reply(message, node)],
            Mti::IdentifyEventsAddressed => Vec::new(),
            Mti::ProtocolSupportReply | Mti::SimpleNodeIdentInfoReply => Vec::new(),
            Mti::TractionControlCommand | Mti::TractionControlReply => Vec::new(),
            Mti::Datagram | Mti::DatagramReceivedOk | Mti::DatagramRejected => Vec::new(),
            Mti::TerminateDueToError | Mti::OptionalInteractionRejected => {
                log::info!("received unexpected {message:?}");
                Vec::new()
            }
            other => self.unrecognized(other, message, node),
        }
    }

    fn link_up(&self, node: &mut Node) -> Vec<Message> {
        node.state = NodeState::Initialized;
        vec![Message::global(Mti::InitializationComplete, node.id, node.id.to_array().to_vec())]
    }

    fn verify_global(&self, message: &Message, node: &Node) -> Vec<Message> {
        let matches = message.data.is_empty() || NodeId::from_bytes(&message.data) == node.id;
        if !matches {
            return Vec::new();
        }
        vec![Message::addressed(Mti::VerifiedNodeId, node.id, message.source, node.id.to_array().to_vec())]
    }

    fn verified_node_id(&self, message: &Message, node: &Node) -> Message {
        Message::addressed(Mti::VerifiedNodeId, node.id, message.source, node.id.to_array().to_vec())
    }

    fn protocol_support_reply(&self, message: &Message, node: &Node) -> Message {
        let [p0, p1, p2, _] = PipSet::to_payload(node.pip_set);
        Message::addressed(Mti::ProtocolSupportReply, node.id, message.source, vec![p0, p1, p2, 0, 0, 0])
    }

    fn snip_reply(&self, message: &Message, node: &Node) -> Message {
        Message::addressed(Mti::SimpleNodeIdentInfoReply, node.id, message.source, node.snip.to_reply_bytes())
    }

    /// Any addressed MTI this processor doesn't otherwise handle gets a
    /// permanent-error `Optional_Interaction_Rejected`; unrecognized
    /// global messages are silently ignored.
    fn unrecognized(&self, mti: Mti, message: &Message, node: &Node) -> Vec<Message> {
        if !message.is_addressed() {
            return Vec::new();
        }
        let code = match mti {
            Mti::Unknown(v) => v,
            known => known.to_u16(),
        };
        log::info!("received unexpected {message:?}, sending Optional_Interaction_Rejected");
        vec![Message::addressed(
            Mti::OptionalInteractionRejected,
            node.id,
            message.source,
            vec![0x10, 0x43, (code >> 8) as u8, code as u8],
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(NodeId::new(0x0501_0101_0301))
    }

    #[test]
    fn link_up_sends_initialization_complete() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        let out = processor.process(&Message::global(Mti::LinkLayerUp, NodeId::NONE, vec![]), &mut n);
        assert_eq!(n.state, NodeState::Initialized);
        assert_eq!(out, vec![Message::global(Mti::InitializationComplete, n.id, n.id.to_array().to_vec())]);
    }

    #[test]
    fn verify_global_with_empty_payload_always_replies() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        let requester = NodeId::new(2);
        let msg = Message::global(Mti::VerifyNodeIdNumberGlobal, requester, vec![]);
        let out = processor.process(&msg, &mut n);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mti, Mti::VerifiedNodeId);
        assert_eq!(out[0].destination, Some(requester));
    }

    #[test]
    fn verify_global_with_mismatched_payload_is_silent() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        let msg = Message::global(Mti::VerifyNodeIdNumberGlobal, NodeId::new(2), NodeId::new(0xDEAD).to_array().to_vec());
        assert!(processor.process(&msg, &mut n).is_empty());
    }

    #[test]
    fn protocol_support_inquiry_packs_pip_bits_into_six_bytes() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        n.pip_set.insert(openlcb_core::Pip::DatagramProtocol);
        n.pip_set.insert(openlcb_core::Pip::MemoryConfigurationProtocol);
        let requester = NodeId::new(2);
        let msg = Message::addressed(Mti::ProtocolSupportInquiry, requester, n.id, vec![]);
        let out = processor.process(&msg, &mut n);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data.len(), 6);
        assert_eq!(out[0].data[3], 0);
        assert_eq!(out[0].data[4], 0);
        assert_eq!(out[0].data[5], 0);
    }

    #[test]
    fn unhandled_addressed_mti_gets_optional_interaction_rejected() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        let requester = NodeId::new(2);
        let msg = Message::addressed(Mti::Unknown(0x0999), requester, n.id, vec![]);
        let out = processor.process(&msg, &mut n);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mti, Mti::OptionalInteractionRejected);
        assert_eq!(out[0].data, vec![0x10, 0x43, 0x09, 0x99]);
    }

    #[test]
    fn unhandled_global_mti_is_silent() {
        let processor = LocalNodeProcessor::new();
        let mut n = node();
        let msg = Message::global(Mti::Unknown(0x0999), NodeId::new(2), vec![]);
        assert!(processor.process(&msg, &mut n).is_empty());
    }
}
