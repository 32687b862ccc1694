//! Datagram read/write service.
//!
//! Writes: build a [`DatagramWriteMemo`] and hand it to [`DatagramService::send_datagram`].
//! At most one write is outstanding at a time; further writes FIFO-queue
//! and are dispatched as each prior one receives its terminal reply.
//!
//! Reads: the caller owns dispatch of [`DatagramReadMemo`]s to its
//! registered [`DatagramListener`]s (one should reply; if none does, fall
//! back to [`DatagramService::reply`] with `None`, which sends the
//! standard "not implemented" negative reply).

use std::collections::VecDeque;

use openlcb_core::{Message, Mti, NodeId};

/// Known datagram protocol types, identified by the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    LogRequest,
    LogReply,
    MemoryOperation,
    RemoteButton,
    Display,
    TrainControl,
    Unrecognized,
}

impl ProtocolId {
    pub fn from_first_byte(data: &[u8]) -> Self {
        match data.first() {
            None => ProtocolId::Unrecognized,
            Some(0x01) => ProtocolId::LogRequest,
            Some(0x02) => ProtocolId::LogReply,
            Some(0x20) => ProtocolId::MemoryOperation,
            Some(0x21) => ProtocolId::RemoteButton,
            Some(0x28) => ProtocolId::Display,
            Some(0x30) => ProtocolId::TrainControl,
            Some(_) => ProtocolId::Unrecognized,
        }
    }
}

/// A queued outbound datagram write. Equality is by destination and
/// content, matching how the reference implementation matches replies
/// back to their originating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramWriteMemo {
    pub dest_id: NodeId,
    pub data: Vec<u8>,
}

impl DatagramWriteMemo {
    pub fn new(dest_id: NodeId, data: Vec<u8>) -> Self {
        Self { dest_id, data }
    }
}

/// An inbound datagram awaiting a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramReadMemo {
    pub src_id: NodeId,
    pub data: Vec<u8>,
}

/// The reply a protocol handler wants sent for an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramReply {
    Positive(u8),
    Negative(u16),
}

/// A protocol handler that wants first refusal on inbound datagrams, e.g.
/// [`crate::memory::MemoryService`] for `ProtocolId::MemoryOperation`.
pub trait DatagramListener {
    /// Inspect `dg`. Return `Some` to claim and reply to it; `None` to let
    /// the next registered listener (or the default negative reply) take
    /// it.
    fn on_datagram(&mut self, dg: &DatagramReadMemo) -> Option<DatagramReply>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok { flags: u8 },
    Rejected { error_code: u16 },
}

/// Result of feeding a [`Message`] to [`DatagramService::process`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DatagramOutput {
    pub messages_to_send: Vec<Message>,
    pub write_completed: Option<(DatagramWriteMemo, WriteOutcome)>,
}

/// Tracks the single in-flight outbound datagram write and its FIFO
/// backlog, and answers inbound datagrams via caller-supplied listeners.
pub struct DatagramService {
    local_node_id: NodeId,
    quiesced: bool,
    current_outstanding: Option<DatagramWriteMemo>,
    pending_writes: VecDeque<DatagramWriteMemo>,
}

impl DatagramService {
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            quiesced: false,
            current_outstanding: None,
            pending_writes: VecDeque::new(),
        }
    }

    pub fn is_quiesced(&self) -> bool {
        self.quiesced
    }

    /// Queue a write. Returns the `Message` to transmit now if this is
    /// the only entry in the queue; otherwise the memo waits its turn.
    pub fn send_datagram(&mut self, memo: DatagramWriteMemo) -> Option<Message> {
        let should_dispatch_now = self.pending_writes.is_empty();
        self.pending_writes.push_back(memo);
        should_dispatch_now.then(|| self.dispatch_front())
    }

    fn dispatch_front(&mut self) -> Message {
        let memo = self
            .pending_writes
            .front()
            .cloned()
            .expect("dispatch_front called on an empty queue");
        let message = Message::addressed(Mti::Datagram, self.local_node_id, memo.dest_id, memo.data.clone());
        self.current_outstanding = Some(memo);
        message
    }

    /// Build the reply message for an inbound datagram, given what (if
    /// anything) a protocol handler decided.
    pub fn reply(&self, dg: &DatagramReadMemo, reply: Option<DatagramReply>) -> Message {
        match reply {
            Some(DatagramReply::Positive(flags)) => self.positive_reply(dg, flags),
            Some(DatagramReply::Negative(code)) => self.negative_reply(dg, code),
            // "not implemented, datagram type unknown" - permanent error
            None => self.negative_reply(dg, 0x1042),
        }
    }

    fn positive_reply(&self, dg: &DatagramReadMemo, flags: u8) -> Message {
        Message::addressed(Mti::DatagramReceivedOk, self.local_node_id, dg.src_id, vec![flags])
    }

    fn negative_reply(&self, dg: &DatagramReadMemo, err: u16) -> Message {
        Message::addressed(
            Mti::DatagramRejected,
            self.local_node_id,
            dg.src_id,
            vec![(err >> 8) as u8, err as u8],
        )
    }

    /// Process a non-`Datagram` message this service cares about:
    /// write acks/rejections, and link quiesce/restart. `Mti::Datagram`
    /// itself is the caller's job (dispatch to listeners, then
    /// [`Self::reply`]).
    pub fn process(&mut self, message: &Message) -> DatagramOutput {
        if !(message.is_global() || message.destination == Some(self.local_node_id)) {
            return DatagramOutput::default();
        }
        match message.mti {
            Mti::DatagramReceivedOk => self.handle_write_reply(message, true),
            Mti::DatagramRejected => self.handle_write_reply(message, false),
            Mti::LinkLayerQuiesce => {
                self.quiesced = true;
                DatagramOutput::default()
            }
            Mti::LinkLayerRestarted => self.handle_restart(),
            _ => DatagramOutput::default(),
        }
    }

    fn handle_write_reply(&mut self, message: &Message, ok: bool) -> DatagramOutput {
        let Some(pos) = self.pending_writes.iter().position(|m| m.dest_id == message.source) else {
            log::error!("did not match write memo to reply from {}", message.source);
            return DatagramOutput::default();
        };
        let memo = self.pending_writes.remove(pos).expect("position just verified");

        if self.current_outstanding.as_ref() != Some(&memo) {
            log::error!("outstanding and replied-to memos don't match on {} reply", if ok { "OK" } else { "rejected" });
        }
        self.current_outstanding = None;

        let outcome = if ok {
            WriteOutcome::Ok { flags: message.data.first().copied().unwrap_or(0) }
        } else {
            let hi = message.data.first().copied().unwrap_or(0) as u16;
            let lo = message.data.get(1).copied().unwrap_or(0) as u16;
            WriteOutcome::Rejected { error_code: (hi << 8) | lo }
        };

        let mut output = DatagramOutput {
            write_completed: Some((memo, outcome)),
            ..Default::default()
        };
        if !self.pending_writes.is_empty() {
            output.messages_to_send.push(self.dispatch_front());
        }
        output
    }

    fn handle_restart(&mut self) -> DatagramOutput {
        self.quiesced = false;
        if let Some(memo) = self.current_outstanding.clone() {
            log::info!("retrying datagram after restart");
            let message = Message::addressed(Mti::Datagram, self.local_node_id, memo.dest_id, memo.data);
            return DatagramOutput {
                messages_to_send: vec![message],
                ..Default::default()
            };
        }
        if !self.pending_writes.is_empty() {
            return DatagramOutput {
                messages_to_send: vec![self.dispatch_front()],
                ..Default::default()
            };
        }
        DatagramOutput::default()
    }
}
