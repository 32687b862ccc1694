//! Memory-configuration service, built on top of the datagram service.
//!
//! Reads and (per this implementation's resolution of the source's
//! incomplete write serialization) writes are each limited to one
//! request in flight at a time; further requests FIFO-queue per node
//! behind the first and are dispatched as each prior one completes.

use std::collections::VecDeque;

use openlcb_core::NodeId;

use crate::datagram::{DatagramReadMemo, DatagramReply, DatagramWriteMemo, ProtocolId};

const PROTOCOL_MEMORY_OPERATION: u8 = 0x20;

/// Errors returned by [`MemoryService`] request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryServiceError {
    #[error("a space-length request to {node_id} is already pending")]
    SpaceLengthAlreadyPending { node_id: NodeId },
}

/// A queued memory read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReadMemo {
    pub node_id: NodeId,
    pub size: u8,
    pub space: u8,
    pub address: u32,
}

/// A queued memory write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWriteMemo {
    pub node_id: NodeId,
    pub space: u8,
    pub address: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    Rejected { error_code: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    Rejected { error_code: u16 },
}

/// Application-visible events produced by [`MemoryService::on_datagram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEvent {
    ReadCompleted(MemoryReadMemo, ReadOutcome),
    WriteCompleted(MemoryWriteMemo, WriteOutcome),
    SpaceLength(Option<u32>),
}

/// Whether a space number needs the long form (explicit space byte) or
/// fits in the low two bits of the command byte.
fn space_decode(space: u8) -> (bool, u8) {
    if space >= 0xFD {
        (false, space & 0x03)
    } else {
        (true, space)
    }
}

fn address_bytes(address: u32) -> [u8; 4] {
    [
        (address >> 24) as u8,
        (address >> 16) as u8,
        (address >> 8) as u8,
        address as u8,
    ]
}

/// Converts a big-endian byte slice to an integer. Widths other than
/// 1/2/4/8 are not meaningful and simply treat every byte present as
/// contributing to the result.
pub fn array_to_int(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Converts an integer to a big-endian byte array of the given width
/// (1, 2, 4, or 8); any other width yields an empty array.
pub fn int_to_array(value: u64, length: usize) -> Vec<u8> {
    match length {
        1 | 2 | 4 | 8 => (0..length)
            .map(|i| (value >> (8 * (length - 1 - i))) as u8)
            .collect(),
        _ => Vec::new(),
    }
}

/// Decodes up to `length` bytes of `data` as ASCII, stopping at the
/// first zero byte if one appears first.
pub fn array_to_string(data: &[u8], length: usize) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len()).min(length);
    data[..end].iter().map(|&b| b as char).collect()
}

/// Encodes `value` as ASCII, truncated or zero-padded to exactly
/// `length` bytes.
pub fn string_to_array(value: &str, length: usize) -> Vec<u8> {
    let mut out: Vec<u8> = value.bytes().take(length).collect();
    out.resize(length, 0);
    out
}

struct PendingSpaceLength {
    node_id: NodeId,
}

pub struct MemoryService {
    read_memos: VecDeque<MemoryReadMemo>,
    write_memos: VecDeque<MemoryWriteMemo>,
    pending_space_length: Option<PendingSpaceLength>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            read_memos: VecDeque::new(),
            write_memos: VecDeque::new(),
            pending_space_length: None,
        }
    }

    fn read_command(memo: &MemoryReadMemo) -> Vec<u8> {
        let (long_form, flag) = space_decode(memo.space);
        let space_flag = if long_form { 0x40 } else { flag | 0x40 };
        let [a1, a2, a3, a4] = address_bytes(memo.address);
        let mut data = vec![PROTOCOL_MEMORY_OPERATION, space_flag, a1, a2, a3, a4];
        if long_form {
            data.push(memo.space);
        }
        data.push(memo.size);
        data
    }

    fn write_command(memo: &MemoryWriteMemo) -> Vec<u8> {
        let (long_form, flag) = space_decode(memo.space);
        let space_flag = if long_form { 0x00 } else { flag };
        let [a1, a2, a3, a4] = address_bytes(memo.address);
        let mut data = vec![PROTOCOL_MEMORY_OPERATION, space_flag, a1, a2, a3, a4];
        if long_form {
            data.push(memo.space);
        }
        data.extend_from_slice(&memo.data);
        data
    }

    /// Queue a read. Returns the datagram write memo to send now if this
    /// is the only entry in the queue.
    pub fn request_memory_read(&mut self, memo: MemoryReadMemo) -> Option<DatagramWriteMemo> {
        let should_dispatch_now = self.read_memos.is_empty();
        let node_id = memo.node_id;
        self.read_memos.push_back(memo);
        should_dispatch_now.then(|| {
            let data = Self::read_command(self.read_memos.front().expect("just pushed"));
            DatagramWriteMemo::new(node_id, data)
        })
    }

    /// Queue a write. Returns the datagram write memo to send now if this
    /// is the only entry in the queue.
    pub fn request_memory_write(&mut self, memo: MemoryWriteMemo) -> Option<DatagramWriteMemo> {
        let should_dispatch_now = self.write_memos.is_empty();
        let node_id = memo.node_id;
        self.write_memos.push_back(memo);
        should_dispatch_now.then(|| {
            let data = Self::write_command(self.write_memos.front().expect("just pushed"));
            DatagramWriteMemo::new(node_id, data)
        })
    }

    /// Request the length of a memory space from `node_id`. Overlapping
    /// requests are rejected rather than queued, matching the reference
    /// implementation's single-callback slot.
    pub fn request_space_length(&mut self, space: u8, node_id: NodeId) -> Result<DatagramWriteMemo, MemoryServiceError> {
        if let Some(pending) = &self.pending_space_length {
            return Err(MemoryServiceError::SpaceLengthAlreadyPending { node_id: pending.node_id });
        }
        self.pending_space_length = Some(PendingSpaceLength { node_id });
        Ok(DatagramWriteMemo::new(node_id, vec![PROTOCOL_MEMORY_OPERATION, 0x84, space]))
    }

    /// Inspect an inbound datagram. Returns the reply this service wants
    /// sent (claiming the datagram) together with any application event
    /// and the next queued request (if dispatching this reply freed up
    /// the head of a queue), or `None` if this datagram isn't ours.
    pub fn on_datagram(
        &mut self,
        dg: &DatagramReadMemo,
    ) -> Option<(DatagramReply, Option<MemoryEvent>, Option<DatagramWriteMemo>)> {
        if ProtocolId::from_first_byte(&dg.data) != ProtocolId::MemoryOperation {
            return None;
        }
        if dg.data.len() < 2 {
            log::error!("memory service datagram too short: {} bytes", dg.data.len());
            return Some((DatagramReply::Negative(0x1041), None, None));
        }

        let command = dg.data[1];
        let (event, next) = match command {
            0x50 | 0x51 | 0x52 | 0x53 | 0x58 | 0x59 | 0x5A | 0x5B => self.complete_read(dg, command),
            0x10 | 0x11 | 0x12 | 0x13 | 0x18 | 0x19 | 0x1A | 0x1B => self.complete_write(dg, command),
            0x86 | 0x87 => (self.complete_space_length(dg, command), None),
            other => {
                log::error!("did not expect memory reply of type {other:#04x}");
                (None, None)
            }
        };
        Some((DatagramReply::Positive(0x00), event, next))
    }

    fn complete_read(&mut self, dg: &DatagramReadMemo, command: u8) -> (Option<MemoryEvent>, Option<DatagramWriteMemo>) {
        let Some(pos) = self.read_memos.iter().position(|m| m.node_id == dg.src_id) else {
            return (None, None);
        };
        let memo = self.read_memos.remove(pos).expect("position just verified");

        let offset = if command == 0x50 || command == 0x58 { 7 } else { 6 };
        let next = self.read_memos.front().map(|next_memo| {
            DatagramWriteMemo::new(next_memo.node_id, Self::read_command(next_memo))
        });

        let outcome = if command & 0x08 == 0 {
            let data = dg.data.get(offset..).map(<[u8]>::to_vec).unwrap_or_default();
            ReadOutcome::Data(data)
        } else {
            ReadOutcome::Rejected { error_code: error_code_from(&dg.data, offset) }
        };
        (Some(MemoryEvent::ReadCompleted(memo, outcome)), next)
    }

    fn complete_write(&mut self, dg: &DatagramReadMemo, command: u8) -> (Option<MemoryEvent>, Option<DatagramWriteMemo>) {
        let Some(pos) = self.write_memos.iter().position(|m| m.node_id == dg.src_id) else {
            return (None, None);
        };
        let memo = self.write_memos.remove(pos).expect("position just verified");

        let next = self.write_memos.front().map(|next_memo| {
            DatagramWriteMemo::new(next_memo.node_id, Self::write_command(next_memo))
        });

        let outcome = if command & 0x08 == 0 {
            WriteOutcome::Ok
        } else {
            WriteOutcome::Rejected { error_code: error_code_from(&dg.data, 2) }
        };
        (Some(MemoryEvent::WriteCompleted(memo, outcome)), next)
    }

    fn complete_space_length(&mut self, dg: &DatagramReadMemo, command: u8) -> Option<MemoryEvent> {
        let Some(pending) = self.pending_space_length.take() else {
            log::error!("address space information reply received with no pending request");
            return None;
        };
        if pending.node_id != dg.src_id {
            log::error!("address space information reply from unexpected node");
            self.pending_space_length = Some(pending);
            return None;
        }
        if command == 0x87 {
            return Some(MemoryEvent::SpaceLength(None));
        }
        let length = (array_to_int(dg.data.get(3..7).unwrap_or_default()) as u32) & 0xFFFF_FFFF;
        Some(MemoryEvent::SpaceLength(Some(length)))
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

fn error_code_from(data: &[u8], offset: usize) -> u16 {
    let hi = data.get(offset).copied().unwrap_or(0) as u16;
    let lo = data.get(offset + 1).copied().unwrap_or(0) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u64) -> NodeId {
        NodeId::new(n)
    }

    #[test]
    fn first_read_dispatches_immediately_second_queues() {
        let mut svc = MemoryService::new();
        let a = MemoryReadMemo { node_id: node(1), size: 8, space: 0xFD, address: 0x100 };
        let b = MemoryReadMemo { node_id: node(1), size: 4, space: 0xFD, address: 0x200 };

        let dg_a = svc.request_memory_read(a.clone()).unwrap();
        assert_eq!(dg_a.data[0], PROTOCOL_MEMORY_OPERATION);
        assert_eq!(dg_a.data[1], 0x40 | 0x01); // short form, space 0xFD -> flag 1
        assert!(svc.request_memory_read(b).is_none());
    }

    #[test]
    fn read_reply_short_form_offset_is_six() {
        let mut svc = MemoryService::new();
        let memo = MemoryReadMemo { node_id: node(1), size: 2, space: 0xFD, address: 0 };
        svc.request_memory_read(memo.clone());

        let reply = DatagramReadMemo {
            src_id: node(1),
            data: vec![PROTOCOL_MEMORY_OPERATION, 0x51, 0, 0, 0, 0, 0xAB, 0xCD],
        };
        let (_, event, next) = svc.on_datagram(&reply).unwrap();
        assert!(next.is_none());
        match event.unwrap() {
            MemoryEvent::ReadCompleted(m, ReadOutcome::Data(data)) => {
                assert_eq!(m, memo);
                assert_eq!(data, vec![0xAB, 0xCD]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn read_reply_long_form_offset_is_seven() {
        let mut svc = MemoryService::new();
        let memo = MemoryReadMemo { node_id: node(1), size: 1, space: 0x00, address: 0 };
        svc.request_memory_read(memo);

        let reply = DatagramReadMemo {
            src_id: node(1),
            data: vec![PROTOCOL_MEMORY_OPERATION, 0x50, 0, 0, 0, 0, 0x00, 0x7F],
        };
        let (_, event, _) = svc.on_datagram(&reply).unwrap();
        match event.unwrap() {
            MemoryEvent::ReadCompleted(_, ReadOutcome::Data(data)) => assert_eq!(data, vec![0x7F]),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn write_is_serialized_and_advances_queue_on_reply() {
        let mut svc = MemoryService::new();
        let a = MemoryWriteMemo { node_id: node(1), space: 0xFD, address: 0, data: vec![1] };
        let b = MemoryWriteMemo { node_id: node(1), space: 0xFD, address: 4, data: vec![2] };

        assert!(svc.request_memory_write(a.clone()).is_some());
        assert!(svc.request_memory_write(b).is_none());

        let ok_reply = DatagramReadMemo { src_id: node(1), data: vec![PROTOCOL_MEMORY_OPERATION, 0x10] };
        let (_, event, next) = svc.on_datagram(&ok_reply).unwrap();
        assert_eq!(event.unwrap(), MemoryEvent::WriteCompleted(a, WriteOutcome::Ok));
        assert!(next.is_some());
    }

    #[test]
    fn space_length_present_and_absent() {
        let mut svc = MemoryService::new();
        svc.request_space_length(0xFE, node(2)).unwrap();

        let absent = DatagramReadMemo { src_id: node(2), data: vec![PROTOCOL_MEMORY_OPERATION, 0x87] };
        let (_, event, _) = svc.on_datagram(&absent).unwrap();
        assert_eq!(event.unwrap(), MemoryEvent::SpaceLength(None));

        svc.request_space_length(0xFE, node(2)).unwrap();
        let present = DatagramReadMemo {
            src_id: node(2),
            data: vec![PROTOCOL_MEMORY_OPERATION, 0x86, 0, 0x00, 0x00, 0x01, 0x00],
        };
        let (_, event, _) = svc.on_datagram(&present).unwrap();
        assert_eq!(event.unwrap(), MemoryEvent::SpaceLength(Some(256)));
    }

    #[test]
    fn overlapping_space_length_requests_are_rejected() {
        let mut svc = MemoryService::new();
        assert!(svc.request_space_length(0xFE, node(2)).is_ok());
        assert_eq!(
            svc.request_space_length(0xFE, node(3)),
            Err(MemoryServiceError::SpaceLengthAlreadyPending { node_id: node(2) })
        );
    }

    #[test]
    fn encoding_helpers_round_trip() {
        assert_eq!(array_to_int(&int_to_array(0x1234_5678, 4)), 0x1234_5678);
        assert_eq!(array_to_string(&string_to_array("hi", 5), 5), "hi");
        assert_eq!(string_to_array("hi", 5), vec![b'h', b'i', 0, 0, 0]);
    }

    #[test]
    fn non_memory_datagram_is_ignored() {
        let mut svc = MemoryService::new();
        let dg = DatagramReadMemo { src_id: node(1), data: vec![0x01, 0x00] };
        assert!(svc.on_datagram(&dg).is_none());
    }
}
