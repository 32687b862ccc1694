//! Link-layer formatting for native TCP links: assembles message parts,
//! but (unlike the CAN link) never needs to split outbound ones — a TCP
//! stream has no 8-byte frame limit.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use openlcb_core::{Message, Mti, NodeId};

const HEADER_LEN: usize = 2 + 3 + 6 + 6; // flags, length, gateway id, timestamp
const MESSAGE_FLAG: u16 = 0x8000;
const PART_MASK: u16 = 0x00C0;
const PART_COMPLETE: u16 = 0x0000;
const PART_FIRST: u16 = 0x0040;
const PART_LAST: u16 = 0x0080;
const PART_MIDDLE: u16 = 0x00C0;

/// A single TCP-protocol part header, already separated from its payload.
struct PartHeader {
    flags: u16,
    gateway: NodeId,
}

/// Incremental decoder for the OpenLCB-over-TCP wire protocol.
///
/// Message parts are grouped per gateway NodeID; encountering a "first"
/// part while an assembly for that key is already live discards the old
/// one with a warning, matching the reference implementation.
#[derive(Default)]
pub struct TcpLinkDecoder {
    buffer: Vec<u8>,
    parts: HashMap<NodeId, Vec<u8>>,
}

impl TcpLinkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-received bytes and drain every complete [`Message`] now
    /// assembled. Link-control parts (the `0x8000` bit clear) are logged
    /// and dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            if self.buffer.len() < HEADER_LEN {
                return out;
            }
            let flags = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
            let length =
                ((self.buffer[2] as usize) << 16) | ((self.buffer[3] as usize) << 8) | self.buffer[4] as usize;
            let total = 5 + length;
            if self.buffer.len() < total {
                return out;
            }

            let gateway = NodeId::from_bytes(&self.buffer[5..11]);
            let payload = self.buffer[17..total].to_vec();

            if flags & MESSAGE_FLAG == MESSAGE_FLAG {
                if let Some(msg) = self.accumulate(PartHeader { flags, gateway }, payload) {
                    out.push(msg);
                }
            } else {
                log::info!("link-control message with flags {flags:#06X} length {length}, ignoring");
            }

            self.buffer.drain(..total);
        }
    }

    fn accumulate(&mut self, header: PartHeader, payload: Vec<u8>) -> Option<Message> {
        let part = header.flags & PART_MASK;
        if part == PART_COMPLETE {
            return Some(decode_message(&payload));
        }

        if part == PART_FIRST {
            if self.parts.contains_key(&header.gateway) {
                log::warn!("found a first part from {} while already accumulating", header.gateway);
            }
            self.parts.insert(header.gateway, Vec::new());
        }
        match self.parts.get_mut(&header.gateway) {
            Some(buf) => buf.extend_from_slice(&payload),
            None => {
                log::warn!("dropping {:?} part from {} with no live accumulation", part, header.gateway);
                return None;
            }
        }

        if part == PART_LAST {
            let data = self.parts.remove(&header.gateway)?;
            return Some(decode_message(&data));
        }
        None
    }
}

fn decode_message(bytes: &[u8]) -> Message {
    let mti = Mti::from_u16(u16::from_be_bytes([bytes[0], bytes[1]]));
    let source = NodeId::from_bytes(&bytes[2..8]);
    if mti.is_addressed() {
        let dest = NodeId::from_bytes(&bytes[8..14]);
        Message::addressed(mti, source, dest, bytes[14..].to_vec())
    } else {
        Message::global(mti, source, bytes[8..].to_vec())
    }
}

/// Encode one outbound [`Message`] as a complete (non-split) TCP-protocol
/// part from `local_node_id`'s gateway.
pub fn encode_message(local_node_id: NodeId, msg: &Message) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&msg.mti.to_u16().to_be_bytes());
    body.extend_from_slice(&msg.source.to_array());
    if let Some(dest) = msg.destination {
        body.extend_from_slice(&dest.to_array());
    }
    body.extend_from_slice(&msg.data);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MESSAGE_FLAG.to_be_bytes());

    let content_len = 6 /* gateway */ + 6 /* timestamp */ + body.len();
    out.push(((content_len >> 16) & 0xFF) as u8);
    out.push(((content_len >> 8) & 0xFF) as u8);
    out.push((content_len & 0xFF) as u8);

    out.extend_from_slice(&local_node_id.to_array());
    out.extend_from_slice(&timestamp_millis_48().to_be_bytes()[2..]);
    out.extend_from_slice(&body);
    out
}

fn timestamp_millis_48() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    millis & 0xFFFF_FFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_global_message() {
        let local = NodeId::new(1);
        let msg = Message::global(Mti::VerifyNodeIdNumberGlobal, NodeId::new(2), vec![1, 2, 3]);
        let bytes = encode_message(local, &msg);

        let mut decoder = TcpLinkDecoder::new();
        let decoded = decoder.push(&bytes);
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn round_trips_addressed_message() {
        let local = NodeId::new(1);
        let msg = Message::addressed(
            Mti::VerifyNodeIdNumberAddressed,
            NodeId::new(2),
            NodeId::new(3),
            vec![0xAA],
        );
        let bytes = encode_message(local, &msg);
        let mut decoder = TcpLinkDecoder::new();
        assert_eq!(decoder.push(&bytes), vec![msg]);
    }

    #[test]
    fn assembles_first_middle_last_parts() {
        let local = NodeId::new(1);
        let full = Message::global(Mti::SimpleNodeIdentInfoReply, NodeId::new(2), vec![0; 20]);
        let mut bytes = encode_message(local, &full);
        // rewrite flags to "first" and split the body across three parts
        let mti_src_len = 17; // header length before payload starts
        let gateway = bytes[5..11].to_vec();
        let timestamp = bytes[11..17].to_vec();
        let body = bytes.split_off(mti_src_len);

        let build_part = |flags: u16, payload: &[u8]| -> Vec<u8> {
            let content_len = 6 + 6 + payload.len();
            let mut out = Vec::new();
            out.extend_from_slice(&flags.to_be_bytes());
            out.push(((content_len >> 16) & 0xFF) as u8);
            out.push(((content_len >> 8) & 0xFF) as u8);
            out.push((content_len & 0xFF) as u8);
            out.extend_from_slice(&gateway);
            out.extend_from_slice(&timestamp);
            out.extend_from_slice(payload);
            out
        };

        let mut decoder = TcpLinkDecoder::new();
        assert!(decoder.push(&build_part(MESSAGE_FLAG | PART_FIRST, &body[..5])).is_empty());
        assert!(decoder.push(&build_part(MESSAGE_FLAG | PART_MIDDLE, &body[5..10])).is_empty());
        let decoded = decoder.push(&build_part(MESSAGE_FLAG | PART_LAST, &body[10..]));
        assert_eq!(decoded, vec![full]);
    }
}
