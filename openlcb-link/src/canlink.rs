//! Link-layer formatting and unformatting for CAN-frame transports: alias
//! allocation and collision recovery, 29-bit header ⇄ [`Message`]
//! translation, and multi-frame segmentation/reassembly.
//!
//! This implementation tracks one static local node and a variable number
//! of remote nodes. Remote aliases are learned from traffic, never
//! allocated here.

use std::collections::HashMap;

use openlcb_core::{Message, Mti, NodeId};

use crate::alias::{create_alias12, increment_alias48};
use crate::wire::{header, CanFrame, ControlFrame};

/// Link-layer connection state, independent of any particular transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A special case of `Inhibited` where alias allocation hasn't started.
    Initial,
    Inhibited,
    Permitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AccumKey {
    mti: Mti,
    source: NodeId,
    dest: NodeId,
}

/// Outcome of feeding one inbound [`CanFrame`] to the link.
#[derive(Debug, Default)]
pub struct LinkEvent {
    /// Frames the caller must transmit, in order.
    pub frames_to_send: Vec<CanFrame>,
    /// An assembled message ready for upper layers, if this frame
    /// completed one.
    pub message: Option<Message>,
    /// Set when this frame triggered an alias collision: the link is back
    /// in `Inhibited` with `frames_to_send` holding a fresh CID/RID
    /// sequence. The caller must wait the standard allocation delay and
    /// then call [`CanLink::finish_alias_allocation`].
    pub collision: bool,
}

/// CAN link-layer state machine: one local node, N learned remote aliases.
pub struct CanLink {
    local_node_id: NodeId,
    local_alias_seed: u64,
    local_alias: u16,
    state: LinkState,
    alias_to_node: HashMap<u16, NodeId>,
    node_to_alias: HashMap<NodeId, u16>,
    accumulator: HashMap<AccumKey, Vec<u8>>,
    next_internal_node_id: u64,
}

impl CanLink {
    pub fn new(local_node_id: NodeId) -> Self {
        let seed = local_node_id.value();
        Self {
            local_node_id,
            local_alias_seed: seed,
            local_alias: create_alias12(seed),
            state: LinkState::Initial,
            alias_to_node: HashMap::new(),
            node_to_alias: HashMap::new(),
            accumulator: HashMap::new(),
            next_internal_node_id: 1,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Override the alias seed and re-derive the current alias from it.
    /// Only meaningful before [`Self::start_alias_allocation`] has run.
    pub fn set_alias_seed(&mut self, seed: u64) {
        self.local_alias_seed = seed & 0xFFFF_FFFF_FFFF;
        self.local_alias = create_alias12(self.local_alias_seed);
    }

    pub fn local_alias(&self) -> u16 {
        self.local_alias
    }

    /// The NodeID↔alias mapping this link has learned, including our own.
    pub fn alias_for(&self, node: NodeId) -> Option<u16> {
        self.node_to_alias.get(&node).copied()
    }

    pub fn node_for_alias(&self, alias: u16) -> Option<NodeId> {
        self.alias_to_node.get(&alias).copied()
    }

    /// Transport came up (or an alias collision occurred): begin the CID
    /// allocation sequence. Enters `Inhibited`. The caller must wait at
    /// least 200ms after transmitting these frames and then call
    /// [`Self::finish_alias_allocation`].
    pub fn start_alias_allocation(&mut self) -> Vec<CanFrame> {
        self.state = LinkState::Inhibited;
        let mut frames = Vec::with_capacity(5);
        for cid in [7u8, 6, 5, 4] {
            frames.push(CanFrame::from_alias_cid(cid, self.local_node_id, self.local_alias));
        }
        frames.push(CanFrame::from_control_alias_data(header::RID as u32, self.local_alias, Vec::new()));
        frames
    }

    /// Complete alias allocation: claim the alias, transmit AMD, enter
    /// `Permitted`, then transmit AME with no NodeID to solicit the
    /// network's full alias map.
    pub fn finish_alias_allocation(&mut self) -> Vec<CanFrame> {
        let amd = CanFrame::from_control_alias_data(
            header::AMD as u32,
            self.local_alias,
            self.local_node_id.to_array().to_vec(),
        );
        self.state = LinkState::Permitted;
        self.alias_to_node.insert(self.local_alias, self.local_node_id);
        self.node_to_alias.insert(self.local_node_id, self.local_alias);
        let ame = CanFrame::from_control_alias_data(header::AME as u32, self.local_alias, Vec::new());
        vec![amd, ame]
    }

    pub fn link_down(&mut self) -> Message {
        self.state = LinkState::Inhibited;
        Message::global(Mti::LinkLayerDown, NodeId::NONE, Vec::new())
    }

    pub fn link_restarted(&self) -> Message {
        Message::global(Mti::LinkLayerRestarted, NodeId::NONE, Vec::new())
    }

    /// Feed one received frame through the link layer.
    pub fn on_frame(&mut self, frame: &CanFrame) -> LinkEvent {
        match frame.control_frame() {
            ControlFrame::Cid => self.handle_cid(frame),
            ControlFrame::Rid => self.handle_collision_check(frame),
            ControlFrame::Amd => self.handle_amd(frame),
            ControlFrame::Ame => self.handle_ame(frame),
            ControlFrame::Amr => self.handle_amr(frame),
            ControlFrame::Data => self.handle_data(frame),
            ControlFrame::Unknown => {
                log::warn!("unexpected CAN header 0x{:08X}", frame.header);
                LinkEvent::default()
            }
        }
    }

    fn handle_cid(&self, frame: &CanFrame) -> LinkEvent {
        if frame.alias() != self.local_alias {
            return LinkEvent::default();
        }
        LinkEvent {
            frames_to_send: vec![CanFrame::from_control_alias_data(
                header::RID as u32,
                self.local_alias,
                Vec::new(),
            )],
            ..Default::default()
        }
    }

    fn handle_collision_check(&mut self, frame: &CanFrame) -> LinkEvent {
        if let Some(event) = self.check_and_handle_collision(frame) {
            return event;
        }
        LinkEvent::default()
    }

    fn handle_amd(&mut self, frame: &CanFrame) -> LinkEvent {
        if let Some(event) = self.check_and_handle_collision(frame) {
            return event;
        }
        let node_id = NodeId::from_bytes(&frame.data);
        let alias = frame.alias();
        self.alias_to_node.insert(alias, node_id);
        self.node_to_alias.insert(node_id, alias);
        LinkEvent::default()
    }

    fn handle_ame(&mut self, frame: &CanFrame) -> LinkEvent {
        if let Some(event) = self.check_and_handle_collision(frame) {
            return event;
        }
        if self.state != LinkState::Permitted {
            return LinkEvent::default();
        }
        let target = if frame.data.len() >= 6 {
            NodeId::from_bytes(&frame.data)
        } else {
            self.local_node_id
        };
        if target != self.local_node_id {
            return LinkEvent::default();
        }
        LinkEvent {
            frames_to_send: vec![CanFrame::from_control_alias_data(
                header::AMD as u32,
                self.local_alias,
                self.local_node_id.to_array().to_vec(),
            )],
            ..Default::default()
        }
    }

    fn handle_amr(&mut self, frame: &CanFrame) -> LinkEvent {
        if let Some(event) = self.check_and_handle_collision(frame) {
            return event;
        }
        let node_id = NodeId::from_bytes(&frame.data);
        let alias = frame.alias();
        self.alias_to_node.remove(&alias);
        self.node_to_alias.remove(&node_id);
        LinkEvent::default()
    }

    /// Per standard 6.2.5: any frame carrying our own alias while we're
    /// `Permitted` is a collision. Emit AMR for our alias, drop to
    /// `Inhibited`, advance the seed, and start a fresh allocation.
    fn check_and_handle_collision(&mut self, frame: &CanFrame) -> Option<LinkEvent> {
        if self.state != LinkState::Permitted || frame.alias() != self.local_alias {
            return None;
        }
        log::warn!(
            "alias collision on 0x{:03X}, restarting allocation",
            self.local_alias
        );
        let amr = CanFrame::from_control_alias_data(
            header::AMR as u32,
            self.local_alias,
            self.local_node_id.to_array().to_vec(),
        );
        self.local_alias_seed = increment_alias48(self.local_alias_seed);
        self.local_alias = create_alias12(self.local_alias_seed);
        let mut frames = vec![amr];
        frames.extend(self.start_alias_allocation());
        Some(LinkEvent {
            frames_to_send: frames,
            message: None,
            collision: true,
        })
    }

    fn resolve_source(&mut self, frame: &CanFrame, mti: Mti) -> NodeId {
        let alias = frame.alias();
        if let Some(&node) = self.alias_to_node.get(&alias) {
            return node;
        }
        let node_id = if mti == Mti::VerifiedNodeId {
            let node = NodeId::from_bytes(&frame.data);
            log::info!("Verified_NodeID from unknown source alias {alias:#x}, continuing with observed id {node}");
            node
        } else {
            let node = NodeId::new(self.next_internal_node_id);
            self.next_internal_node_id += 1;
            log::warn!("message from unknown source alias {alias:#x}, continuing with created id {node}");
            node
        };
        self.alias_to_node.insert(alias, node_id);
        self.node_to_alias.insert(node_id, alias);
        node_id
    }

    fn resolve_dest_alias(&mut self, dest_alias: u16) -> NodeId {
        if let Some(&node) = self.alias_to_node.get(&dest_alias) {
            return node;
        }
        let node_id = NodeId::new(self.next_internal_node_id);
        self.next_internal_node_id += 1;
        log::warn!("message to unknown dest alias {dest_alias:#x}, continuing with created id {node_id}");
        self.alias_to_node.insert(dest_alias, node_id);
        self.node_to_alias.insert(node_id, dest_alias);
        node_id
    }

    fn handle_data(&mut self, frame: &CanFrame) -> LinkEvent {
        if let Some(event) = self.check_and_handle_collision(frame) {
            return event;
        }
        let mti = can_header_to_mti(frame.header);
        let source = self.resolve_source(frame, mti);

        let frame_type = (frame.header >> header::FRAME_TYPE_SHIFT) & header::FRAME_TYPE_MASK;
        let is_datagram = (2..=5).contains(&frame_type);

        if is_datagram {
            return self.handle_datagram_data(frame, mti, source);
        }
        if mti.is_addressed() {
            return self.handle_addressed_data(frame, mti, source);
        }

        LinkEvent {
            message: Some(Message::global(mti, source, frame.data.clone())),
            ..Default::default()
        }
    }

    fn handle_datagram_data(&mut self, frame: &CanFrame, mti: Mti, source: NodeId) -> LinkEvent {
        let dest_alias = ((frame.header & 0x00FF_F000) >> 12) as u16;
        let dest = self.resolve_dest_alias(dest_alias);
        let dg_code = frame.header & 0x0F00_0000;
        let key = AccumKey { mti, source, dest };

        if dg_code == header::DATAGRAM_ONLY_FRAME || dg_code == header::DATAGRAM_FIRST_FRAME {
            self.accumulator.insert(key, Vec::new());
        } else if !self.accumulator.contains_key(&key) {
            log::warn!("dropping non-start datagram frame without accumulation started: {frame}");
            return LinkEvent::default();
        }

        if let Some(buf) = self.accumulator.get_mut(&key) {
            buf.extend_from_slice(&frame.data);
        }

        if dg_code == header::DATAGRAM_ONLY_FRAME || dg_code == header::DATAGRAM_LAST_FRAME {
            let data = self.accumulator.remove(&key).unwrap_or_default();
            return LinkEvent {
                message: Some(Message::addressed(mti, source, dest, data)),
                ..Default::default()
            };
        }
        LinkEvent::default()
    }

    fn handle_addressed_data(&mut self, frame: &CanFrame, mti: Mti, source: NodeId) -> LinkEvent {
        if frame.data.is_empty() {
            log::warn!("dropping addressed data frame with no address prefix: {frame}");
            return LinkEvent::default();
        }
        let flags = frame.data[0];
        let dest_alias =
            ((flags & 0x0F) as u16) << 8 | *frame.data.get(1).unwrap_or(&0) as u16;
        let dest = self.resolve_dest_alias(dest_alias);
        let key = AccumKey { mti, source, dest };

        let is_start = flags & 0x20 == 0;
        if is_start {
            self.accumulator.insert(key, Vec::new());
        } else if !self.accumulator.contains_key(&key) {
            log::warn!("dropping non-start frame without accumulation started: {frame}");
            return LinkEvent::default();
        }

        if let Some(buf) = self.accumulator.get_mut(&key) {
            if frame.data.len() > 2 {
                buf.extend_from_slice(&frame.data[2..]);
            }
        }

        let is_end = flags & 0x10 == 0;
        if is_end {
            let data = self.accumulator.remove(&key).unwrap_or_default();
            return LinkEvent {
                message: Some(Message::addressed(mti, source, dest, data)),
                ..Default::default()
            };
        }
        LinkEvent::default()
    }

    /// Segment an outbound message into one or more CAN frames.
    pub fn send_message(&self, msg: &Message) -> Vec<CanFrame> {
        if msg.mti == Mti::Datagram {
            return self.send_datagram(msg);
        }

        let mut can_header = header::MESSAGE_BASE | ((msg.mti.to_u16() as u32 & 0xFFF) << 12);
        match self.node_to_alias.get(&msg.source) {
            Some(&alias) => can_header |= alias as u32 & header::ALIAS_MASK,
            None => log::warn!("don't know alias for source {}", msg.source),
        }

        if let Some(dest) = msg.destination {
            let Some(&dest_alias) = self.node_to_alias.get(&dest) else {
                log::warn!("don't know alias for destination {dest}");
                return Vec::new();
            };
            segment_addressed(dest_alias, &msg.data)
                .into_iter()
                .map(|data| CanFrame::new(can_header, data).expect("chunk <= 6 bytes"))
                .collect()
        } else {
            vec![CanFrame::new(can_header, msg.data.clone()).expect("global payload <= 8 bytes")]
        }
    }

    fn send_datagram(&self, msg: &Message) -> Vec<CanFrame> {
        let mut header = header::OLCB_BASE;
        match self.node_to_alias.get(&msg.source) {
            Some(&alias) => header |= alias as u32 & header::ALIAS_MASK,
            None => log::warn!("don't know source alias on datagram send from {}", msg.source),
        }
        let Some(dest) = msg.destination else {
            log::warn!("datagram message has no destination");
            return Vec::new();
        };
        match self.node_to_alias.get(&dest) {
            Some(&alias) => header |= (alias as u32 & header::ALIAS_MASK) << 12,
            None => log::warn!("don't know dest alias on datagram send to {dest}"),
        }

        let segments = segment_datagram(&msg.data);
        let n = segments.len();
        segments
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                let tag = if n == 1 {
                    header::DATAGRAM_ONLY_FRAME
                } else if i == 0 {
                    header::DATAGRAM_FIRST_FRAME
                } else if i == n - 1 {
                    header::DATAGRAM_LAST_FRAME
                } else {
                    header::DATAGRAM_MIDDLE_FRAME
                };
                CanFrame::new(header | tag, data).expect("datagram chunk <= 8 bytes")
            })
            .collect()
    }
}

/// Decode the logical 16-bit MTI carried by a data frame's header.
fn can_header_to_mti(header_value: u32) -> Mti {
    let frame_type = (header_value >> header::FRAME_TYPE_SHIFT) & header::FRAME_TYPE_MASK;
    if frame_type == 1 {
        let can_mti = ((header_value >> header::VARIABLE_FIELD_SHIFT) & header::VARIABLE_FIELD_MASK) as u16;
        Mti::from_u16(can_mti)
    } else if (2..=5).contains(&frame_type) {
        Mti::Datagram
    } else {
        log::warn!("unhandled CAN frame type {frame_type} in header 0x{header_value:08X}");
        Mti::Unknown(0)
    }
}

/// Split datagram payload into ≤8-byte chunks. Zero-length data still
/// produces one empty frame.
fn segment_datagram(data: &[u8]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(8).map(|c| c.to_vec()).collect()
}

/// Split addressed non-datagram payload into ≤6-byte chunks, each prefixed
/// with `[flags | aliasHi, aliasLo]`. A lone frame has flag bits 0x30 clear;
/// otherwise the first frame has 0x10 set, middles have 0x30 set, and the
/// last has only 0x20 set.
fn segment_addressed(alias: u16, data: &[u8]) -> Vec<Vec<u8>> {
    let hi = ((alias >> 8) & 0xF) as u8;
    let lo = (alias & 0xFF) as u8;

    if data.is_empty() {
        return vec![vec![hi, lo]];
    }

    let chunks: Vec<&[u8]> = data.chunks(6).collect();
    if chunks.len() == 1 {
        let mut frame = vec![hi, lo];
        frame.extend_from_slice(chunks[0]);
        return vec![frame];
    }

    let last_index = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let flag = if i == 0 {
                hi | 0x10
            } else if i == last_index {
                hi | 0x20
            } else {
                hi | 0x30
            };
            let mut frame = vec![flag, lo];
            frame.extend_from_slice(chunk);
            frame
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate(link: &mut CanLink) {
        link.start_alias_allocation();
        link.finish_alias_allocation();
    }

    #[test]
    fn alias_allocation_reaches_permitted() {
        let mut link = CanLink::new(NodeId::new(0x0501_0101_0301));
        assert_eq!(link.state(), LinkState::Initial);
        let cid_frames = link.start_alias_allocation();
        assert_eq!(link.state(), LinkState::Inhibited);
        assert_eq!(cid_frames.len(), 5);
        let finish_frames = link.finish_alias_allocation();
        assert_eq!(link.state(), LinkState::Permitted);
        assert_eq!(finish_frames.len(), 2);
        assert_eq!(link.alias_for(NodeId::new(0x0501_0101_0301)), Some(link.local_alias()));
    }

    #[test]
    fn responds_to_cid_for_own_alias() {
        let mut link = CanLink::new(NodeId::new(1));
        allocate(&mut link);
        let alias = link.local_alias();
        let cid = CanFrame::from_alias_cid(7, NodeId::new(1), alias);
        let event = link.on_frame(&cid);
        assert_eq!(event.frames_to_send.len(), 1);
        assert_eq!(event.frames_to_send[0].control_frame(), ControlFrame::Rid);
    }

    #[test]
    fn detects_collision_and_restarts_allocation() {
        let mut link = CanLink::new(NodeId::new(1));
        allocate(&mut link);
        let alias = link.local_alias();
        let seed_before = link.local_alias_seed;

        let foreign_amd = CanFrame::from_control_alias_data(
            header::AMD as u32,
            alias,
            NodeId::new(2).to_array().to_vec(),
        );
        let event = link.on_frame(&foreign_amd);
        assert!(event.collision);
        assert_eq!(link.state(), LinkState::Inhibited);
        assert_ne!(link.local_alias_seed, seed_before);
        assert_ne!(link.local_alias(), alias);
        // AMR + fresh CID x4 + RID
        assert_eq!(event.frames_to_send.len(), 6);
    }

    #[test]
    fn learns_remote_amd_mapping() {
        let mut link = CanLink::new(NodeId::new(1));
        allocate(&mut link);
        let remote = NodeId::new(0xABCDEF);
        let amd = CanFrame::from_control_alias_data(header::AMD as u32, 0x222, remote.to_array().to_vec());
        let event = link.on_frame(&amd);
        assert!(event.frames_to_send.is_empty());
        assert_eq!(link.node_for_alias(0x222), Some(remote));
    }

    #[test]
    fn assembles_three_frame_datagram() {
        let mut link = CanLink::new(NodeId::new(1));
        allocate(&mut link);
        let local_alias = link.local_alias();
        let remote = NodeId::new(2);
        let remote_alias = 0x333u16;
        link.on_frame(&CanFrame::from_control_alias_data(
            header::AMD as u32,
            remote_alias,
            remote.to_array().to_vec(),
        ));

        // datagrams coming FROM remote TO us: source alias is remote's,
        // dest alias (bits 12-23) is ours.
        let dg_header_from_remote = |tag: u32| -> u32 {
            header::OLCB_BASE | tag | ((local_alias as u32) << 12) | (remote_alias as u32)
        };

        let first = CanFrame::new(dg_header_from_remote(header::DATAGRAM_FIRST_FRAME), vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let middle = CanFrame::new(dg_header_from_remote(header::DATAGRAM_MIDDLE_FRAME), vec![9, 10]).unwrap();
        let last = CanFrame::new(dg_header_from_remote(header::DATAGRAM_LAST_FRAME), vec![11, 12]).unwrap();

        assert!(link.on_frame(&first).message.is_none());
        assert!(link.on_frame(&middle).message.is_none());
        let event = link.on_frame(&last);
        let msg = event.message.expect("datagram should complete");
        assert_eq!(msg.mti, Mti::Datagram);
        assert_eq!(msg.source, remote);
        assert_eq!(msg.destination, Some(NodeId::new(1)));
        assert_eq!(msg.data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn segments_datagram_outbound_into_eight_byte_chunks() {
        let data: Vec<u8> = (0..20).collect();
        let segments = segment_datagram(&data);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), 8);
        assert_eq!(segments[1].len(), 8);
        assert_eq!(segments[2].len(), 4);
    }

    #[test]
    fn segments_addressed_outbound_into_six_byte_chunks_with_prefix() {
        let data: Vec<u8> = (0..14).collect();
        let segments = segment_addressed(0x123, &data);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0][0] & 0x30, 0x10);
        assert_eq!(segments[1][0] & 0x30, 0x30);
        assert_eq!(segments[2][0] & 0x30, 0x20);
    }

    #[test]
    fn global_message_round_trips_header() {
        let mut link = CanLink::new(NodeId::new(1));
        allocate(&mut link);
        let msg = Message::global(Mti::VerifyNodeIdNumberGlobal, NodeId::new(1), vec![]);
        let frames = link.send_message(&msg);
        assert_eq!(frames.len(), 1);
        assert_eq!(can_header_to_mti(frames[0].header), Mti::VerifyNodeIdNumberGlobal);
    }
}
