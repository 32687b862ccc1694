/// Message Type Indicator: the 16-bit code classifying an OpenLCB message.
///
/// Bit `0x0008` marks an addressed message, `0x0004` marks an event-ID
/// payload, and `0x0C00` carries priority. `Unknown` preserves the raw
/// 16-bit code that didn't match a known MTI, so a caller (the local node
/// processor) can still echo it back in an `Optional_Interaction_Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mti {
    InitializationComplete,
    InitializationCompleteSimple,
    VerifyNodeIdNumberAddressed,
    VerifyNodeIdNumberGlobal,
    VerifiedNodeId,
    VerifiedNodeIdSimple,
    OptionalInteractionRejected,
    TerminateDueToError,

    ProtocolSupportInquiry,
    ProtocolSupportReply,

    IdentifyConsumer,
    ConsumerRangeIdentified,
    ConsumerIdentifiedUnknown,
    ConsumerIdentifiedActive,
    ConsumerIdentifiedInactive,
    IdentifyProducer,
    ProducerRangeIdentified,
    ProducerIdentifiedUnknown,
    ProducerIdentifiedActive,
    ProducerIdentifiedInactive,
    IdentifyEventsAddressed,
    IdentifyEventsGlobal,
    LearnEvent,
    ProducerConsumerEventReport,

    SimpleNodeIdentInfoRequest,
    SimpleNodeIdentInfoReply,

    RemoteButtonRequest,
    RemoteButtonReply,

    TractionControlCommand,
    TractionControlReply,

    Datagram,
    DatagramReceivedOk,
    DatagramRejected,

    /// Link came up and is in the Permitted state. Internal signalling,
    /// never seen on the wire; treated as global.
    LinkLayerUp,
    /// Link is about to be torn down for a restart; datagram service uses
    /// this to stop sending while the transport drains.
    LinkLayerQuiesce,
    /// Link came back up without a change of node identity.
    LinkLayerRestarted,
    /// Link entered the Inhibited state.
    LinkLayerDown,

    /// Alias resolution produced a previously-unseen remote node. Internal
    /// signalling, addressed to the new node.
    NewNodeSeen,

    /// An MTI code this implementation doesn't recognize. The original
    /// 16-bit value is preserved for diagnostics and for echoing back in
    /// an `Optional_Interaction_Rejected` payload.
    Unknown(u16),
}

impl Mti {
    /// Decode the 16-bit wire value of a data-frame MTI field.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0100 => Mti::InitializationComplete,
            0x0101 => Mti::InitializationCompleteSimple,
            0x0488 => Mti::VerifyNodeIdNumberAddressed,
            0x0490 => Mti::VerifyNodeIdNumberGlobal,
            0x0170 => Mti::VerifiedNodeId,
            0x0171 => Mti::VerifiedNodeIdSimple,
            0x0068 => Mti::OptionalInteractionRejected,
            0x00A8 => Mti::TerminateDueToError,
            0x0828 => Mti::ProtocolSupportInquiry,
            0x0668 => Mti::ProtocolSupportReply,
            0x08F4 => Mti::IdentifyConsumer,
            0x04A4 => Mti::ConsumerRangeIdentified,
            0x04C7 => Mti::ConsumerIdentifiedUnknown,
            0x04C4 => Mti::ConsumerIdentifiedActive,
            0x04C5 => Mti::ConsumerIdentifiedInactive,
            0x0914 => Mti::IdentifyProducer,
            0x0524 => Mti::ProducerRangeIdentified,
            0x0547 => Mti::ProducerIdentifiedUnknown,
            0x0544 => Mti::ProducerIdentifiedActive,
            0x0545 => Mti::ProducerIdentifiedInactive,
            0x0968 => Mti::IdentifyEventsAddressed,
            0x0970 => Mti::IdentifyEventsGlobal,
            0x0594 => Mti::LearnEvent,
            0x05B4 => Mti::ProducerConsumerEventReport,
            0x0DE8 => Mti::SimpleNodeIdentInfoRequest,
            0x0A08 => Mti::SimpleNodeIdentInfoReply,
            0x0948 => Mti::RemoteButtonRequest,
            0x0549 => Mti::RemoteButtonReply,
            0x05EB => Mti::TractionControlCommand,
            0x01E9 => Mti::TractionControlReply,
            0x1C48 => Mti::Datagram,
            0x0A28 => Mti::DatagramReceivedOk,
            0x0A48 => Mti::DatagramRejected,
            other => Mti::Unknown(other),
        }
    }

    /// Encode back to the 16-bit wire value. Internal signalling variants
    /// (`LinkLayer*`, `NewNodeSeen`) have no wire representation and panic
    /// if encoded; they never reach `CanLink::send_message`.
    pub fn to_u16(self) -> u16 {
        match self {
            Mti::InitializationComplete => 0x0100,
            Mti::InitializationCompleteSimple => 0x0101,
            Mti::VerifyNodeIdNumberAddressed => 0x0488,
            Mti::VerifyNodeIdNumberGlobal => 0x0490,
            Mti::VerifiedNodeId => 0x0170,
            Mti::VerifiedNodeIdSimple => 0x0171,
            Mti::OptionalInteractionRejected => 0x0068,
            Mti::TerminateDueToError => 0x00A8,
            Mti::ProtocolSupportInquiry => 0x0828,
            Mti::ProtocolSupportReply => 0x0668,
            Mti::IdentifyConsumer => 0x08F4,
            Mti::ConsumerRangeIdentified => 0x04A4,
            Mti::ConsumerIdentifiedUnknown => 0x04C7,
            Mti::ConsumerIdentifiedActive => 0x04C4,
            Mti::ConsumerIdentifiedInactive => 0x04C5,
            Mti::IdentifyProducer => 0x0914,
            Mti::ProducerRangeIdentified => 0x0524,
            Mti::ProducerIdentifiedUnknown => 0x0547,
            Mti::ProducerIdentifiedActive => 0x0544,
            Mti::ProducerIdentifiedInactive => 0x0545,
            Mti::IdentifyEventsAddressed => 0x0968,
            Mti::IdentifyEventsGlobal => 0x0970,
            Mti::LearnEvent => 0x0594,
            Mti::ProducerConsumerEventReport => 0x05B4,
            Mti::SimpleNodeIdentInfoRequest => 0x0DE8,
            Mti::SimpleNodeIdentInfoReply => 0x0A08,
            Mti::RemoteButtonRequest => 0x0948,
            Mti::RemoteButtonReply => 0x0549,
            Mti::TractionControlCommand => 0x05EB,
            Mti::TractionControlReply => 0x01E9,
            Mti::Datagram => 0x1C48,
            Mti::DatagramReceivedOk => 0x0A28,
            Mti::DatagramRejected => 0x0A48,
            Mti::Unknown(v) => v,
            Mti::LinkLayerUp
            | Mti::LinkLayerQuiesce
            | Mti::LinkLayerRestarted
            | Mti::LinkLayerDown
            | Mti::NewNodeSeen => {
                panic!("{self:?} is internal signalling and has no wire form")
            }
        }
    }

    /// `0x0008` bit: message carries a destination NodeID.
    pub fn is_addressed(self) -> bool {
        match self {
            Mti::LinkLayerUp
            | Mti::LinkLayerQuiesce
            | Mti::LinkLayerRestarted
            | Mti::LinkLayerDown => false,
            Mti::NewNodeSeen => true,
            other => other.to_u16_checked() & 0x0008 != 0,
        }
    }

    /// `0x0004` bit: message carries an EventID payload.
    pub fn has_event_id(self) -> bool {
        self.to_u16_checked() & 0x0004 != 0
    }

    /// Two-bit priority field, bits `0x0C00`.
    pub fn priority(self) -> u8 {
        ((self.to_u16_checked() & 0x0C00) >> 10) as u8
    }

    pub fn is_global(self) -> bool {
        !self.is_addressed()
    }

    /// Like `to_u16`, but safe for internal signalling MTIs with no real
    /// wire form (used only for bit inspection, never for transmission).
    fn to_u16_checked(self) -> u16 {
        match self {
            Mti::LinkLayerUp
            | Mti::LinkLayerQuiesce
            | Mti::LinkLayerRestarted
            | Mti::LinkLayerDown
            | Mti::NewNodeSeen => 0,
            other => other.to_u16(),
        }
    }
}
