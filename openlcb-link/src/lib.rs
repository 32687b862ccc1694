//! Transport-facing link layers for the OpenLCB (LCC) stack.
//!
//! [`canlink::CanLink`] turns 29-bit CAN frames into [`openlcb_core::Message`]s
//! and back, with alias allocation and collision recovery.
//! [`gridconnect`] and [`wire::CanFrame`] handle the ASCII/byte
//! representation of those frames on a serial or TCP-GridConnect
//! transport. [`tcplink`] is the alternative native-binary TCP link. Both
//! link layers are synchronous: callers drive them from whatever thread
//! reads the transport, per the single-reader-thread model described for
//! this stack.

pub mod alias;
pub mod canlink;
pub mod gridconnect;
pub mod tcplink;
pub mod wire;

pub use canlink::{CanLink, LinkEvent, LinkState};
pub use wire::{CanFrame, ControlFrame};

/// Construction parameters for a [`CanLink`].
#[derive(Debug, Clone, Copy)]
pub struct CanLinkConfig {
    pub local_node_id: openlcb_core::NodeId,
    /// Override the 48-bit alias seed instead of deriving it from
    /// `local_node_id`. Mainly useful for tests that need a deterministic
    /// alias, or for recovering a previously-negotiated alias after a
    /// process restart.
    pub alias_seed_override: Option<u64>,
}

impl CanLinkConfig {
    pub fn new(local_node_id: openlcb_core::NodeId) -> Self {
        Self {
            local_node_id,
            alias_seed_override: None,
        }
    }

    pub fn build(&self) -> CanLink {
        let mut link = CanLink::new(self.local_node_id);
        if let Some(seed) = self.alias_seed_override {
            link.set_alias_seed(seed);
        }
        link
    }
}

/// Construction parameters for a [`tcplink::TcpLinkDecoder`] plus the
/// gateway identity used when encoding outbound messages.
#[derive(Debug, Clone, Copy)]
pub struct TcpLinkConfig {
    pub local_node_id: openlcb_core::NodeId,
}
