//! Value types for the OpenLCB (LCC) stack: node and event identifiers, the
//! MTI table, assembled messages, and the SNIP/PIP record types.
//!
//! This crate knows nothing about CAN frames, TCP streams, or GridConnect
//! encoding (see `openlcb-link`), and nothing about datagram or memory
//! service state machines (see `openlcb-services`). It's the vocabulary the
//! rest of the workspace shares.

pub mod event_id;
pub mod mdns;
pub mod message;
pub mod mti;
pub mod node;
pub mod node_id;
pub mod pip;
pub mod snip;

pub use event_id::EventId;
pub use message::Message;
pub use mti::Mti;
pub use node::{LocalEventStore, Node, NodeState};
pub use node_id::NodeId;
pub use pip::{Pip, PipSet};
pub use snip::Snip;
