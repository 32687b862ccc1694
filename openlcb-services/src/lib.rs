//! Datagram and memory-configuration services for the OpenLCB (LCC) stack.
//!
//! [`datagram::DatagramService`] owns outbound datagram write
//! serialization and builds reply messages for inbound ones, but does
//! not itself decide how to answer them — that's [`memory::MemoryService`]
//! (or any other [`datagram::DatagramListener`]) acting on datagrams the
//! caller routes to it.

pub mod datagram;
pub mod memory;

pub use datagram::{DatagramListener, DatagramOutput, DatagramReadMemo, DatagramReply, DatagramService, DatagramWriteMemo, ProtocolId};
pub use memory::{MemoryEvent, MemoryReadMemo, MemoryService, MemoryServiceError, MemoryWriteMemo, ReadOutcome, WriteOutcome};
