//! Local and remote node processors for the OpenLCB (LCC) stack.
//!
//! [`local::LocalNodeProcessor`] answers traffic directed at the node(s)
//! this application implements. [`remote::RemoteNodeStore`] tracks image
//! nodes for peers observed on the network and keeps their cached PIP,
//! SNIP, and event-produced/consumed state current.

pub mod local;
pub mod remote;
pub mod store;

pub use local::LocalNodeProcessor;
pub use remote::{RemoteNodeProcessor, RemoteNodeStore};
pub use store::NodeStore;
