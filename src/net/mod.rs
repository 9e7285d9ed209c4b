//! Emulated ethernet.
//!
//! - **provider**: the transport capability handed to the emulator, with a
//!   same-origin broadcast strategy and a named zone relay strategy
//! - **peers**: liveness of the peers a provider reports
//!
//! Packet transport itself lives behind the provider; this module only
//! selects, owns and describes it.

pub mod provider;
pub mod peers;

pub use provider::{EthernetProvider, EthernetSelection};
pub use peers::{EthernetPeer, EthernetPeerTracker};
