//! Core session components.
//!
//! - **emulator**: the boundary to an emulator instance and the events it emits
//! - **session**: one emulator run, from construction to teardown
//! - **controller**: owns the current session, settings and drop overlay
//! - **scripted**: a backend that replays a boot sequence
//!
//! # Architecture
//!
//! ```text
//! SessionController
//! ├── SettingsStore (persisted settings)
//! └── Session
//!     ├── Emulator (own thread, events over mpsc)
//!     ├── EthernetProvider
//!     ├── ScreenGeometryManager
//!     └── EthernetPeerTracker
//! ```

pub mod emulator;
pub mod session;
pub mod controller;
pub mod scripted;

#[cfg(test)]
pub(crate) mod testing;
