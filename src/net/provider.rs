//! Ethernet providers
//!
//! A provider is selected while resolving the run configuration and built when
//! the session starts. The session owns it and closes it exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

/// Transport capability for the emulated ethernet card
pub trait EthernetProvider: Send + Sync {
    /// Human readable description for the status line
    fn description(&self) -> String;

    /// Hardware address of the local card
    fn mac_address(&self) -> String;

    /// Release the underlying channel
    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

/// Which provider strategy a run uses
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EthernetSelection {
    /// Same-origin broadcast between tabs of one browser
    Broadcast,
    /// Relay through a named zone
    ZoneRelay { zone: String },
}

impl EthernetSelection {
    /// Construct the provider for this selection
    pub fn build(&self) -> Arc<dyn EthernetProvider> {
        match self {
            EthernetSelection::Broadcast => Arc::new(BroadcastChannelProvider::new()),
            EthernetSelection::ZoneRelay { zone } => Arc::new(ZoneRelayProvider::new(zone)),
        }
    }
}

/// Random locally administered unicast MAC address
pub fn generate_mac_address() -> String {
    let mut bytes: [u8; 6] = rand::thread_rng().gen();
    // Locally administered, unicast
    bytes[0] = (bytes[0] | 0x02) & 0xFE;
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Broadcast-style provider for peers on the same origin
pub struct BroadcastChannelProvider {
    mac_address: String,
    closed: AtomicBool,
}

impl BroadcastChannelProvider {
    pub fn new() -> Self {
        let mac_address = generate_mac_address();
        debug!("BroadcastChannel ethernet provider {}", mac_address);
        Self {
            mac_address,
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for BroadcastChannelProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EthernetProvider for BroadcastChannelProvider {
    fn description(&self) -> String {
        "BroadcastChannel".to_string()
    }

    fn mac_address(&self) -> String {
        self.mac_address.clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closed BroadcastChannel ethernet provider");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provider that relays traffic through a named zone
pub struct ZoneRelayProvider {
    zone: String,
    mac_address: String,
    closed: AtomicBool,
}

impl ZoneRelayProvider {
    pub fn new(zone: &str) -> Self {
        let mac_address = generate_mac_address();
        debug!("Zone relay ethernet provider {} for zone {}", mac_address, zone);
        Self {
            zone: zone.to_string(),
            mac_address,
            closed: AtomicBool::new(false),
        }
    }

    /// Relay endpoint path; the channel is only opened on first use
    pub fn endpoint_path(&self) -> String {
        let zone: String = url::form_urlencoded::byte_serialize(self.zone.as_bytes()).collect();
        format!("/zone/{}/websocket", zone)
    }
}

impl EthernetProvider for ZoneRelayProvider {
    fn description(&self) -> String {
        format!("Zone {}", self.zone)
    }

    fn mac_address(&self) -> String {
        self.mac_address.clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closed zone relay ethernet provider ({})", self.endpoint_path());
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
