//! Peers - Liveness of the ethernet peers a provider reports

use std::time::{SystemTime, UNIX_EPOCH};

/// A peer is active if it was seen within this window
pub const ACTIVE_PEER_WINDOW_MS: u64 = 60_000;
/// Peers older than this show their age in the detail view
pub const STALE_PEER_AGE_MS: u64 = 30_000;

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A remote card on the emulated network
#[derive(Clone, Debug, PartialEq)]
pub struct EthernetPeer {
    pub mac_address: String,
    pub rtt_ms: f64,
    pub last_ping_time_ms: u64,
}

impl EthernetPeer {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ping_time_ms)
    }

    pub fn is_active(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) < ACTIVE_PEER_WINDOW_MS
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) > STALE_PEER_AGE_MS
    }

    /// `aa:bb:.. (RTT: 12ms)`, with the age appended for stale peers
    pub fn detail(&self, now_ms: u64) -> String {
        let age = if self.is_stale(now_ms) {
            format!(" {}s ago", (self.age_ms(now_ms) as f64 / 1000.0).round())
        } else {
            String::new()
        };
        format!("{} (RTT: {}ms{})", self.mac_address, self.rtt_ms.round(), age)
    }
}

/// Latest peer list from the provider.
///
/// The list is replaced wholesale on every update; expiry is up to the
/// provider.
#[derive(Debug, Default)]
pub struct EthernetPeerTracker {
    peers: Vec<EthernetPeer>,
}

impl EthernetPeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the peer set. Repeated addresses keep the later entry.
    pub fn replace(&mut self, peers: Vec<EthernetPeer>) {
        let mut unique: Vec<EthernetPeer> = Vec::with_capacity(peers.len());
        for peer in peers {
            match unique.iter_mut().find(|p| p.mac_address == peer.mac_address) {
                Some(existing) => *existing = peer,
                None => unique.push(peer),
            }
        }
        self.peers = unique;
    }

    pub fn peers(&self) -> &[EthernetPeer] {
        &self.peers
    }

    pub fn active_count(&self, now_ms: u64) -> usize {
        self.peers.iter().filter(|p| p.is_active(now_ms)).count()
    }

    /// Compact status line, e.g. `Ethernet: Zone lan (2 peers)`
    pub fn status_text(&self, description: &str, now_ms: u64) -> String {
        let mut text = format!("Ethernet: {}", description);
        match self.active_count(now_ms) {
            0 => {}
            1 => text.push_str(" (1 peer)"),
            n => text.push_str(&format!(" ({} peers)", n)),
        }
        text
    }

    /// One line per peer for the expanded view
    pub fn detail_lines(&self, now_ms: u64) -> Vec<String> {
        self.peers.iter().map(|p| p.detail(now_ms)).collect()
    }
}
