//! Session management
//!
//! A session is one run of the emulator for a single run configuration. It
//! owns the emulator instance and the ethernet provider, turns emulator events
//! into UI state, and tears everything down exactly once.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::emulator::{
    DroppedFile, Emulator, EmulatorConfig, EmulatorError, EmulatorEvent, EmulatorFactory, RenderTarget,
};
use crate::display::{ScreenGeometry, ScreenGeometryManager, ScreenSize};
use crate::ingest::{self, IngestOutcome};
use crate::net::{EthernetPeer, EthernetPeerTracker, EthernetProvider};
use crate::resolver::RunConfiguration;
use crate::settings::{EmulatorSettings, SettingsError};

/// How long the chunk busy indicator lingers after the last chunk load
pub const CHUNK_BUSY_CLEAR_DELAY: Duration = Duration::from_millis(200);

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Loading,
    Running,
    /// Terminal
    Stopped,
}

impl SessionState {
    /// An emulator instance may exist
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Loading | SessionState::Running)
    }
}

/// Startup data loading progress, in chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingProgress {
    pub total_chunks: u32,
    pub remaining_chunks: u32,
}

impl LoadingProgress {
    pub fn loaded_chunks(&self) -> u32 {
        self.total_chunks.saturating_sub(self.remaining_chunks)
    }
}

/// Changes the UI layer should pick up
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    LoadingProgress(LoadingProgress),
    ChunkBusyChanged(bool),
    ScreenResized(ScreenSize),
    FullscreenChanged { fullscreen: bool, scale: Option<f64> },
    /// Number of peers in the new list
    PeersChanged(usize),
    PendingRestartChanged(bool),
    SettingsChanged(EmulatorSettings),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session has been stopped")]
    Stopped,

    #[error("Session is not running (state: {0:?})")]
    NotRunning(SessionState),

    #[error(transparent)]
    Emulator(#[from] EmulatorError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// One emulator run
pub struct Session {
    /// Session ID
    id: u64,
    config: RunConfiguration,
    state: SessionState,
    progress: LoadingProgress,
    progress_reported: bool,
    chunk_busy: bool,
    /// Pending clear of `chunk_busy`
    chunk_busy_clear_at: Option<Instant>,
    pending_restart: bool,
    geometry: ScreenGeometryManager,
    peers: EthernetPeerTracker,
    emulator: Option<Box<dyn Emulator>>,
    ethernet_provider: Option<Arc<dyn EthernetProvider>>,
    /// Channel to receive emulator events
    events: Option<Receiver<EmulatorEvent>>,
    updates: Vec<SessionUpdate>,
}

impl Session {
    /// Create an idle session
    pub fn new(id: u64, config: RunConfiguration) -> Self {
        let geometry = ScreenGeometryManager::new(config.screen_size);
        Self {
            id,
            config,
            state: SessionState::Idle,
            progress: LoadingProgress::default(),
            progress_reported: false,
            chunk_busy: false,
            chunk_busy_clear_at: None,
            pending_restart: false,
            geometry,
            peers: EthernetPeerTracker::new(),
            emulator: None,
            ethernet_provider: None,
            events: None,
            updates: Vec::new(),
        }
    }

    /// Build the provider and the emulator instance and start it
    pub fn start(
        &mut self,
        factory: &dyn EmulatorFactory,
        render_target: RenderTarget,
        settings: EmulatorSettings,
    ) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Stopped => return Err(SessionError::Stopped),
            _ => return Err(SessionError::AlreadyStarted),
        }

        let machine = self.config.machine;
        info!(
            "Session {}: starting {} on {} ({})",
            self.id,
            self.config.boot_disk_name().unwrap_or("no disk"),
            machine.name,
            machine.emulator.name()
        );
        self.set_state(SessionState::Initializing);

        self.ethernet_provider = self.config.ethernet.as_ref().map(|selection| selection.build());
        if let Some(provider) = &self.ethernet_provider {
            info!("Ethernet: {} ({})", provider.description(), provider.mac_address());
        }

        let (tx, rx) = mpsc::channel::<EmulatorEvent>();
        self.events = Some(rx);

        let emulator_config = EmulatorConfig {
            machine,
            disks: self.config.disks.clone(),
            cdroms: self.config.cdroms.clone(),
            screen_size: self.geometry.size(),
            render_target,
            ethernet_provider: self.ethernet_provider.clone(),
            use_shared_memory: self.config.use_shared_memory,
            debug: self.config.debug,
            settings,
        };

        let mut emulator = match factory.create(emulator_config, tx) {
            Ok(emulator) => emulator,
            Err(e) => {
                warn!("Session {}: {}", self.id, e);
                self.stop();
                return Err(e.into());
            }
        };
        if let Err(e) = emulator.start() {
            warn!("Session {}: {}", self.id, e);
            emulator.stop();
            self.stop();
            return Err(e.into());
        }
        self.emulator = Some(emulator);
        Ok(())
    }

    /// Drain pending emulator events, then run due timers.
    ///
    /// Returns the number of events handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        // Collect first; handling needs `&mut self`
        let mut pending = Vec::new();
        let mut disconnected = false;
        if let Some(rx) = &self.events {
            loop {
                match rx.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            debug!("Session {}: emulator event channel closed", self.id);
            self.events = None;
        }

        let handled = pending.len();
        for event in pending {
            self.handle_event(event, now);
        }
        self.tick(now);
        handled
    }

    /// Apply one emulator event
    pub fn handle_event(&mut self, event: EmulatorEvent, now: Instant) {
        if !self.state.is_live() {
            debug!("Session {}: ignoring {:?} while {:?}", self.id, event, self.state);
            return;
        }

        match event {
            EmulatorEvent::ScreenSizeChanged { width, height } => {
                if self.geometry.resize(width, height) {
                    self.updates.push(SessionUpdate::ScreenResized(self.geometry.size()));
                }
            }
            EmulatorEvent::FinishedLoading => {
                if self.state != SessionState::Running {
                    info!("Session {}: finished loading", self.id);
                    self.set_state(SessionState::Running);
                }
            }
            EmulatorEvent::LoadingProgress { total, left } => {
                self.record_progress(total, left);
            }
            EmulatorEvent::DiskChunkLoadStarted => {
                self.chunk_busy_clear_at = None;
                self.set_chunk_busy(true);
            }
            EmulatorEvent::DiskChunkLoadFinished => {
                self.chunk_busy_clear_at = Some(now + CHUNK_BUSY_CLEAR_DELAY);
            }
            EmulatorEvent::EthernetPeersChanged(peers) => {
                self.replace_peers(peers);
            }
        }
    }

    /// Run timers that are due at `now`
    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.chunk_busy_clear_at {
            if now >= at {
                self.chunk_busy_clear_at = None;
                self.set_chunk_busy(false);
            }
        }
    }

    /// Tear the session down.
    ///
    /// Safe in any state and idempotent: stops the emulator, closes the
    /// ethernet provider and drops pending timers.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }

        if let Some(mut emulator) = self.emulator.take() {
            emulator.stop();
        }
        if let Some(provider) = self.ethernet_provider.take() {
            provider.close();
        }
        self.chunk_busy_clear_at = None;
        self.events = None;
        self.set_chunk_busy(false);
        self.set_state(SessionState::Stopped);
        info!("Session {}: stopped", self.id);
    }

    /// Restart the guest so queued disk images are picked up
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning(self.state));
        }
        if let Some(emulator) = self.emulator.as_mut() {
            info!("Session {}: restarting emulator", self.id);
            emulator.restart();
        }
        self.set_pending_restart(false);
        Ok(())
    }

    /// Hand dropped files to the emulator
    pub fn ingest(&mut self, files: Vec<DroppedFile>) -> IngestOutcome {
        let hot_mount = self.config.machine.emulator.handles_disk_images();
        let Some(emulator) = self.emulator.as_mut() else {
            debug!("Session {}: no emulator, ignoring {} dropped file(s)", self.id, files.len());
            return IngestOutcome::ignored();
        };

        let outcome = ingest::ingest(files, emulator.as_mut(), hot_mount);
        if outcome.needs_restart() {
            self.set_pending_restart(true);
        }
        outcome
    }

    /// Pass a new settings snapshot to the emulator
    pub fn apply_settings(&mut self, settings: EmulatorSettings) {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.apply_settings(settings);
        }
    }

    pub fn enter_fullscreen(&mut self, available: ScreenSize) -> Option<f64> {
        let scale = self.geometry.enter_fullscreen(available);
        self.updates.push(SessionUpdate::FullscreenChanged { fullscreen: true, scale });
        scale
    }

    pub fn exit_fullscreen(&mut self) {
        self.geometry.exit_fullscreen();
        self.updates.push(SessionUpdate::FullscreenChanged {
            fullscreen: false,
            scale: None,
        });
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress(&self) -> LoadingProgress {
        self.progress
    }

    pub fn is_chunk_busy(&self) -> bool {
        self.chunk_busy
    }

    /// A chunk busy clear is scheduled
    #[cfg(test)]
    pub fn has_pending_timer(&self) -> bool {
        self.chunk_busy_clear_at.is_some()
    }

    pub fn has_pending_restart(&self) -> bool {
        self.pending_restart
    }

    pub fn geometry(&self) -> ScreenGeometry {
        self.geometry.geometry()
    }

    pub fn geometry_manager(&self) -> &ScreenGeometryManager {
        &self.geometry
    }

    #[cfg(test)]
    pub fn ethernet_provider(&self) -> Option<&Arc<dyn EthernetProvider>> {
        self.ethernet_provider.as_ref()
    }

    #[cfg(test)]
    pub fn has_emulator(&self) -> bool {
        self.emulator.is_some()
    }

    /// Show the loading indicator on the screen frame
    pub fn loading_indicator(&self) -> bool {
        matches!(self.state, SessionState::Initializing | SessionState::Loading) || self.is_chunk_busy()
    }

    /// Progress line shown until the emulator is running
    pub fn loading_text(&self) -> Option<String> {
        match self.state {
            SessionState::Initializing | SessionState::Loading => Some(format!(
                "Loading data files… ({}/{})",
                self.progress.loaded_chunks(),
                self.progress.total_chunks
            )),
            _ => None,
        }
    }

    /// Ethernet status line, if the session has a provider
    pub fn ethernet_status(&self, now_ms: u64) -> Option<String> {
        let provider = self.ethernet_provider.as_ref()?;
        Some(self.peers.status_text(&provider.description(), now_ms))
    }

    /// Expanded ethernet details: local address, then one line per peer
    pub fn ethernet_details(&self, now_ms: u64) -> Option<Vec<String>> {
        let provider = self.ethernet_provider.as_ref()?;
        let mut lines = vec![format!("MAC Address: {}", provider.mac_address())];
        if !self.peers.peers().is_empty() {
            lines.push("Peers:".to_string());
            lines.extend(self.peers.detail_lines(now_ms));
        }
        Some(lines)
    }

    /// Take the updates queued since the last call
    pub fn take_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.updates)
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session {}: {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
            self.updates.push(SessionUpdate::StateChanged(state));
        }
    }

    fn set_chunk_busy(&mut self, busy: bool) {
        if self.chunk_busy != busy {
            self.chunk_busy = busy;
            self.updates.push(SessionUpdate::ChunkBusyChanged(busy));
        }
    }

    fn set_pending_restart(&mut self, pending: bool) {
        if self.pending_restart != pending {
            self.pending_restart = pending;
            self.updates.push(SessionUpdate::PendingRestartChanged(pending));
        }
    }

    fn record_progress(&mut self, total: u32, left: u32) {
        let mut remaining = left.min(total);
        if self.progress_reported {
            remaining = remaining.min(self.progress.remaining_chunks);
        }
        self.progress = LoadingProgress {
            total_chunks: total,
            remaining_chunks: remaining,
        };
        self.progress_reported = true;
        if self.state == SessionState::Initializing {
            self.set_state(SessionState::Loading);
        }
        self.updates.push(SessionUpdate::LoadingProgress(self.progress));
    }

    fn replace_peers(&mut self, peers: Vec<EthernetPeer>) {
        if self.ethernet_provider.is_none() {
            debug!("Session {}: peer update without a provider", self.id);
            return;
        }
        self.peers.replace(peers);
        self.updates.push(SessionUpdate::PeersChanged(self.peers.peers().len()));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
