//! Emulator boundary
//!
//! The emulator itself runs on its own execution context. The session talks to
//! it through the [`Emulator`] trait and hears back only through
//! [`EmulatorEvent`]s sent over a channel.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::{DiskDescriptor, MachineDescriptor};
use crate::custom::CdromImage;
use crate::display::ScreenSize;
use crate::net::{EthernetPeer, EthernetProvider};
use crate::settings::EmulatorSettings;

/// Events the emulator reports back to the session
#[derive(Debug, Clone, PartialEq)]
pub enum EmulatorEvent {
    /// The guest changed its screen resolution
    ScreenSizeChanged { width: u32, height: u32 },
    /// All startup data is loaded and the guest is running
    FinishedLoading,
    /// Startup data loading progress, in chunks
    LoadingProgress { total: u32, left: u32 },
    /// A disk chunk started loading
    DiskChunkLoadStarted,
    /// A disk chunk finished loading
    DiskChunkLoadFinished,
    /// The provider's full peer list
    EthernetPeersChanged(Vec<EthernetPeer>),
}

/// Sending half of the event channel handed to the emulator
pub type EventSender = Sender<EmulatorEvent>;

/// Debugging switches passed through to the emulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub audio: bool,
    pub fallback: bool,
}

/// Handle of the surface the emulator draws into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTarget(pub String);

impl Default for RenderTarget {
    fn default() -> Self {
        RenderTarget("screen".to_string())
    }
}

/// A file dropped onto the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub name: String,
    pub contents: Arc<[u8]>,
}

impl DroppedFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Frozen configuration an emulator instance is constructed with
#[derive(Clone)]
pub struct EmulatorConfig {
    pub machine: MachineDescriptor,
    pub disks: Vec<DiskDescriptor>,
    pub cdroms: Vec<CdromImage>,
    pub screen_size: ScreenSize,
    pub render_target: RenderTarget,
    pub ethernet_provider: Option<Arc<dyn EthernetProvider>>,
    pub use_shared_memory: bool,
    pub debug: DebugFlags,
    /// Settings snapshot at construction time
    pub settings: EmulatorSettings,
}

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Failed to create emulator: {0}")]
    Create(String),

    #[error("Failed to start emulator: {0}")]
    Start(String),
}

/// A live emulator instance
pub trait Emulator {
    fn start(&mut self) -> Result<(), EmulatorError>;

    /// Stop the instance. Called once, on teardown.
    fn stop(&mut self);

    /// Copy a file into the running guest
    fn upload_file(&mut self, file: DroppedFile);

    /// Attach a disk image; it is picked up on the next restart
    fn upload_disk_image(&mut self, file: DroppedFile);

    /// Reboot the guest with the same configuration
    fn restart(&mut self);

    /// New settings snapshot from the session
    fn apply_settings(&mut self, settings: EmulatorSettings);
}

/// Builds emulator instances for sessions
pub trait EmulatorFactory {
    fn create(&self, config: EmulatorConfig, events: EventSender) -> Result<Box<dyn Emulator>, EmulatorError>;
}
