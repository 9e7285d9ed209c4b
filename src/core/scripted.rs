//! Scripted emulator backend
//!
//! Plays back a boot sequence on a worker thread: prefetch chunk loads with
//! progress, the guest's screen size, then finished loading. Used by the
//! command-line driver to exercise a session end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use super::emulator::{
    DroppedFile, Emulator, EmulatorConfig, EmulatorError, EmulatorEvent, EmulatorFactory, EventSender,
};
use crate::settings::EmulatorSettings;

/// Builds [`ScriptedEmulator`]s
pub struct ScriptedEmulatorFactory {
    /// Delay between chunk loads
    chunk_delay: Duration,
}

impl ScriptedEmulatorFactory {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

impl EmulatorFactory for ScriptedEmulatorFactory {
    fn create(&self, config: EmulatorConfig, events: EventSender) -> Result<Box<dyn Emulator>, EmulatorError> {
        if config.disks.is_empty() {
            return Err(EmulatorError::Create("no disks to boot from".to_string()));
        }
        Ok(Box::new(ScriptedEmulator::new(config, events, self.chunk_delay)))
    }
}

/// An emulator that replays a fixed boot sequence
pub struct ScriptedEmulator {
    config: EmulatorConfig,
    chunk_delay: Duration,
    /// Taken by the worker on start
    events: Option<EventSender>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Worker thread handle
    worker: Option<JoinHandle<()>>,
    /// Disk images attached since the last restart
    attached: Vec<String>,
}

impl ScriptedEmulator {
    fn new(config: EmulatorConfig, events: EventSender, chunk_delay: Duration) -> Self {
        Self {
            config,
            chunk_delay,
            events: Some(events),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            attached: Vec::new(),
        }
    }

    /// Chunk count for the boot sequence
    fn total_chunks(&self) -> u32 {
        let chunks: usize = self.config.disks.iter().map(|d| d.prefetch_chunks.len().max(1)).sum();
        u32::try_from(chunks).unwrap_or(u32::MAX)
    }
}

impl Emulator for ScriptedEmulator {
    fn start(&mut self) -> Result<(), EmulatorError> {
        let tx = self
            .events
            .take()
            .ok_or_else(|| EmulatorError::Start("already started".to_string()))?;

        let config = &self.config;
        info!(
            "Scripted {} ({} MB) booting {} disk(s), {} CD-ROM(s) into {}, shared memory: {}",
            config.machine.emulator.name(),
            config.machine.ram_size_mb,
            config.disks.len(),
            config.cdroms.len(),
            config.render_target.0,
            config.use_shared_memory
        );
        for disk in &config.disks {
            debug!("Disk {} from {}", disk.name, disk.base_url);
        }
        debug!(
            "Debug audio: {}, fallback: {}, swap Control and Command: {}",
            config.debug.audio, config.debug.fallback, config.settings.swap_control_and_command
        );

        let total = self.total_chunks();
        let delay = self.chunk_delay;
        let screen = self.config.screen_size;
        let has_ethernet = self.config.ethernet_provider.is_some();
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let worker = thread::spawn(move || {
            let send = |event: EmulatorEvent| {
                if tx.send(event).is_err() {
                    running.store(false, Ordering::SeqCst);
                }
            };

            send(EmulatorEvent::LoadingProgress { total, left: total });
            for loaded in 1..=total {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                send(EmulatorEvent::DiskChunkLoadStarted);
                thread::sleep(delay);
                send(EmulatorEvent::DiskChunkLoadFinished);
                send(EmulatorEvent::LoadingProgress {
                    total,
                    left: total - loaded,
                });
            }

            if !running.load(Ordering::SeqCst) {
                return;
            }
            send(EmulatorEvent::ScreenSizeChanged {
                width: screen.width,
                height: screen.height,
            });
            send(EmulatorEvent::FinishedLoading);
            if has_ethernet {
                // Nobody else on the network yet
                send(EmulatorEvent::EthernetPeersChanged(Vec::new()));
            }
        });

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        debug!("Scripted emulator stopped");
    }

    fn upload_file(&mut self, file: DroppedFile) {
        info!("Guest received {} ({} bytes)", file.name, file.contents.len());
    }

    fn upload_disk_image(&mut self, file: DroppedFile) {
        info!("Disk image {} attached, mounts on restart", file.name);
        self.attached.push(file.name);
    }

    fn restart(&mut self) {
        info!("Restarting guest with {} new disk image(s)", self.attached.len());
        self.attached.clear();
    }

    fn apply_settings(&mut self, settings: EmulatorSettings) {
        debug!(
            "Swap Control and Command: {}",
            settings.swap_control_and_command
        );
        self.config.settings = settings;
    }
}

impl Drop for ScriptedEmulator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    use crate::catalog::DiskCatalog;
    use crate::core::emulator::RenderTarget;
    use crate::core::session::{Session, SessionState};
    use crate::display::ScreenSize;
    use crate::resolver::{resolve, Location, PlatformCapabilities};

    fn run_config(host: &str) -> crate::resolver::RunConfiguration {
        let platform = PlatformCapabilities {
            shared_memory: true,
            viewport: ScreenSize::new(1440, 900),
        };
        resolve(&Location::new(host, ""), &platform, &DiskCatalog::builtin())
    }

    #[test]
    fn test_boot_sequence_reaches_running() {
        let factory = ScriptedEmulatorFactory::new(Duration::from_millis(0));
        let mut session = Session::new(1, run_config("macos8.app"));
        session
            .start(&factory, RenderTarget::default(), EmulatorSettings::default())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.state() != SessionState::Running && Instant::now() < deadline {
            session.pump(Instant::now());
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.progress().remaining_chunks, 0);
        // 1 system chunk + 5 library chunks
        assert_eq!(session.progress().total_chunks, 6);
        session.stop();
    }

    #[test]
    fn test_stop_joins_worker() {
        let (tx, rx) = mpsc::channel();
        let factory = ScriptedEmulatorFactory::new(Duration::from_millis(20));
        let config = EmulatorConfig {
            machine: crate::catalog::QUADRA_650,
            disks: vec![crate::catalog::DiskDescriptor::library()],
            cdroms: Vec::new(),
            screen_size: ScreenSize::new(800, 600),
            render_target: RenderTarget::default(),
            ethernet_provider: None,
            use_shared_memory: false,
            debug: Default::default(),
            settings: EmulatorSettings::default(),
        };
        let mut emulator = factory.create(config, tx).unwrap();
        emulator.start().unwrap();
        emulator.stop();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(!events.contains(&EmulatorEvent::FinishedLoading));
    }

    #[test]
    fn test_no_disks_fails_to_create() {
        let (tx, _rx) = mpsc::channel();
        let config = EmulatorConfig {
            machine: crate::catalog::QUADRA_650,
            disks: Vec::new(),
            cdroms: Vec::new(),
            screen_size: ScreenSize::new(800, 600),
            render_target: RenderTarget::default(),
            ethernet_provider: None,
            use_shared_memory: false,
            debug: Default::default(),
            settings: EmulatorSettings::default(),
        };
        let factory = ScriptedEmulatorFactory::new(Duration::from_millis(0));
        assert!(matches!(factory.create(config, tx), Err(EmulatorError::Create(_))));
    }
}
