//! Session controller - Owns the current session and everything that outlives it

use std::time::Instant;

use tracing::{debug, info, warn};

#[cfg(test)]
use super::emulator::EmulatorEvent;
use super::emulator::{DroppedFile, EmulatorFactory, RenderTarget};
use super::session::{Session, SessionError, SessionState, SessionUpdate};
use crate::display::ScreenSize;
use crate::ingest::{DragHover, IngestOutcome};
use crate::resolver::RunConfiguration;
use crate::settings::{EmulatorSettings, SettingsStore};

/// Session controller - runs one session at a time
pub struct SessionController {
    /// Builds emulator instances
    factory: Box<dyn EmulatorFactory>,
    /// Persisted settings storage
    store: Box<dyn SettingsStore>,
    /// Authoritative settings, snapshotted into each session
    settings: EmulatorSettings,
    /// Surface new emulators draw into
    render_target: RenderTarget,
    /// Current session
    session: Option<Session>,
    /// Next session ID
    next_session_id: u64,
    /// Drop overlay
    drag: DragHover,
    updates: Vec<SessionUpdate>,
}

impl SessionController {
    /// Create a controller, loading persisted settings from `store`
    pub fn new(factory: Box<dyn EmulatorFactory>, store: Box<dyn SettingsStore>) -> Self {
        let settings = store.load();
        debug!("Loaded settings: {:?}", settings);
        Self {
            factory,
            store,
            settings,
            render_target: RenderTarget::default(),
            session: None,
            next_session_id: 1,
            drag: DragHover::default(),
            updates: Vec::new(),
        }
    }

    /// Start the first session
    pub fn start(&mut self, config: RunConfiguration) -> Result<(), SessionError> {
        if self.session.as_ref().is_some_and(|s| s.state() != SessionState::Stopped) {
            return Err(SessionError::AlreadyStarted);
        }
        self.start_session(config)
    }

    /// Tear down the current session and start a new one from `config`.
    ///
    /// The old emulator is stopped before the new one is created.
    pub fn reconfigure(&mut self, config: RunConfiguration) -> Result<(), SessionError> {
        info!("Reconfiguring session");
        self.stop();
        self.start_session(config)
    }

    /// Stop the current session, if any
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        self.collect_session_updates();
        self.drag.reset();
    }

    pub fn restart(&mut self) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.restart(),
            None => Err(SessionError::NotRunning(SessionState::Idle)),
        }
    }

    /// Drain emulator events and run due timers
    pub fn pump(&mut self, now: Instant) -> usize {
        match self.session.as_mut() {
            Some(session) => session.pump(now),
            None => 0,
        }
    }

    #[cfg(test)]
    pub fn handle_event(&mut self, event: EmulatorEvent, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.handle_event(event, now);
        }
    }

    /// Files dropped onto the screen
    pub fn drop_files(&mut self, files: Vec<DroppedFile>) -> IngestOutcome {
        self.drag.reset();
        if files.is_empty() {
            return IngestOutcome::default();
        }
        match self.session.as_mut() {
            Some(session) => session.ingest(files),
            None => {
                debug!("No session, ignoring {} dropped file(s)", files.len());
                IngestOutcome::ignored()
            }
        }
    }

    pub fn drag_enter(&mut self) {
        self.drag.enter();
    }

    pub fn drag_leave(&mut self) {
        self.drag.leave();
    }

    /// Show the "drop files here" overlay
    pub fn drop_overlay_visible(&self) -> bool {
        self.drag.is_active()
    }

    pub fn settings(&self) -> &EmulatorSettings {
        &self.settings
    }

    /// Persist new settings and pass them to the running emulator.
    ///
    /// Nothing changes if the store fails.
    pub fn update_settings(&mut self, settings: EmulatorSettings) -> Result<(), SessionError> {
        if settings == self.settings {
            return Ok(());
        }
        self.store.save(&settings)?;
        info!("Settings updated: {:?}", settings);
        self.settings = settings;
        self.updates.push(SessionUpdate::SettingsChanged(self.settings.clone()));
        if let Some(session) = self.session.as_mut() {
            session.apply_settings(self.settings.clone());
        }
        Ok(())
    }

    pub fn toggle_swap_control_and_command(&mut self) -> Result<(), SessionError> {
        let settings = EmulatorSettings {
            swap_control_and_command: !self.settings.swap_control_and_command,
        };
        self.update_settings(settings)
    }

    pub fn enter_fullscreen(&mut self, available: ScreenSize) -> Option<f64> {
        self.session.as_mut().and_then(|s| s.enter_fullscreen(available))
    }

    pub fn exit_fullscreen(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.exit_fullscreen();
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current session state, Idle before the first start
    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(SessionState::Idle, |s| s.state())
    }

    #[cfg(test)]
    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    /// Take the updates queued since the last call
    pub fn take_updates(&mut self) -> Vec<SessionUpdate> {
        self.collect_session_updates();
        std::mem::take(&mut self.updates)
    }

    fn start_session(&mut self, config: RunConfiguration) -> Result<(), SessionError> {
        // Flush and drop the previous session before building a new emulator
        self.collect_session_updates();
        self.session = None;

        let id = self.next_session_id;
        self.next_session_id += 1;

        let mut session = Session::new(id, config);
        let result = session.start(self.factory.as_ref(), self.render_target.clone(), self.settings.clone());
        if let Err(e) = &result {
            warn!("Session {} failed to start: {}", id, e);
        }
        self.session = Some(session);
        result
    }

    fn collect_session_updates(&mut self) {
        if let Some(session) = self.session.as_mut() {
            self.updates.extend(session.take_updates());
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DiskCatalog, MAC_PLUS};
    use crate::core::testing::{Call, RecordingFactory, SharedRecorder};
    use crate::resolver::{resolve, Location, PlatformCapabilities};
    use crate::custom::RunDef;
    use crate::settings::MemorySettingsStore;

    fn config(host: &str, search: &str) -> RunConfiguration {
        let platform = PlatformCapabilities {
            shared_memory: true,
            viewport: ScreenSize::new(1440, 900),
        };
        resolve(&Location::new(host, search), &platform, &DiskCatalog::builtin())
    }

    fn controller_with(store: MemorySettingsStore) -> (SessionController, SharedRecorder) {
        let (factory, recorder) = RecordingFactory::new();
        (SessionController::new(Box::new(factory), Box::new(store)), recorder)
    }

    fn controller() -> (SessionController, SharedRecorder) {
        controller_with(MemorySettingsStore::new())
    }

    #[test]
    fn test_start_and_stop() {
        let (mut controller, recorder) = controller();
        assert_eq!(controller.state(), SessionState::Idle);

        controller.start(config("system7.app", "")).unwrap();
        assert_eq!(controller.state(), SessionState::Initializing);
        assert!(matches!(
            controller.start(config("system7.app", "")),
            Err(SessionError::AlreadyStarted)
        ));

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(recorder.borrow().count(&Call::Create), 1);
        assert_eq!(recorder.borrow().count(&Call::Stop), 1);
    }

    #[test]
    fn test_stop_before_start() {
        let (mut controller, recorder) = controller();
        controller.stop();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(recorder.borrow().calls.is_empty());
    }

    #[test]
    fn test_reconfigure_tears_down_first() {
        let (mut controller, recorder) = controller();
        controller.start(config("lan.system7.app", "")).unwrap();
        let old_provider = controller.session().unwrap().ethernet_provider().cloned().unwrap();

        controller.reconfigure(config("macos8.app", "")).unwrap();
        assert!(old_provider.is_closed());
        assert_eq!(controller.session().unwrap().config().boot_disk_name(), Some("Mac OS 8.1"));
        assert!(controller.session().unwrap().ethernet_provider().is_none());

        let calls = recorder.borrow().calls.clone();
        assert_eq!(
            calls,
            vec![
                (0, Call::Create),
                (0, Call::Start),
                (0, Call::Stop),
                (1, Call::Create),
                (1, Call::Start),
            ]
        );
    }

    #[test]
    fn test_reconfigure_into_custom_run() {
        let (mut controller, recorder) = controller();
        let resolved = config("lan.system7.app", "");
        controller.start(resolved.clone()).unwrap();

        let catalog = DiskCatalog::builtin();
        let def = RunDef::from_names(&catalog, Some("Mac Plus"), &["System 6.0.8".to_string()], &[]).unwrap();
        let platform = PlatformCapabilities {
            shared_memory: false,
            viewport: ScreenSize::new(1440, 900),
        };
        let custom = def.to_run_configuration(&platform, resolved.ethernet.clone()).unwrap();
        controller.reconfigure(custom).unwrap();

        let recorder = recorder.borrow();
        assert_eq!(recorder.configs.len(), 2);
        let emulator = &recorder.configs[1];
        assert_eq!(emulator.machine, MAC_PLUS);
        assert_eq!(emulator.screen_size, ScreenSize::new(512, 342));
        assert!(!emulator.use_shared_memory);
        let disks: Vec<&str> = emulator.disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(disks, vec!["System 6.0.8", "Infinite HD"]);
        assert_eq!(
            controller.session().unwrap().ethernet_status(0).as_deref(),
            Some("Ethernet: Zone lan")
        );
    }

    #[test]
    fn test_drag_leave_hides_overlay() {
        let (mut controller, _recorder) = controller();
        controller.drag_enter();
        controller.drag_enter();
        controller.drag_leave();
        assert!(controller.drop_overlay_visible());
        controller.drag_leave();
        assert!(!controller.drop_overlay_visible());
    }

    #[test]
    fn test_late_events_from_old_instance_are_dropped() {
        let (mut controller, recorder) = controller();
        controller.start(config("system7.app", "")).unwrap();
        let old_sender = recorder.borrow().senders[0].clone();
        controller.reconfigure(config("system7.app", "")).unwrap();

        // The old receiver is gone with the old session
        assert!(old_sender.send(EmulatorEvent::FinishedLoading).is_err());
        assert_eq!(controller.pump(Instant::now()), 0);
        assert_eq!(controller.state(), SessionState::Initializing);
    }

    #[test]
    fn test_restart_without_session() {
        let (mut controller, _recorder) = controller();
        assert!(matches!(
            controller.restart(),
            Err(SessionError::NotRunning(SessionState::Idle))
        ));
    }

    #[test]
    fn test_drop_flow() {
        let (mut controller, recorder) = controller();
        assert!(controller.drop_files(vec![DroppedFile::new("a.dsk", vec![1])]).ignored);

        controller.start(config("system7.app", "")).unwrap();
        controller.handle_event(EmulatorEvent::FinishedLoading, Instant::now());
        controller.drag_enter();
        controller.drag_enter();
        assert!(controller.drop_overlay_visible());

        let outcome = controller.drop_files(vec![
            DroppedFile::new("ReadMe", b"hi".to_vec()),
            DroppedFile::new("Disk.img", vec![0u8; 8]),
        ]);
        assert!(!controller.drop_overlay_visible());
        assert!(outcome.needs_restart());
        assert!(controller.session().unwrap().has_pending_restart());

        controller.restart().unwrap();
        assert!(!controller.session().unwrap().has_pending_restart());
        assert_eq!(recorder.borrow().count(&Call::Restart), 1);

        let updates = controller.take_updates();
        assert!(updates.contains(&SessionUpdate::PendingRestartChanged(true)));
        assert!(updates.contains(&SessionUpdate::PendingRestartChanged(false)));
    }

    #[test]
    fn test_empty_drop_is_noop() {
        let (mut controller, recorder) = controller();
        controller.start(config("system7.app", "")).unwrap();
        assert_eq!(controller.drop_files(Vec::new()), IngestOutcome::default());
        assert_eq!(recorder.borrow().calls.len(), 2);
    }

    #[test]
    fn test_new_session_clears_pending_restart() {
        let (mut controller, _recorder) = controller();
        controller.start(config("system7.app", "")).unwrap();
        controller.drop_files(vec![DroppedFile::new("Disk.img", vec![0u8; 8])]);
        assert!(controller.session().unwrap().has_pending_restart());

        controller.reconfigure(config("system7.app", "")).unwrap();
        assert!(!controller.session().unwrap().has_pending_restart());
    }

    #[test]
    fn test_settings_loaded_and_snapshotted() {
        let stored = EmulatorSettings {
            swap_control_and_command: true,
        };
        let (mut controller, recorder) = controller_with(MemorySettingsStore::with(stored.clone()));
        assert_eq!(controller.settings(), &stored);

        controller.start(config("system7.app", "")).unwrap();
        assert_eq!(recorder.borrow().configs[0].settings, stored);
    }

    #[test]
    fn test_update_settings_persists_and_applies() {
        let (mut controller, recorder) = controller();
        controller.start(config("system7.app", "")).unwrap();

        controller.toggle_swap_control_and_command().unwrap();
        let expected = EmulatorSettings {
            swap_control_and_command: true,
        };
        assert_eq!(controller.settings(), &expected);
        assert_eq!(controller.store().load(), expected);
        assert_eq!(recorder.borrow().count(&Call::ApplySettings(expected.clone())), 1);
        assert!(controller
            .take_updates()
            .contains(&SessionUpdate::SettingsChanged(expected.clone())));

        // Unchanged settings are not written again
        controller.update_settings(expected).unwrap();
        assert_eq!(recorder.borrow().calls.iter().filter(|(_, c)| matches!(c, Call::ApplySettings(_))).count(), 1);
    }

    #[test]
    fn test_update_settings_without_session() {
        let (mut controller, _recorder) = controller();
        controller.toggle_swap_control_and_command().unwrap();
        assert!(controller.settings().swap_control_and_command);
        controller.start(config("system7.app", "")).unwrap();
    }

    #[test]
    fn test_failed_start_leaves_stopped_session() {
        let (factory, recorder) = RecordingFactory::failing_start();
        let mut controller = SessionController::new(Box::new(factory), Box::new(MemorySettingsStore::new()));
        assert!(controller.start(config("system7.app", "")).is_err());
        assert_eq!(controller.state(), SessionState::Stopped);

        // A stopped session may be replaced by a fresh start
        assert!(controller.start(config("system7.app", "")).is_err());
        assert_eq!(recorder.borrow().count(&Call::Create), 2);
    }

    #[test]
    fn test_updates_survive_reconfigure() {
        let (mut controller, _recorder) = controller();
        controller.start(config("system7.app", "")).unwrap();
        controller.reconfigure(config("system7.app", "")).unwrap();
        let updates = controller.take_updates();
        let states: Vec<_> = updates
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::StateChanged(state) => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Initializing,
                SessionState::Stopped,
                SessionState::Initializing
            ]
        );
    }

    #[test]
    fn test_fullscreen_delegates() {
        let (mut controller, _recorder) = controller();
        assert_eq!(controller.enter_fullscreen(ScreenSize::new(1600, 1200)), None);
        controller.start(config("system7.app", "")).unwrap();
        // 800x600 in 1600x1200 both bind at 2
        assert_eq!(controller.enter_fullscreen(ScreenSize::new(1600, 1200)), Some(2.0));
        controller.exit_fullscreen();
        assert!(!controller.session().unwrap().geometry().fullscreen);
    }
}
