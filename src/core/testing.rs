//! Recording emulator backend for tests

use std::cell::RefCell;
use std::rc::Rc;

use super::emulator::{DroppedFile, Emulator, EmulatorConfig, EmulatorError, EmulatorFactory, EventSender};
use crate::settings::EmulatorSettings;

/// A call made on an emulator instance
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create,
    Start,
    Stop,
    UploadFile(String),
    UploadDiskImage(String),
    Restart,
    ApplySettings(EmulatorSettings),
}

/// Everything the factory and its instances saw
#[derive(Default)]
pub struct Recorder {
    /// (instance number, call)
    pub calls: Vec<(usize, Call)>,
    pub configs: Vec<EmulatorConfig>,
    pub senders: Vec<EventSender>,
}

impl Recorder {
    pub fn calls_for(&self, instance: usize) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|(i, _)| *i == instance)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|(_, c)| c == call).count()
    }
}

pub type SharedRecorder = Rc<RefCell<Recorder>>;

pub struct RecordingFactory {
    recorder: SharedRecorder,
    fail_start: bool,
}

impl RecordingFactory {
    pub fn new() -> (Self, SharedRecorder) {
        let recorder = SharedRecorder::default();
        (
            Self {
                recorder: recorder.clone(),
                fail_start: false,
            },
            recorder,
        )
    }

    pub fn failing_start() -> (Self, SharedRecorder) {
        let (mut factory, recorder) = Self::new();
        factory.fail_start = true;
        (factory, recorder)
    }
}

impl EmulatorFactory for RecordingFactory {
    fn create(&self, config: EmulatorConfig, events: EventSender) -> Result<Box<dyn Emulator>, EmulatorError> {
        let mut recorder = self.recorder.borrow_mut();
        let instance = recorder.configs.len();
        recorder.configs.push(config);
        recorder.senders.push(events);
        recorder.calls.push((instance, Call::Create));
        Ok(Box::new(RecordingEmulator {
            instance,
            recorder: self.recorder.clone(),
            fail_start: self.fail_start,
        }))
    }
}

pub struct RecordingEmulator {
    instance: usize,
    recorder: SharedRecorder,
    fail_start: bool,
}

impl RecordingEmulator {
    fn record(&self, call: Call) {
        self.recorder.borrow_mut().calls.push((self.instance, call));
    }
}

impl Emulator for RecordingEmulator {
    fn start(&mut self) -> Result<(), EmulatorError> {
        self.record(Call::Start);
        if self.fail_start {
            return Err(EmulatorError::Start("worker failed to load".to_string()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.record(Call::Stop);
    }

    fn upload_file(&mut self, file: DroppedFile) {
        self.record(Call::UploadFile(file.name));
    }

    fn upload_disk_image(&mut self, file: DroppedFile) {
        self.record(Call::UploadDiskImage(file.name));
    }

    fn restart(&mut self) {
        self.record(Call::Restart);
    }

    fn apply_settings(&mut self, settings: EmulatorSettings) {
        self.record(Call::ApplySettings(settings));
    }
}
