//! Disk ingestion - Files dropped onto the screen
//!
//! Files are classified by name only. Generic files and disk images on
//! backends that can mount them while running go straight into the guest;
//! disk images on other backends are uploaded now and queued for the next
//! restart.

use tracing::{debug, info};

use crate::core::emulator::{DroppedFile, Emulator};

/// Extensions treated as disk images (compared case-insensitively)
const DISK_IMAGE_EXTENSIONS: [&str; 8] = ["dsk", "img", "iso", "hda", "hfv", "toast", "dmg", "image"];

/// Whether a file name looks like a disk image
pub fn is_disk_image_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            DISK_IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// How a dropped file reaches the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRoute {
    /// Copied into the running guest
    Direct,
    /// Attached as a disk, active after restart
    QueuedDiskImage,
}

/// Route for a file given whether the backend hot-mounts images
pub fn classify(name: &str, hot_mount: bool) -> UploadRoute {
    if is_disk_image_file(name) && !hot_mount {
        UploadRoute::QueuedDiskImage
    } else {
        UploadRoute::Direct
    }
}

/// What happened to a drop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Generic files uploaded
    pub files: usize,
    /// Disk images among the dropped files, either route
    pub disk_images: usize,
    /// Disk images waiting for a restart
    pub queued_images: usize,
    /// Dropped with no emulator to receive it
    pub ignored: bool,
}

impl IngestOutcome {
    pub fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }

    /// A restart is needed for the drop to take effect
    pub fn needs_restart(&self) -> bool {
        self.queued_images > 0
    }

    /// Upload operations issued
    pub fn uploads(&self) -> usize {
        self.files + self.disk_images
    }
}

/// Upload a drop into `emulator`
pub fn ingest(files: Vec<DroppedFile>, emulator: &mut dyn Emulator, hot_mount: bool) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();
    let mut queued = Vec::new();

    for file in files {
        let is_image = is_disk_image_file(&file.name);
        if is_image {
            outcome.disk_images += 1;
        } else {
            outcome.files += 1;
        }
        match classify(&file.name, hot_mount) {
            UploadRoute::Direct => {
                debug!("Uploading {} ({} bytes)", file.name, file.contents.len());
                emulator.upload_file(file);
            }
            UploadRoute::QueuedDiskImage => queued.push(file),
        }
    }

    outcome.queued_images = queued.len();
    for file in queued {
        debug!("Uploading disk image {} ({} bytes)", file.name, file.contents.len());
        emulator.upload_disk_image(file);
    }

    if outcome.uploads() > 0 {
        info!(
            "Dropped {} file(s), {} disk image(s), {} waiting for restart",
            outcome.files, outcome.disk_images, outcome.queued_images
        );
    }
    outcome
}

/// Drag hover state.
///
/// Enter and leave arrive for child elements too, so nesting is counted.
#[derive(Debug, Default)]
pub struct DragHover {
    count: u32,
}

impl DragHover {
    pub fn enter(&mut self) {
        self.count += 1;
    }

    pub fn leave(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Show the drop overlay
    pub fn is_active(&self) -> bool {
        self.count > 0
    }
}
