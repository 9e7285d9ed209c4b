//! Custom run definitions and CD-ROM images loaded from URLs.
//!
//! A run definition is what the user assembles by hand: a machine, a list of
//! system disks, CD-ROM image URLs and whether to include the library disk.
//! It turns into a regular [`RunConfiguration`] once every URL checks out.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

use crate::catalog::{machine_by_name, DiskCatalog, DiskDescriptor, MachineDescriptor, ALL_MACHINES, QUADRA_650};
use crate::core::emulator::DebugFlags;
use crate::display::geometry::initial_screen_size;
use crate::net::EthernetSelection;
use crate::resolver::{PlatformCapabilities, RunConfiguration};

/// Sites that serve raw images with range request support
const ALLOWED_CDROM_HOSTS: [&str; 2] = ["archive.org", "macintoshgarden.org"];

/// Raw image formats; compressed or container formats can't be streamed
const CDROM_EXTENSIONS: [&str; 3] = ["iso", "img", "toast"];

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// System disk a new run definition starts with
const DEFAULT_CUSTOM_DISK: &str = "System 7.1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdromError {
    #[error("Could not load CD-ROM: invalid URL ({0})")]
    InvalidUrl(String),

    #[error("Could not load CD-ROM: unsupported scheme \"{0}\"")]
    UnsupportedScheme(String),

    #[error("Could not load CD-ROM: {0} is not a supported site (supported: archive.org, macintoshgarden.org)")]
    UnsupportedHost(String),

    #[error("Could not load CD-ROM: {0} is not a raw .iso, .img or .toast image")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunDefError {
    #[error("Unknown machine \"{name}\" (available: {available})")]
    UnknownMachine { name: String, available: String },

    #[error("Unknown disk \"{name}\" (available: {available})")]
    UnknownDisk { name: String, available: String },
}

/// A CD-ROM image streamed from a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdromImage {
    pub name: String,
    pub src_url: String,
}

/// Check a user supplied CD-ROM URL
pub fn validate_cdrom_url(raw: &str) -> Result<CdromImage, CdromError> {
    let url = Url::parse(raw.trim()).map_err(|e| CdromError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(CdromError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let allowed = ALLOWED_CDROM_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)));
    if !allowed {
        return Err(CdromError::UnsupportedHost(host));
    }

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !CDROM_EXTENSIONS.contains(&extension.as_str()) {
        return Err(CdromError::UnsupportedFormat(if file_name.is_empty() {
            url.path().to_string()
        } else {
            file_name
        }));
    }

    Ok(CdromImage {
        name: file_name,
        src_url: url.to_string(),
    })
}

/// Location that reloads into the same custom CD-ROM
pub fn location_with_cdrom_url(pathname: &str, cdrom_url: &str) -> String {
    format!("{}?cdrom_url={}", pathname, utf8_percent_encode(cdrom_url, URI_COMPONENT))
}

/// Button style matching the first disk's system appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Classic,
    Platinum,
}

/// A configuration built by hand
#[derive(Debug, Clone, PartialEq)]
pub struct RunDef {
    pub machine: MachineDescriptor,
    pub disks: Vec<DiskDescriptor>,
    pub cdrom_urls: Vec<String>,
    pub include_library_disk: bool,
    pub debug_fallback: bool,
    pub debug_audio: bool,
}

impl RunDef {
    /// Quadra 650 with System 7.1 and the library disk
    pub fn new(catalog: &DiskCatalog) -> Self {
        let disk = catalog
            .by_name(DEFAULT_CUSTOM_DISK)
            .unwrap_or_else(|| catalog.default_disk())
            .clone();
        Self {
            machine: QUADRA_650,
            disks: vec![disk],
            cdrom_urls: Vec::new(),
            include_library_disk: true,
            debug_fallback: false,
            debug_audio: false,
        }
    }

    /// Assemble a definition from machine and disk names.
    ///
    /// Disks replace the default system disk, in order. CD-ROM URLs are
    /// checked later by [`RunDef::to_run_configuration`].
    pub fn from_names(
        catalog: &DiskCatalog,
        machine: Option<&str>,
        disks: &[String],
        cdrom_urls: &[String],
    ) -> Result<Self, RunDefError> {
        let mut def = Self::new(catalog);

        if let Some(name) = machine {
            def.machine = machine_by_name(name).ok_or_else(|| RunDefError::UnknownMachine {
                name: name.to_string(),
                available: ALL_MACHINES.iter().map(|m| m.name).collect::<Vec<_>>().join(", "),
            })?;
        }

        for (index, name) in disks.iter().enumerate() {
            let disk = catalog
                .by_name(name)
                .ok_or_else(|| RunDefError::UnknownDisk {
                    name: name.clone(),
                    available: catalog
                        .system_disks()
                        .iter()
                        .map(|d| d.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })?
                .clone();
            if index == 0 {
                def.set_disk(0, disk);
            } else {
                def.add_disk_after(index - 1, disk);
            }
        }

        for (index, url) in cdrom_urls.iter().enumerate() {
            def.add_cdrom_url_after(index.saturating_sub(1));
            def.set_cdrom_url(index, url);
        }

        Ok(def)
    }

    pub fn set_disk(&mut self, index: usize, disk: DiskDescriptor) {
        if let Some(slot) = self.disks.get_mut(index) {
            *slot = disk;
        }
    }

    /// Insert a disk right after `index` (or first if there are none)
    pub fn add_disk_after(&mut self, index: usize, disk: DiskDescriptor) {
        let at = (index + 1).min(self.disks.len());
        self.disks.insert(at, disk);
    }

    pub fn set_cdrom_url(&mut self, index: usize, url: &str) {
        if let Some(slot) = self.cdrom_urls.get_mut(index) {
            *slot = url.to_string();
        }
    }

    /// Insert an empty URL right after `index`
    pub fn add_cdrom_url_after(&mut self, index: usize) {
        let at = (index + 1).min(self.cdrom_urls.len());
        self.cdrom_urls.insert(at, String::new());
    }

    pub fn appearance(&self) -> Appearance {
        match self.disks.first() {
            Some(disk) if disk.has_platinum_appearance => Appearance::Platinum,
            _ => Appearance::Classic,
        }
    }

    /// Freeze into a run configuration. Blank URLs are skipped.
    pub fn to_run_configuration(
        &self,
        platform: &PlatformCapabilities,
        ethernet: Option<EthernetSelection>,
    ) -> Result<RunConfiguration, CdromError> {
        let cdroms = self
            .cdrom_urls
            .iter()
            .filter(|url| !url.trim().is_empty())
            .map(|url| validate_cdrom_url(url))
            .collect::<Result<Vec<_>, _>>()?;

        let mut disks = self.disks.clone();
        if self.include_library_disk {
            disks.push(DiskDescriptor::library());
        }

        Ok(RunConfiguration {
            machine: self.machine,
            disks,
            cdroms,
            ethernet,
            use_shared_memory: platform.shared_memory,
            debug: DebugFlags {
                audio: self.debug_audio,
                fallback: self.debug_fallback,
            },
            screen_size: initial_screen_size(self.machine.fixed_screen_size, platform.viewport),
            ethernet_status_expanded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BezelStyle, MAC_PLUS};
    use crate::display::ScreenSize;

    fn platform() -> PlatformCapabilities {
        PlatformCapabilities {
            shared_memory: true,
            viewport: ScreenSize::new(1440, 900),
        }
    }

    #[test]
    fn test_valid_cdrom_url() {
        let image = validate_cdrom_url("https://archive.org/download/mac-cd/Mac%20CD.iso").unwrap();
        assert_eq!(image.name, "Mac CD.iso");
        assert_eq!(image.src_url, "https://archive.org/download/mac-cd/Mac%20CD.iso");

        assert!(validate_cdrom_url("http://download.macintoshgarden.org/images/game.TOAST").is_ok());
    }

    #[test]
    fn test_invalid_cdrom_urls() {
        assert!(matches!(validate_cdrom_url("not a url"), Err(CdromError::InvalidUrl(_))));
        assert_eq!(
            validate_cdrom_url("ftp://archive.org/a.iso"),
            Err(CdromError::UnsupportedScheme("ftp".to_string()))
        );
        assert_eq!(
            validate_cdrom_url("https://example.com/a.iso"),
            Err(CdromError::UnsupportedHost("example.com".to_string()))
        );
        assert_eq!(
            validate_cdrom_url("https://notarchive.org/a.iso"),
            Err(CdromError::UnsupportedHost("notarchive.org".to_string()))
        );
        assert_eq!(
            validate_cdrom_url("https://archive.org/a.dmg"),
            Err(CdromError::UnsupportedFormat("a.dmg".to_string()))
        );
    }

    #[test]
    fn test_error_message_is_descriptive() {
        let err = validate_cdrom_url("https://example.com/a.iso").unwrap_err();
        assert!(err.to_string().starts_with("Could not load CD-ROM:"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_location_with_cdrom_url() {
        assert_eq!(
            location_with_cdrom_url("/", "https://archive.org/a b.iso"),
            "/?cdrom_url=https%3A%2F%2Farchive.org%2Fa%20b.iso"
        );
    }

    #[test]
    fn test_run_def_editing() {
        let catalog = DiskCatalog::builtin();
        let mut def = RunDef::new(&catalog);
        assert_eq!(def.disks[0].name, "System 7.1");
        assert_eq!(def.appearance(), Appearance::Classic);

        let macos8 = catalog.by_name("Mac OS 8.1").unwrap().clone();
        def.add_disk_after(0, macos8.clone());
        assert_eq!(def.disks.len(), 2);
        assert_eq!(def.disks[1], macos8);
        assert_eq!(def.appearance(), Appearance::Classic);

        def.set_disk(0, macos8.clone());
        assert_eq!(def.appearance(), Appearance::Platinum);
        // Out of range slots are left alone
        def.set_disk(5, DiskDescriptor::library());
        assert_eq!(def.disks.len(), 2);
        def.add_disk_after(9, DiskDescriptor::library());
        assert_eq!(def.disks[2].name, "Infinite HD");
    }

    #[test]
    fn test_run_def_from_names() {
        let catalog = DiskCatalog::builtin();
        let disks = vec!["Mac OS 9.0.4".to_string(), "System 7.5.3".to_string()];
        let urls = vec![
            "https://archive.org/x/one.iso".to_string(),
            "https://archive.org/x/two.toast".to_string(),
        ];
        let def = RunDef::from_names(&catalog, Some("Power Macintosh 9500"), &disks, &urls).unwrap();
        assert_eq!(def.machine, crate::catalog::POWER_MACINTOSH_9500);
        let names: Vec<&str> = def.disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Mac OS 9.0.4", "System 7.5.3"]);
        assert_eq!(def.cdrom_urls, urls);
        assert_eq!(def.appearance(), Appearance::Platinum);

        // Nothing given keeps the defaults
        assert_eq!(RunDef::from_names(&catalog, None, &[], &[]).unwrap(), RunDef::new(&catalog));
    }

    #[test]
    fn test_run_def_from_unknown_names() {
        let catalog = DiskCatalog::builtin();
        let err = RunDef::from_names(&catalog, Some("Lisa"), &[], &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown machine \"Lisa\" (available: Mac Plus, Quadra 650, Power Macintosh 9500)"
        );

        let err = RunDef::from_names(&catalog, None, &["System 8".to_string()], &[]).unwrap_err();
        match err {
            RunDefError::UnknownDisk { name, available } => {
                assert_eq!(name, "System 8");
                assert!(available.starts_with("KanjiTalk 7.5.3, Mac OS 8.1"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_run_def_to_configuration() {
        let catalog = DiskCatalog::builtin();
        let mut def = RunDef::new(&catalog);
        def.machine = MAC_PLUS;
        def.add_cdrom_url_after(0);
        def.add_cdrom_url_after(0);
        def.set_cdrom_url(0, "https://archive.org/x/disc.iso");

        let config = def.to_run_configuration(&platform(), None).unwrap();
        assert_eq!(config.machine, MAC_PLUS);
        assert_eq!(config.screen_size, ScreenSize::new(512, 342));
        assert_eq!(config.disks.len(), 2);
        assert_eq!(config.disks[1].name, "Infinite HD");
        assert_eq!(config.cdroms.len(), 1);
        assert_eq!(config.disks[0].bezel_style, BezelStyle::Beige);
    }

    #[test]
    fn test_run_def_rejects_bad_url() {
        let catalog = DiskCatalog::builtin();
        let mut def = RunDef::new(&catalog);
        def.include_library_disk = false;
        def.cdrom_urls.push("https://example.com/disc.iso".to_string());
        assert!(def.to_run_configuration(&platform(), None).is_err());

        def.set_cdrom_url(0, "  ");
        let config = def.to_run_configuration(&platform(), None).unwrap();
        assert_eq!(config.disks.len(), 1);
    }
}
