//! Built-in machine and disk catalog.
//!
//! Maps site domains to the system disk that boots there, and system disk
//! names to descriptors for custom configurations. The library disk (Infinite
//! HD) is mounted after the system disk in every session that asks for it.

use std::collections::HashMap;

use crate::display::ScreenSize;

/// Domain whose disk is used when the requested domain is unknown
pub const DEFAULT_DOMAIN: &str = "system7.app";

/// Emulator backend that runs a machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmulatorKind {
    MiniVMac,
    BasiliskII,
    SheepShaver,
}

impl EmulatorKind {
    pub fn name(self) -> &'static str {
        match self {
            EmulatorKind::MiniVMac => "Mini vMac",
            EmulatorKind::BasiliskII => "BasiliskII",
            EmulatorKind::SheepShaver => "SheepShaver",
        }
    }

    /// Whether the backend can mount a disk image while running
    pub fn handles_disk_images(self) -> bool {
        matches!(self, EmulatorKind::MiniVMac)
    }
}

/// An emulated machine model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineDescriptor {
    pub name: &'static str,
    pub emulator: EmulatorKind,
    pub ram_size_mb: u32,
    /// Compact Macs have a built-in screen that can't be resized
    pub fixed_screen_size: Option<ScreenSize>,
}

pub const MAC_PLUS: MachineDescriptor = MachineDescriptor {
    name: "Mac Plus",
    emulator: EmulatorKind::MiniVMac,
    ram_size_mb: 4,
    fixed_screen_size: Some(ScreenSize::new(512, 342)),
};

pub const QUADRA_650: MachineDescriptor = MachineDescriptor {
    name: "Quadra 650",
    emulator: EmulatorKind::BasiliskII,
    ram_size_mb: 128,
    fixed_screen_size: None,
};

pub const POWER_MACINTOSH_9500: MachineDescriptor = MachineDescriptor {
    name: "Power Macintosh 9500",
    emulator: EmulatorKind::SheepShaver,
    ram_size_mb: 256,
    fixed_screen_size: None,
};

pub const ALL_MACHINES: [MachineDescriptor; 3] = [MAC_PLUS, QUADRA_650, POWER_MACINTOSH_9500];

/// Look up a machine by its display name
pub fn machine_by_name(name: &str) -> Option<MachineDescriptor> {
    ALL_MACHINES.iter().copied().find(|m| m.name == name)
}

/// Case around the emulated screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BezelStyle {
    Beige,
    Platinum,
    Pinstripes,
}

/// A disk image the emulator can boot from or mount
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskDescriptor {
    pub name: String,
    pub machine: MachineDescriptor,
    pub bezel_style: BezelStyle,
    pub has_platinum_appearance: bool,
    /// Where the disk's chunks are served from
    pub base_url: String,
    /// Chunks fetched before the emulator starts
    pub prefetch_chunks: Vec<u32>,
}

impl DiskDescriptor {
    fn system(name: &str, machine: MachineDescriptor, bezel_style: BezelStyle, platinum: bool) -> Self {
        Self {
            name: name.to_string(),
            machine,
            bezel_style,
            has_platinum_appearance: platinum,
            base_url: "/Disk".to_string(),
            prefetch_chunks: vec![0],
        }
    }

    /// The shared library disk with the software collection
    pub fn library() -> Self {
        Self {
            name: "Infinite HD".to_string(),
            machine: QUADRA_650,
            bezel_style: BezelStyle::Beige,
            has_platinum_appearance: false,
            base_url: "/Disk".to_string(),
            prefetch_chunks: vec![0, 3346, 3350, 3351, 3352],
        }
    }
}

/// Domain and name lookups over the known disks
pub struct DiskCatalog {
    by_domain: HashMap<String, DiskDescriptor>,
    by_name: HashMap<String, DiskDescriptor>,
    default_disk: DiskDescriptor,
}

impl Default for DiskCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DiskCatalog {
    /// The disks that ship with the site
    pub fn builtin() -> Self {
        let system6 = DiskDescriptor::system("System 6.0.8", MAC_PLUS, BezelStyle::Beige, false);
        let system71 = DiskDescriptor::system("System 7.1", QUADRA_650, BezelStyle::Beige, false);
        let system75 = DiskDescriptor::system("System 7.5.3", QUADRA_650, BezelStyle::Beige, false);
        let kanjitalk = DiskDescriptor::system("KanjiTalk 7.5.3", QUADRA_650, BezelStyle::Beige, false);
        let macos8 = DiskDescriptor::system("Mac OS 8.1", QUADRA_650, BezelStyle::Platinum, true);
        let macos9 = DiskDescriptor::system("Mac OS 9.0.4", POWER_MACINTOSH_9500, BezelStyle::Pinstripes, true);

        let domains = [
            ("system6.app", &system6),
            (DEFAULT_DOMAIN, &system75),
            ("kanjitalk7.app", &kanjitalk),
            ("macos8.app", &macos8),
            ("macos9.app", &macos9),
        ];
        let by_domain = domains
            .iter()
            .map(|(domain, disk)| (domain.to_string(), (*disk).clone()))
            .collect();

        let by_name = [&system6, &system71, &system75, &kanjitalk, &macos8, &macos9]
            .into_iter()
            .map(|disk| (disk.name.clone(), disk.clone()))
            .collect();

        Self::new(by_domain, by_name, system75)
    }

    pub fn new(
        by_domain: HashMap<String, DiskDescriptor>,
        by_name: HashMap<String, DiskDescriptor>,
        default_disk: DiskDescriptor,
    ) -> Self {
        Self { by_domain, by_name, default_disk }
    }

    /// Disk for a domain, if the domain is known
    pub fn for_domain(&self, domain: &str) -> Option<&DiskDescriptor> {
        self.by_domain.get(domain)
    }

    /// Disk for a domain, falling back to the default disk
    pub fn for_domain_or_default(&self, domain: &str) -> &DiskDescriptor {
        self.for_domain(domain).unwrap_or(&self.default_disk)
    }

    pub fn by_name(&self, name: &str) -> Option<&DiskDescriptor> {
        self.by_name.get(name)
    }

    pub fn default_disk(&self) -> &DiskDescriptor {
        &self.default_disk
    }

    /// System disks sorted by name
    pub fn system_disks(&self) -> Vec<&DiskDescriptor> {
        let mut disks: Vec<&DiskDescriptor> = self.by_name.values().collect();
        disks.sort_by(|a, b| a.name.cmp(&b.name));
        disks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_domains() {
        let catalog = DiskCatalog::builtin();
        assert_eq!(catalog.for_domain("macos8.app").map(|d| d.name.as_str()), Some("Mac OS 8.1"));
        assert_eq!(catalog.for_domain(DEFAULT_DOMAIN), Some(catalog.default_disk()));
        assert!(catalog.for_domain("example.com").is_none());
        assert_eq!(catalog.for_domain_or_default("example.com"), catalog.default_disk());
    }

    #[test]
    fn test_hot_mount_capability() {
        assert!(EmulatorKind::MiniVMac.handles_disk_images());
        assert!(!EmulatorKind::BasiliskII.handles_disk_images());
        assert!(!EmulatorKind::SheepShaver.handles_disk_images());
    }

    #[test]
    fn test_machine_lookup() {
        assert_eq!(machine_by_name("Quadra 650"), Some(QUADRA_650));
        assert_eq!(machine_by_name("Lisa"), None);
        assert!(MAC_PLUS.fixed_screen_size.is_some());
    }

    #[test]
    fn test_system_disks_sorted() {
        let catalog = DiskCatalog::builtin();
        let names: Vec<&str> = catalog.system_disks().iter().map(|d| d.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"System 7.1"));
    }
}
