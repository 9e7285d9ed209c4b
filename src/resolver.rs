//! Run configuration resolution.
//!
//! Derives the immutable [`RunConfiguration`] for a session from where the
//! page was loaded (host + query string), what the platform can do, and the
//! disk catalog. Resolution never fails: unknown domains get the default
//! disk and malformed flags count as absent.
//!
//! # Recognized query parameters
//!
//! | Parameter | Effect |
//! |-----------|--------|
//! | `domain` | Catalog key instead of the host |
//! | `ethernet` | Enable ethernet |
//! | `ethernet_zone` | Zone to relay through (with `ethernet`) |
//! | `use_shared_memory=false` | Never use shared memory |
//! | `debug_audio=true` | Audio debugging |
//! | `ethernet_status` | Start with the peer panel expanded |
//! | `cdrom_url` | Custom CD-ROM image to mount |

use tracing::{debug, warn};
use url::Url;

use crate::catalog::{DiskCatalog, DiskDescriptor, MachineDescriptor};
use crate::core::emulator::DebugFlags;
use crate::custom::{validate_cdrom_url, CdromImage};
use crate::display::geometry::initial_screen_size;
use crate::display::ScreenSize;
use crate::net::EthernetSelection;

/// Where the page was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Host, possibly with a port
    pub host: String,
    pub pathname: String,
    /// Query string, with or without the leading `?`
    pub search: String,
}

impl Location {
    #[cfg(test)]
    pub fn new(host: &str, search: &str) -> Self {
        Self {
            host: host.to_string(),
            pathname: "/".to_string(),
            search: search.to_string(),
        }
    }

    /// Split a full URL into its location parts
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let mut host = url.host_str()?.to_string();
        if let Some(port) = url.port() {
            host = format!("{}:{}", host, port);
        }
        Some(Self {
            host,
            pathname: url.path().to_string(),
            search: url.query().unwrap_or_default().to_string(),
        })
    }
}

/// What the host platform offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Shared memory between the page and the emulator worker is available
    pub shared_memory: bool,
    /// Viewport the screen has to fit in
    pub viewport: ScreenSize,
}

/// Decoded query string
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(search: &str) -> Self {
        let search = search.strip_prefix('?').unwrap_or(search);
        let pairs = url::form_urlencoded::parse(search.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Present with a non-empty value
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }
}

/// Everything a session is constructed from. Immutable once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub machine: MachineDescriptor,
    /// Boot disk first
    pub disks: Vec<DiskDescriptor>,
    pub cdroms: Vec<CdromImage>,
    pub ethernet: Option<EthernetSelection>,
    pub use_shared_memory: bool,
    pub debug: DebugFlags,
    pub screen_size: ScreenSize,
    /// Show peer details without a click
    pub ethernet_status_expanded: bool,
}

impl RunConfiguration {
    /// Name of the boot disk, if there is one
    pub fn boot_disk_name(&self) -> Option<&str> {
        self.disks.first().map(|d| d.name.as_str())
    }
}

/// Split `<zone>.<base>.<tld>` into the zone and `<base>.<tld>`
pub fn zone_from_domain(domain: &str) -> Option<(String, String)> {
    let host = domain.split(':').next().unwrap_or(domain);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() != 3 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some((labels[0].to_string(), format!("{}.{}", labels[1], labels[2])))
}

/// Resolve the run configuration for a page load
pub fn resolve(location: &Location, platform: &PlatformCapabilities, catalog: &DiskCatalog) -> RunConfiguration {
    let params = QueryParams::parse(&location.search);

    let mut domain = params
        .get("domain")
        .filter(|d| !d.is_empty())
        .unwrap_or(location.host.as_str())
        .to_ascii_lowercase();

    // A zone subdomain picks both the zone and the site
    let mut ethernet = None;
    if let Some((zone, base)) = zone_from_domain(&domain) {
        debug!("Ethernet zone {} from domain {}", zone, domain);
        ethernet = Some(EthernetSelection::ZoneRelay { zone });
        domain = base;
    }
    if ethernet.is_none() && params.flag("ethernet") {
        ethernet = Some(match params.get("ethernet_zone").filter(|z| !z.is_empty()) {
            Some(zone) => EthernetSelection::ZoneRelay { zone: zone.to_string() },
            None => EthernetSelection::Broadcast,
        });
    }

    if catalog.for_domain(&domain).is_none() {
        debug!("No disk for domain {}, using {}", domain, catalog.default_disk().name);
    }
    let disk = catalog.for_domain_or_default(&domain);

    let cdroms = match params.get("cdrom_url").filter(|u| !u.is_empty()) {
        Some(url) => match validate_cdrom_url(url) {
            Ok(image) => vec![image],
            Err(e) => {
                warn!("Ignoring cdrom_url: {}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let machine = disk.machine;
    RunConfiguration {
        machine,
        disks: vec![disk.clone(), DiskDescriptor::library()],
        cdroms,
        ethernet,
        use_shared_memory: platform.shared_memory && params.get("use_shared_memory") != Some("false"),
        debug: DebugFlags {
            audio: params.get("debug_audio") == Some("true"),
            fallback: false,
        },
        screen_size: initial_screen_size(machine.fixed_screen_size, platform.viewport),
        ethernet_status_expanded: params.flag("ethernet_status"),
    }
}
