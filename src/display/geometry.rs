//! Geometry - Screen size negotiation and fullscreen scaling

use tracing::{debug, warn};

/// Horizontal slack below which the bezel is drawn small
pub const SMALL_BEZEL_THRESHOLD: u32 = 80;
/// Horizontal slack below which the bezel is drawn medium
pub const MEDIUM_BEZEL_THRESHOLD: u32 = 168;
/// Space reserved around the screen when picking a size for the window
pub const CHROME_MARGIN: u32 = MEDIUM_BEZEL_THRESHOLD;

/// Standard resolutions, largest area first
const STANDARD_RESOLUTIONS: [ScreenSize; 6] = [
    ScreenSize::new(1600, 1200),
    ScreenSize::new(1280, 1024),
    ScreenSize::new(1152, 870),
    ScreenSize::new(1024, 768),
    ScreenSize::new(800, 600),
    ScreenSize::new(640, 480),
];

/// Width and height in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are positive
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Smallest of the standard resolutions
    pub fn smallest_standard() -> Self {
        STANDARD_RESOLUTIONS[STANDARD_RESOLUTIONS.len() - 1]
    }
}

impl std::fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Bezel size tier, used for presentation only
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BezelSize {
    Small,
    Medium,
    Large,
}

impl BezelSize {
    /// Classify from the viewport width and the current screen width
    pub fn classify(viewport_width: u32, content_width: u32) -> Self {
        let available = i64::from(viewport_width) - i64::from(content_width);
        if available < i64::from(SMALL_BEZEL_THRESHOLD) {
            BezelSize::Small
        } else if available < i64::from(MEDIUM_BEZEL_THRESHOLD) {
            BezelSize::Medium
        } else {
            BezelSize::Large
        }
    }
}

/// Pick the largest standard resolution that fits in the viewport
pub fn size_for_window(viewport: ScreenSize) -> ScreenSize {
    let available_width = viewport.width.saturating_sub(CHROME_MARGIN);
    let available_height = viewport.height.saturating_sub(CHROME_MARGIN);
    STANDARD_RESOLUTIONS
        .iter()
        .copied()
        .find(|size| size.width <= available_width && size.height <= available_height)
        .unwrap_or_else(ScreenSize::smallest_standard)
}

/// Initial screen size for a machine.
///
/// Machines with a fixed screen (compact Macs) always get that size; everything
/// else is sized to the window.
pub fn initial_screen_size(fixed: Option<ScreenSize>, viewport: ScreenSize) -> ScreenSize {
    match fixed {
        Some(size) if size.is_valid() => size,
        _ => size_for_window(viewport),
    }
}

/// Current screen geometry
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    /// `None` means natural size
    pub scale: Option<f64>,
    pub fullscreen: bool,
}

impl ScreenGeometry {
    pub fn size(&self) -> ScreenSize {
        ScreenSize::new(self.width, self.height)
    }
}

/// Tracks the emulated screen's size and how it is presented
pub struct ScreenGeometryManager {
    geometry: ScreenGeometry,
}

impl ScreenGeometryManager {
    /// Create a manager starting at `initial`
    pub fn new(initial: ScreenSize) -> Self {
        let size = if initial.is_valid() {
            initial
        } else {
            warn!("Invalid initial screen size {}, using {}", initial, ScreenSize::smallest_standard());
            ScreenSize::smallest_standard()
        };
        Self {
            geometry: ScreenGeometry {
                width: size.width,
                height: size.height,
                scale: None,
                fullscreen: false,
            },
        }
    }

    pub fn geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    pub fn size(&self) -> ScreenSize {
        self.geometry.size()
    }

    /// Apply a size reported by the emulator. Returns false if rejected.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let size = ScreenSize::new(width, height);
        if !size.is_valid() {
            warn!("Ignoring screen size change to {}", size);
            return false;
        }
        debug!("Screen size: {} -> {}", self.geometry.size(), size);
        self.geometry.width = width;
        self.geometry.height = height;
        true
    }

    /// Enter fullscreen on a display with `available` space.
    ///
    /// The scale keeps the aspect ratio and guarantees the whole screen fits.
    pub fn enter_fullscreen(&mut self, available: ScreenSize) -> Option<f64> {
        self.geometry.fullscreen = true;
        if !available.is_valid() {
            warn!("Display reports no available area, keeping natural scale");
            self.geometry.scale = None;
            return None;
        }
        let height_scale = f64::from(available.height) / f64::from(self.geometry.height);
        let width_scale = f64::from(available.width) / f64::from(self.geometry.width);
        let scale = height_scale.min(width_scale);
        self.geometry.scale = Some(scale);
        Some(scale)
    }

    /// Leave fullscreen, back to natural size
    pub fn exit_fullscreen(&mut self) {
        self.geometry.fullscreen = false;
        self.geometry.scale = None;
    }

    /// Bezel tier for the current screen in a viewport this wide
    pub fn bezel_size(&self, viewport_width: u32) -> BezelSize {
        BezelSize::classify(viewport_width, self.geometry.width)
    }
}
