//! Display geometry for the emulated screen.
//!
//! - **geometry**: initial screen size selection, dynamic resizes reported by
//!   the emulator, fullscreen scaling and bezel size classification
//!
//! # Sizing
//!
//! ```text
//! machine has fixed size? ──yes──> use it verbatim
//!          │
//!          no
//!          ▼
//! largest standard resolution fitting in (viewport - chrome margin)
//!          │
//!       none fit
//!          ▼
//!       640x480
//! ```

pub mod geometry;

pub use geometry::{BezelSize, ScreenGeometry, ScreenGeometryManager, ScreenSize};
