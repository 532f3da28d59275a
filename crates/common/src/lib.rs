//! Railguide Common Library
//!
//! Transient measurement types (viewports, element boxes, CTA records, style
//! snapshots), the site contract, tolerances and configuration shared by the
//! checkers.

pub mod config;
pub mod contract;
pub mod cta;
pub mod error;
pub mod geometry;
pub mod style;
pub mod tolerance;
pub mod viewport;

// Re-export commonly used types
pub use config::{ArtifactConfig, BrowserConfig, BrowserKind, CheckerConfig, SiteConfig};
pub use contract::{Landmark, SiteContract};
pub use cta::CtaRecord;
pub use error::{Error, Result};
pub use geometry::BoundingBox;
pub use style::StyleSnapshot;
pub use tolerance::Tolerances;
pub use viewport::Viewport;

/// Railguide version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "railguide.toml";
