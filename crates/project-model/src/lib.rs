//! Screenreel Project Model
//!
//! Defines the core data contracts for Screenreel projects:
//! - **Timeline:** Editing decisions (zoom regions, crop, trims)
//! - **Segments:** Kept source intervals derived from trims
//! - **Project:** Source track metadata, export settings, and canvas style
//!
//! All spatial coordinates are normalized to `[0.0, 1.0]` relative to the
//! source video (crop) or the output canvas (zoom focus). Timeline times are
//! milliseconds on the source timeline.

pub mod geometry;
pub mod project;
pub mod segments;
pub mod timeline;

pub use geometry::*;
pub use project::*;
pub use segments::*;
pub use timeline::*;
