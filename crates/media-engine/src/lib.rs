//! Screenreel Media Engine
//!
//! Contracts for the codec side of an export: demuxing the source,
//! decoding, encoding and writing the output container. Backends implement
//! [`MediaBackend`]; the render engine only talks to the traits.
//!
//! - [`gst::GstBackend`] (feature `gstreamer`) drives the system GStreamer
//!   installation for MP4/H.264/AAC.
//! - [`gif`] is a pure-Rust GIF encoder and writer used for GIF exports on
//!   every backend.

pub mod backend;
pub mod gif;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod types;

use std::sync::Arc;

use screenreel_common::error::ScreenreelResult;

pub use backend::*;
pub use types::*;

/// The backend compiled into this build.
#[cfg(feature = "gstreamer")]
pub fn default_backend() -> ScreenreelResult<Arc<dyn MediaBackend>> {
    Ok(Arc::new(gst::GstBackend::new()?))
}

/// The backend compiled into this build.
#[cfg(not(feature = "gstreamer"))]
pub fn default_backend() -> ScreenreelResult<Arc<dyn MediaBackend>> {
    Err(screenreel_common::error::ScreenreelError::unsupported(
        "built without a media backend; rebuild with the `gstreamer` feature",
    ))
}
