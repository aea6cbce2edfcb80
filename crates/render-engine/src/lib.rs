//! Screenreel Render Engine
//!
//! Streaming export pipeline that turns a source recording plus its
//! editing timeline into a finished MP4 or GIF.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ──┬── video demux ── decode ── resample (CFR) ── render ── encode ──┐
//!              │                                                               ├── mux ── output
//!              └── audio demux ── decode ── trim/retime ─────────── encode ───┘
//! ```
//!
//! Trims are applied while streaming: packets inside trimmed ranges are
//! still decoded, but their frames and samples never reach the encoders.
//! Zoom regions and canvas styling are applied per frame by the
//! [`compositor::FrameRenderer`].

pub mod audio;
pub mod background;
pub mod cancel;
pub mod compositor;
pub mod decoder;
pub mod effects;
pub mod encode;
pub mod export;
pub mod layout;

pub use cancel::CancelHandle;
pub use compositor::{FrameRenderer, RendererConfig};
pub use export::*;
