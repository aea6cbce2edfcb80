//! Screenreel Common Utilities
//!
//! Shared infrastructure for all Screenreel crates:
//! - Error types and result aliases
//! - Frame timing and export stopwatch utilities
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
