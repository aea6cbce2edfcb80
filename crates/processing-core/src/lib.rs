//! Screenreel Processing Core
//!
//! Turns timeline zoom regions into a per-frame camera:
//! - **Dominance:** pick the strongest zoom region at a timestamp
//! - **Fade:** ramp region strength in and out around its bounds
//! - **Smoothing:** low-pass the camera frame to frame and measure motion
//!
//! This crate is pure computation. No I/O, no media dependencies.

pub mod zoom;

pub use zoom::{find_dominant_region, ZoomAnimator, ZoomState};
