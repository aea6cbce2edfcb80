use std::path::Path;

use gstreamer as gst;
use gstreamer_pbutils as gst_pbutils;
use gstreamer_pbutils::prelude::*;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use super::init_gstreamer;
use crate::types::{AudioStreamInfo, DecodedVideoInfo};

const DISCOVER_TIMEOUT_SECS: u64 = 15;

fn caps_name(caps: Option<gst::Caps>) -> String {
    caps.and_then(|c| c.structure(0).map(|s| s.name().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Read dimensions, duration and stream layout without decoding.
pub fn probe_source(source: &Path) -> ScreenreelResult<DecodedVideoInfo> {
    if !source.exists() {
        return Err(ScreenreelError::FileNotFound {
            path: source.to_path_buf(),
        });
    }
    init_gstreamer()?;

    let absolute = source.canonicalize()?;
    let uri = gst::glib::filename_to_uri(&absolute, None).map_err(|e| {
        ScreenreelError::initialization(format!("Invalid source path {}: {e}", source.display()))
    })?;
    let discoverer =
        gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(DISCOVER_TIMEOUT_SECS))
            .map_err(|e| ScreenreelError::initialization(format!("Discoverer unavailable: {e}")))?;
    let info = discoverer.discover_uri(&uri).map_err(|e| {
        ScreenreelError::initialization(format!("Failed to probe {}: {e}", source.display()))
    })?;

    let video = info.video_streams().into_iter().next().ok_or_else(|| {
        ScreenreelError::initialization(format!("{} has no video stream", source.display()))
    })?;
    let rate = video.framerate();
    let frame_rate = if rate.denom() > 0 && rate.numer() > 0 {
        rate.numer() as f64 / rate.denom() as f64
    } else {
        0.0
    };

    let audio = info
        .audio_streams()
        .into_iter()
        .next()
        .map(|a| AudioStreamInfo {
            codec: caps_name(a.caps()),
            sample_rate: a.sample_rate(),
            channels: a.channels() as u16,
        });

    let probed = DecodedVideoInfo {
        width: video.width(),
        height: video.height(),
        duration_secs: info
            .duration()
            .map(|d| d.nseconds() as f64 / 1e9)
            .unwrap_or(0.0),
        frame_rate,
        codec: caps_name(video.caps()),
        audio,
    };
    tracing::debug!(
        source = %source.display(),
        width = probed.width,
        height = probed.height,
        duration_secs = probed.duration_secs,
        has_audio = probed.has_audio(),
        "Probed source"
    );
    Ok(probed)
}
