//! Encoder and muxer selection plus the in-flight frame discipline.

use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_media_engine::backend::{MediaBackend, Muxer, VideoEncoder};
use screenreel_media_engine::gif::{GifEncoder, GifMuxer};
use screenreel_media_engine::types::{
    ContainerFormat, EncoderSupport, HardwareAcceleration, MuxerConfig, VideoCodec,
    VideoEncoderConfig,
};

/// Pick an acceleration mode for `config`: hardware first, then software.
pub fn probe_acceleration(
    backend: &dyn MediaBackend,
    config: &VideoEncoderConfig,
) -> ScreenreelResult<HardwareAcceleration> {
    let hardware = backend.probe_video_encoder(config, HardwareAcceleration::PreferHardware);
    if hardware.is_supported() {
        tracing::info!(backend = backend.name(), "Using hardware video encoding");
        return Ok(HardwareAcceleration::PreferHardware);
    }
    if let EncoderSupport::Unsupported { reason } = &hardware {
        tracing::info!(reason = %reason, "Hardware encoding unavailable, trying software");
    }

    match backend.probe_video_encoder(config, HardwareAcceleration::PreferSoftware) {
        EncoderSupport::Supported => {
            tracing::info!(backend = backend.name(), "Using software video encoding");
            Ok(HardwareAcceleration::PreferSoftware)
        }
        EncoderSupport::Unsupported { reason } => Err(ScreenreelError::capability(format!(
            "video encoding not supported on this system: {reason}"
        ))),
    }
}

/// Create the video encoder for `config`. GIF uses the built-in quantizer;
/// everything else goes through the backend after capability probing.
pub fn create_video_encoder(
    backend: &dyn MediaBackend,
    config: &VideoEncoderConfig,
) -> ScreenreelResult<Box<dyn VideoEncoder>> {
    match config.codec {
        VideoCodec::Gif => Ok(Box::new(GifEncoder::new(config)?)),
        VideoCodec::H264 => {
            let acceleration = probe_acceleration(backend, config)?;
            backend.create_video_encoder(config, acceleration)
        }
    }
}

pub fn create_muxer(
    backend: &dyn MediaBackend,
    config: &MuxerConfig,
) -> ScreenreelResult<Box<dyn Muxer>> {
    match config.format {
        ContainerFormat::Gif => Ok(Box::new(GifMuxer::new(config)?)),
        ContainerFormat::Mp4 => backend.create_muxer(config),
    }
}

/// Frames submitted to the encoder versus chunks it has emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    submitted: u64,
    emitted: u64,
    limit: u64,
}

impl InFlight {
    pub fn new(limit: usize) -> Self {
        Self {
            submitted: 0,
            emitted: 0,
            limit: limit.max(1) as u64,
        }
    }

    pub fn submitted(&mut self) {
        self.submitted += 1;
    }

    pub fn emitted(&mut self) {
        self.emitted += 1;
    }

    pub fn count(&self) -> u64 {
        self.submitted.saturating_sub(self.emitted)
    }

    /// True while no more frames may be submitted.
    pub fn is_full(&self) -> bool {
        self.count() >= self.limit
    }

    pub fn total_submitted(&self) -> u64 {
        self.submitted
    }
}

/// Whether export frame `index` should be a keyframe.
pub fn is_keyframe(index: u64, interval: u64) -> bool {
    interval == 0 || index % interval == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_limit() {
        let mut q = InFlight::new(2);
        assert!(!q.is_full());
        q.submitted();
        q.submitted();
        assert!(q.is_full());
        q.emitted();
        assert_eq!(q.count(), 1);
        assert!(!q.is_full());
        assert_eq!(q.total_submitted(), 2);
    }

    #[test]
    fn test_extra_chunks_do_not_underflow() {
        let mut q = InFlight::new(1);
        q.emitted();
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn test_keyframe_cadence() {
        let keys: Vec<u64> = (0..400).filter(|i| is_keyframe(*i, 150)).collect();
        assert_eq!(keys, vec![0, 150, 300]);
    }
}
