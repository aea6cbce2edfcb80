//! Data passed between pipeline stages.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Which elementary stream a packet or chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

/// Source metadata, captured once when the source is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedVideoInfo {
    pub width: u32,
    pub height: u32,

    /// Container duration in seconds.
    pub duration_secs: f64,

    /// Average frame rate. Screen recordings are usually variable rate, so
    /// this is informational only.
    pub frame_rate: f64,

    /// Video codec name (for example `video/x-h264`).
    pub codec: String,

    /// First audio stream, if the source has one.
    pub audio: Option<AudioStreamInfo>,
}

/// Audio stream metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedVideoInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// Decoder configuration for one elementary stream.
///
/// `codec` identifies the bitstream; backends may encode richer information
/// in it (the GStreamer backend stores a full caps string). `description`
/// carries out-of-band codec data such as an `avcC` record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamConfig {
    pub codec: String,
    pub description: Option<Vec<u8>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl StreamConfig {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..Self::default()
        }
    }
}

/// A compressed packet read from the source container.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    pub kind: StreamKind,
    pub data: Vec<u8>,
    /// Presentation time on the source timeline (µs).
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub keyframe: bool,
}

/// A decoded source frame. The pixel data is shared so resampling can hand
/// out the same frame several times without copying.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Presentation time on the source timeline (µs).
    pub timestamp_us: i64,
    pub image: Arc<RgbaImage>,
}

impl DecodedFrame {
    pub fn new(timestamp_us: i64, image: RgbaImage) -> Self {
        Self {
            timestamp_us,
            image: Arc::new(image),
        }
    }

    /// The same pixels presented at another source time.
    pub fn retimed(&self, timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            image: Arc::clone(&self.image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Interleaved 32-bit float PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub timestamp_us: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as f64 * 1_000_000.0 / self.sample_rate as f64).round() as i64
    }

    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us()
    }

    /// Sample frames `[start, end)` as a new buffer with its timestamp moved
    /// to the first kept frame.
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let frames = self.frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        let ch = self.channels as usize;
        let offset_us = if self.sample_rate == 0 {
            0
        } else {
            (start as f64 * 1_000_000.0 / self.sample_rate as f64).round() as i64
        };
        AudioBuffer {
            timestamp_us: self.timestamp_us + offset_us,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: self.samples[start * ch..end * ch].to_vec(),
        }
    }
}

/// A composited output frame ready for encoding.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Presentation time on the export timeline (µs).
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub image: RgbaImage,
}

/// A compressed chunk produced by an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub kind: StreamKind,
    pub data: Vec<u8>,
    /// Presentation time on the export timeline (µs).
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub keyframe: bool,
    /// Decoder configuration, attached to the first chunk of a stream.
    pub config: Option<StreamConfig>,
}

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Gif,
}

/// Output audio codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Maximum distance between keyframes, in frames.
    pub keyframe_interval: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioEncoderConfig {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Gif,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MuxerConfig {
    pub format: ContainerFormat,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Whether an audio track will be written.
    pub has_audio: bool,
    /// GIF only: repeat forever.
    pub looped: bool,
}

/// The finished file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Encoder implementation preference for capability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareAcceleration {
    PreferHardware,
    PreferSoftware,
}

/// Result of probing an encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderSupport {
    Supported,
    Unsupported { reason: String },
}

impl EncoderSupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, EncoderSupport::Supported)
    }
}
