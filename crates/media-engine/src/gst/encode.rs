//! H.264 and AAC encoders: `appsrc ! convert ! <encoder> ! <parser> ! appsink`.
//!
//! Encoder elements differ in property names and bitrate units, so each
//! candidate carries its own launch fragment.

use std::time::Duration;

use async_trait::async_trait;
use gst::prelude::*;
use gstreamer as gst;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use super::{elements_available, sample_bytes, sample_pts_us, timed_buffer, AppBridge};
use crate::backend::{AudioEncoder, VideoEncoder};
use crate::types::{
    AudioBuffer, AudioCodec, AudioEncoderConfig, EncodedChunk, HardwareAcceleration, RenderedFrame,
    StreamConfig, StreamKind, VideoCodec, VideoEncoderConfig,
};

const FINISH_TIMEOUT: Duration = Duration::from_secs(60);

const H264_PLUMBING: &[&str] = &["appsrc", "appsink", "videoconvert", "h264parse"];
const HARDWARE_H264: &[&str] = &["vah264enc", "vaapih264enc", "nvh264enc", "vtenc_h264", "mfh264enc"];
const SOFTWARE_H264: &[&str] = &["x264enc", "openh264enc"];
const AAC_ENCODERS: &[&str] = &["avenc_aac", "fdkaacenc", "voaacenc"];

/// An installed encoder element and how to configure it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCandidate {
    pub element: &'static str,
    pub hardware: bool,
}

impl EncoderCandidate {
    /// Launch fragment for this element at the given settings.
    pub fn fragment(&self, config: &VideoEncoderConfig) -> String {
        let kbps = (config.bitrate / 1000).max(1);
        let gop = config.keyframe_interval.max(1);
        match self.element {
            "x264enc" => format!(
                "x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={gop}"
            ),
            "openh264enc" => format!("openh264enc bitrate={} gop-size={gop}", config.bitrate),
            "vah264enc" => format!("vah264enc bitrate={kbps} key-int-max={gop}"),
            "vaapih264enc" => format!("vaapih264enc bitrate={kbps} keyframe-period={gop}"),
            "nvh264enc" => format!("nvh264enc bitrate={kbps} gop-size={gop}"),
            "vtenc_h264" => format!("vtenc_h264 bitrate={kbps} max-keyframe-interval={gop}"),
            "mfh264enc" => format!("mfh264enc bitrate={kbps} gop-size={gop}"),
            other => other.to_string(),
        }
    }
}

/// First installed encoder matching the acceleration preference.
///
/// `PreferHardware` only considers hardware elements and `PreferSoftware`
/// only software ones; callers fall back from one to the other.
pub fn select_video_encoder(
    config: &VideoEncoderConfig,
    acceleration: HardwareAcceleration,
) -> Result<EncoderCandidate, String> {
    if config.codec != VideoCodec::H264 {
        return Err(format!("{:?} is not encoded through GStreamer", config.codec));
    }
    if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0 {
        return Err(format!(
            "H.264 needs non-zero even dimensions, got {}x{}",
            config.width, config.height
        ));
    }
    if config.frame_rate <= 0.0 {
        return Err(format!("invalid frame rate {}", config.frame_rate));
    }
    elements_available(H264_PLUMBING)?;

    let (elements, hardware) = match acceleration {
        HardwareAcceleration::PreferHardware => (HARDWARE_H264, true),
        HardwareAcceleration::PreferSoftware => (SOFTWARE_H264, false),
    };
    elements
        .iter()
        .copied()
        .find(|name| elements_available(&[*name]).is_ok())
        .map(|element| EncoderCandidate {
            element,
            hardware,
        })
        .ok_or_else(|| {
            format!(
                "no {} H.264 encoder installed (tried {})",
                if hardware { "hardware" } else { "software" },
                elements.join(", ")
            )
        })
}

/// Rational frame rate for caps, in thousandths.
fn frame_rate_fraction(fps: f64) -> gst::Fraction {
    let milli = (fps * 1000.0).round().max(1.0) as i32;
    gst::Fraction::new(milli, 1000)
}

/// Decoder configuration from the caps of the first encoded sample.
fn chunk_config(sample: &gst::Sample) -> Option<StreamConfig> {
    let caps = sample.caps()?;
    let structure = caps.structure(0)?;
    let mut config = StreamConfig::new(caps.to_string());
    config.description = structure
        .get::<gst::Buffer>("codec_data")
        .ok()
        .and_then(|b| b.map_readable().ok().map(|m| m.as_slice().to_vec()));
    config.width = structure.get::<i32>("width").ok().map(|v| v as u32);
    config.height = structure.get::<i32>("height").ok().map(|v| v as u32);
    config.sample_rate = structure.get::<i32>("rate").ok().map(|v| v as u32);
    config.channels = structure.get::<i32>("channels").ok().map(|v| v as u16);
    Some(config)
}

fn sample_to_chunk(
    sample: &gst::Sample,
    kind: StreamKind,
    with_config: bool,
) -> ScreenreelResult<EncodedChunk> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| ScreenreelError::encode("encoded sample has no buffer"))?;
    Ok(EncodedChunk {
        kind,
        timestamp_us: sample_pts_us(sample),
        duration_us: super::clock_to_us(buffer.duration()).unwrap_or(0),
        keyframe: !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT),
        data: sample_bytes(sample).map_err(ScreenreelError::encode)?,
        config: if with_config { chunk_config(sample) } else { None },
    })
}

pub struct GstVideoEncoder {
    bridge: AppBridge,
    element: &'static str,
    sent_config: bool,
}

impl GstVideoEncoder {
    pub fn new(config: &VideoEncoderConfig, candidate: EncoderCandidate) -> ScreenreelResult<Self> {
        let src_caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .field("framerate", frame_rate_fraction(config.frame_rate))
            .build();
        let launch = format!(
            "appsrc name=src format=time ! videoconvert ! {} ! h264parse config-interval=-1 ! \
             video/x-h264,stream-format=avc,alignment=au ! appsink name=sink sync=false",
            candidate.fragment(config)
        );
        let bridge = AppBridge::launch("video-encode", &launch, src_caps, ScreenreelError::encode)?;
        tracing::info!(
            element = candidate.element,
            hardware = candidate.hardware,
            width = config.width,
            height = config.height,
            bitrate = config.bitrate,
            "Created H.264 encoder"
        );

        Ok(Self {
            bridge,
            element: candidate.element,
            sent_config: false,
        })
    }

    fn request_keyframe(&self) {
        let structure = gst::Structure::builder("GstForceKeyUnit")
            .field("all-headers", true)
            .build();
        let event = gst::event::CustomDownstream::new(structure);
        if !self.bridge.src.send_event(event) {
            tracing::trace!(element = self.element, "Encoder ignored keyframe request");
        }
    }
}

#[async_trait]
impl VideoEncoder for GstVideoEncoder {
    fn encode(&mut self, frame: &RenderedFrame, keyframe: bool) -> ScreenreelResult<()> {
        if keyframe {
            self.request_keyframe();
        }
        let buffer = timed_buffer(
            frame.image.as_raw().clone(),
            frame.timestamp_us,
            frame.duration_us,
        );
        self.bridge.push(buffer)
    }

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>> {
        let Some(sample) = self.bridge.next()? else {
            return Ok(None);
        };
        let chunk = sample_to_chunk(&sample, StreamKind::Video, !self.sent_config)?;
        self.sent_config = true;
        Ok(Some(chunk))
    }

    async fn finish(&mut self) -> ScreenreelResult<()> {
        self.bridge.end(FINISH_TIMEOUT).await
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.bridge.close()
    }
}

pub struct GstAudioEncoder {
    bridge: AppBridge,
    sent_config: bool,
}

impl GstAudioEncoder {
    pub fn new(config: &AudioEncoderConfig) -> ScreenreelResult<Self> {
        match config.codec {
            AudioCodec::Aac => {}
        }
        elements_available(&["appsrc", "appsink", "audioconvert", "audioresample", "aacparse"])
            .map_err(ScreenreelError::capability)?;
        let element = AAC_ENCODERS
            .iter()
            .copied()
            .find(|name| elements_available(&[*name]).is_ok())
            .ok_or_else(|| {
                ScreenreelError::capability(format!(
                    "no AAC encoder installed (tried {})",
                    AAC_ENCODERS.join(", ")
                ))
            })?;

        let src_caps = gst::Caps::builder("audio/x-raw")
            .field("format", "F32LE")
            .field("layout", "interleaved")
            .field("rate", config.sample_rate as i32)
            .field("channels", config.channels as i32)
            .build();
        let launch = format!(
            "appsrc name=src format=time ! audioconvert ! audioresample ! {element} bitrate={} ! \
             aacparse ! audio/mpeg,mpegversion=4,stream-format=raw ! appsink name=sink sync=false",
            config.bitrate
        );
        let bridge = AppBridge::launch("audio-encode", &launch, src_caps, ScreenreelError::encode)?;
        tracing::info!(
            element,
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate = config.bitrate,
            "Created AAC encoder"
        );

        Ok(Self {
            bridge,
            sent_config: false,
        })
    }
}

#[async_trait]
impl AudioEncoder for GstAudioEncoder {
    fn encode(&mut self, buffer: &AudioBuffer) -> ScreenreelResult<()> {
        let bytes: Vec<u8> = buffer
            .samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        self.bridge
            .push(timed_buffer(bytes, buffer.timestamp_us, buffer.duration_us()))
    }

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>> {
        let Some(sample) = self.bridge.next()? else {
            return Ok(None);
        };
        let chunk = sample_to_chunk(&sample, StreamKind::Audio, !self.sent_config)?;
        self.sent_config = true;
        Ok(Some(chunk))
    }

    async fn finish(&mut self) -> ScreenreelResult<()> {
        self.bridge.end(FINISH_TIMEOUT).await
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.bridge.close()
    }
}
