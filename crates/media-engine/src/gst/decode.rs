//! Decoders: `appsrc ! decodebin ! convert ! appsink` producing RGBA frames
//! or interleaved F32LE audio.

use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;
use image::RgbaImage;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use super::{caps_int, sample_bytes, sample_pts_us, timed_buffer, AppBridge};
use crate::backend::{AudioDecoder, VideoDecoder};
use crate::types::{AudioBuffer, DecodedFrame, EncodedPacket, StreamConfig};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

fn launch_decoder(
    name: &'static str,
    config: &StreamConfig,
    output: &str,
) -> ScreenreelResult<AppBridge> {
    let caps: gst::Caps = config.codec.parse().map_err(|_| {
        ScreenreelError::initialization(format!("Unrecognized stream caps: {}", config.codec))
    })?;
    let launch = format!(
        "appsrc name=src format=time ! decodebin ! {output} ! appsink name=sink sync=false max-buffers=32"
    );
    AppBridge::launch(name, &launch, caps, ScreenreelError::decode)
}

fn packet_buffer(packet: EncodedPacket) -> gst::Buffer {
    let mut buffer = timed_buffer(packet.data, packet.timestamp_us, packet.duration_us);
    if !packet.keyframe {
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_flags(gst::BufferFlags::DELTA_UNIT);
        }
    }
    buffer
}

pub struct GstVideoDecoder {
    bridge: AppBridge,
}

impl GstVideoDecoder {
    pub fn new(config: &StreamConfig) -> ScreenreelResult<Self> {
        Ok(Self {
            bridge: launch_decoder(
                "video-decode",
                config,
                "videoconvert ! video/x-raw,format=RGBA",
            )?,
        })
    }
}

/// Wrap an RGBA sample as an image, dropping any row padding.
fn sample_to_frame(sample: &gst::Sample) -> ScreenreelResult<DecodedFrame> {
    let width = caps_int(sample, "width")
        .ok_or_else(|| ScreenreelError::decode("decoded frame has no width"))? as u32;
    let height = caps_int(sample, "height")
        .ok_or_else(|| ScreenreelError::decode("decoded frame has no height"))? as u32;
    let data = sample_bytes(sample).map_err(ScreenreelError::decode)?;

    let row = width as usize * 4;
    let stride = if height == 0 { 0 } else { data.len() / height as usize };
    let pixels = if stride == row {
        data
    } else if stride > row {
        data.chunks(stride)
            .take(height as usize)
            .flat_map(|line| line[..row].iter().copied())
            .collect()
    } else {
        return Err(ScreenreelError::decode(format!(
            "decoded frame is {} bytes, too small for {width}x{height} RGBA",
            data.len()
        )));
    };

    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| ScreenreelError::decode("decoded frame size mismatch"))?;
    Ok(DecodedFrame::new(sample_pts_us(sample), image))
}

#[async_trait]
impl VideoDecoder for GstVideoDecoder {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()> {
        self.bridge.push(packet_buffer(packet))
    }

    fn decode_queue_size(&self) -> usize {
        self.bridge.backlog()
    }

    fn poll_frame(&mut self) -> ScreenreelResult<Option<DecodedFrame>> {
        match self.bridge.next()? {
            Some(sample) => sample_to_frame(&sample).map(Some),
            None => Ok(None),
        }
    }

    async fn flush(&mut self) -> ScreenreelResult<()> {
        self.bridge.end(FLUSH_TIMEOUT).await
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.bridge.close()
    }
}

pub struct GstAudioDecoder {
    bridge: AppBridge,
}

impl GstAudioDecoder {
    pub fn new(config: &StreamConfig) -> ScreenreelResult<Self> {
        Ok(Self {
            bridge: launch_decoder(
                "audio-decode",
                config,
                "audioconvert ! audio/x-raw,format=F32LE,layout=interleaved",
            )?,
        })
    }
}

fn sample_to_audio(sample: &gst::Sample) -> ScreenreelResult<AudioBuffer> {
    let sample_rate = caps_int(sample, "rate")
        .ok_or_else(|| ScreenreelError::decode("decoded audio has no rate"))? as u32;
    let channels = caps_int(sample, "channels")
        .ok_or_else(|| ScreenreelError::decode("decoded audio has no channel count"))?
        as u16;
    let data = sample_bytes(sample).map_err(ScreenreelError::decode)?;
    let samples = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(AudioBuffer {
        timestamp_us: sample_pts_us(sample),
        sample_rate,
        channels,
        samples,
    })
}

#[async_trait]
impl AudioDecoder for GstAudioDecoder {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()> {
        self.bridge.push(packet_buffer(packet))
    }

    fn poll_buffer(&mut self) -> ScreenreelResult<Option<AudioBuffer>> {
        match self.bridge.next()? {
            Some(sample) => sample_to_audio(&sample).map(Some),
            None => Ok(None),
        }
    }

    async fn flush(&mut self) -> ScreenreelResult<()> {
        self.bridge.end(FLUSH_TIMEOUT).await
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.bridge.close()
    }
}
