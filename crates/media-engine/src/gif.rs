//! Pure-Rust GIF output.
//!
//! [`GifEncoder`] quantizes each rendered frame to a local 256-color
//! palette. [`GifMuxer`] keeps the quantized frames in memory and writes the
//! whole file at finalize, reporting progress per frame. Audio chunks are
//! ignored since GIF has no audio track.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use async_trait::async_trait;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use crate::backend::{FinalizeProgress, Muxer, VideoEncoder};
use crate::types::{
    EncodedChunk, MuxerConfig, OutputArtifact, RenderedFrame, StreamConfig, StreamKind,
    VideoEncoderConfig,
};

/// Codec string carried in the first chunk's config.
pub const GIF_CODEC: &str = "image/gif";

/// NeuQuant sampling speed, 1 (best) to 30 (fastest).
const QUANTIZE_SPEED: i32 = 10;

/// Largest side a GIF frame can have.
const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Delay of frame `index` in centiseconds.
///
/// GIF delays are whole centiseconds, so rates like 30 fps cannot be hit
/// exactly per frame. Rounding the cumulative end time instead of each delay
/// keeps the total duration exact over the animation.
pub fn frame_delay_cs(index: u64, frame_rate: f64) -> u16 {
    if !(frame_rate > 0.0) {
        return 10;
    }
    let end = ((index + 1) as f64 * 100.0 / frame_rate).round();
    let start = (index as f64 * 100.0 / frame_rate).round();
    (end - start).clamp(1.0, u16::MAX as f64) as u16
}

/// Pack a palette and index buffer into chunk bytes:
/// `[palette_len: u32 LE][palette][indices]`.
fn pack_frame(palette: &[u8], indices: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + palette.len() + indices.len());
    data.extend_from_slice(&(palette.len() as u32).to_le_bytes());
    data.extend_from_slice(palette);
    data.extend_from_slice(indices);
    data
}

fn unpack_frame(data: &[u8]) -> ScreenreelResult<(&[u8], &[u8])> {
    let header: [u8; 4] = data
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| ScreenreelError::mux("GIF chunk is truncated"))?;
    let palette_len = u32::from_le_bytes(header) as usize;
    let body = &data[4..];
    if palette_len > body.len() || palette_len % 3 != 0 {
        return Err(ScreenreelError::mux(format!(
            "GIF chunk palette length {palette_len} is invalid"
        )));
    }
    Ok(body.split_at(palette_len))
}

/// Quantizing GIF "encoder".
pub struct GifEncoder {
    width: u16,
    height: u16,
    pending: VecDeque<EncodedChunk>,
    config_sent: bool,
    closed: bool,
}

impl GifEncoder {
    pub fn new(config: &VideoEncoderConfig) -> ScreenreelResult<Self> {
        if config.width == 0
            || config.height == 0
            || config.width > MAX_DIMENSION
            || config.height > MAX_DIMENSION
        {
            return Err(ScreenreelError::capability(format!(
                "GIF output size {}x{} is not supported",
                config.width, config.height
            )));
        }
        Ok(Self {
            width: config.width as u16,
            height: config.height as u16,
            pending: VecDeque::new(),
            config_sent: false,
            closed: false,
        })
    }
}

#[async_trait]
impl VideoEncoder for GifEncoder {
    fn encode(&mut self, frame: &RenderedFrame, keyframe: bool) -> ScreenreelResult<()> {
        if self.closed {
            return Err(ScreenreelError::encode("GIF encoder is closed"));
        }
        if frame.image.width() != self.width as u32 || frame.image.height() != self.height as u32 {
            return Err(ScreenreelError::encode(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.image.width(),
                frame.image.height(),
                self.width,
                self.height
            )));
        }

        let mut pixels = frame.image.as_raw().clone();
        let quantized =
            ::gif::Frame::from_rgba_speed(self.width, self.height, &mut pixels, QUANTIZE_SPEED);
        let palette = quantized.palette.as_deref().unwrap_or(&[]);

        let config = if self.config_sent {
            None
        } else {
            self.config_sent = true;
            Some(StreamConfig {
                width: Some(self.width as u32),
                height: Some(self.height as u32),
                ..StreamConfig::new(GIF_CODEC)
            })
        };

        self.pending.push_back(EncodedChunk {
            kind: StreamKind::Video,
            data: pack_frame(palette, &quantized.buffer),
            timestamp_us: frame.timestamp_us,
            duration_us: frame.duration_us,
            keyframe,
            config,
        });
        Ok(())
    }

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>> {
        Ok(self.pending.pop_front())
    }

    async fn finish(&mut self) -> ScreenreelResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}

/// Buffers quantized frames and writes the GIF file at finalize.
pub struct GifMuxer {
    output_path: PathBuf,
    width: u16,
    height: u16,
    frame_rate: f64,
    looped: bool,
    frames: Vec<::gif::Frame<'static>>,
    finalized: bool,
    closed: bool,
}

impl GifMuxer {
    pub fn new(config: &MuxerConfig) -> ScreenreelResult<Self> {
        if config.width == 0
            || config.height == 0
            || config.width > MAX_DIMENSION
            || config.height > MAX_DIMENSION
        {
            return Err(ScreenreelError::initialization(format!(
                "GIF canvas {}x{} is not supported",
                config.width, config.height
            )));
        }
        Ok(Self {
            output_path: config.output_path.clone(),
            width: config.width as u16,
            height: config.height as u16,
            frame_rate: config.frame_rate,
            looped: config.looped,
            frames: Vec::new(),
            finalized: false,
            closed: false,
        })
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    fn write_file(&mut self, progress: FinalizeProgress<'_>) -> ScreenreelResult<()> {
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.output_path)?;
        let mut encoder = ::gif::Encoder::new(BufWriter::new(file), self.width, self.height, &[])
            .map_err(|e| ScreenreelError::mux(format!("Failed to start GIF: {e}")))?;
        // Without a NETSCAPE extension the animation plays once.
        if self.looped {
            encoder
                .set_repeat(::gif::Repeat::Infinite)
                .map_err(|e| ScreenreelError::mux(format!("Failed to set GIF loop: {e}")))?;
        }

        let total = self.frames.len();
        for (index, frame) in self.frames.iter_mut().enumerate() {
            frame.delay = frame_delay_cs(index as u64, self.frame_rate);
            encoder
                .write_frame(frame)
                .map_err(|e| ScreenreelError::mux(format!("Failed to write GIF frame {index}: {e}")))?;
            if !progress((index + 1) as f64 / total as f64) {
                return Err(ScreenreelError::mux("GIF finalize aborted"));
            }
        }

        let mut writer = encoder
            .into_inner()
            .map_err(|e| ScreenreelError::mux(format!("Failed to finish GIF: {e}")))?;
        std::io::Write::flush(&mut writer)?;
        Ok(())
    }
}

#[async_trait]
impl Muxer for GifMuxer {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> ScreenreelResult<()> {
        if self.closed || self.finalized {
            return Err(ScreenreelError::mux("GIF muxer no longer accepts chunks"));
        }
        if chunk.kind == StreamKind::Audio {
            tracing::trace!(timestamp_us = chunk.timestamp_us, "Dropping audio chunk for GIF output");
            return Ok(());
        }

        let (palette, indices) = unpack_frame(&chunk.data)?;
        let expected = self.width as usize * self.height as usize;
        if indices.len() != expected {
            return Err(ScreenreelError::mux(format!(
                "GIF frame has {} pixels, expected {expected}",
                indices.len()
            )));
        }
        self.frames.push(::gif::Frame {
            width: self.width,
            height: self.height,
            palette: Some(palette.to_vec()),
            buffer: std::borrow::Cow::Owned(indices.to_vec()),
            ..::gif::Frame::default()
        });
        Ok(())
    }

    async fn finalize(&mut self, progress: FinalizeProgress<'_>) -> ScreenreelResult<OutputArtifact> {
        if self.closed || self.finalized {
            return Err(ScreenreelError::mux("GIF muxer already finished"));
        }
        if self.frames.is_empty() {
            return Err(ScreenreelError::mux("No frames were written"));
        }

        tracing::info!(
            frames = self.frames.len(),
            path = %self.output_path.display(),
            "Compiling GIF"
        );
        tokio::task::yield_now().await;
        self.write_file(progress)?;
        self.finalized = true;
        self.frames.clear();

        let size_bytes = std::fs::metadata(&self.output_path)?.len();
        Ok(OutputArtifact {
            path: self.output_path.clone(),
            size_bytes,
        })
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.frames.clear();
        if !self.finalized && self.output_path.exists() {
            std::fs::remove_file(&self.output_path)?;
        }
        Ok(())
    }
}
