//! Traits implemented by media backends.
//!
//! Reads and writes that touch the filesystem are async; codec calls are
//! synchronous and polled. A decoder or encoder accepts input with
//! `decode`/`encode` and hands back output through `poll_*`, so the caller
//! decides when to drain and can apply its own queue limits.
//!
//! Every handle has an explicit `close`. Callers close handles themselves
//! on every exit path and log close failures instead of propagating them.

use std::path::Path;

use async_trait::async_trait;

use screenreel_common::error::ScreenreelResult;

use crate::types::{
    AudioBuffer, AudioEncoderConfig, DecodedFrame, DecodedVideoInfo, EncodedChunk, EncodedPacket,
    EncoderSupport, HardwareAcceleration, MuxerConfig, OutputArtifact, RenderedFrame,
    StreamConfig, VideoEncoderConfig,
};

/// Forward-only reader of one elementary stream.
#[async_trait]
pub trait Demuxer: Send {
    /// Decoder configuration for the stream.
    fn config(&self) -> &StreamConfig;

    /// Next packet in decode order, `None` at end of stream.
    async fn read_packet(&mut self) -> ScreenreelResult<Option<EncodedPacket>>;

    fn close(&mut self) -> ScreenreelResult<()>;
}

#[async_trait]
pub trait VideoDecoder: Send {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()>;

    /// Packets accepted but not yet decoded, plus decoded frames waiting
    /// to be polled.
    fn decode_queue_size(&self) -> usize;

    fn poll_frame(&mut self) -> ScreenreelResult<Option<DecodedFrame>>;

    /// Signal end of input and wait until every remaining frame is pollable.
    async fn flush(&mut self) -> ScreenreelResult<()>;

    fn close(&mut self) -> ScreenreelResult<()>;
}

#[async_trait]
pub trait AudioDecoder: Send {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()>;

    fn poll_buffer(&mut self) -> ScreenreelResult<Option<AudioBuffer>>;

    /// Signal end of input and wait until every remaining buffer is pollable.
    async fn flush(&mut self) -> ScreenreelResult<()>;

    fn close(&mut self) -> ScreenreelResult<()>;
}

#[async_trait]
pub trait VideoEncoder: Send {
    /// Submit one frame. `keyframe` requests an IDR at this frame.
    fn encode(&mut self, frame: &RenderedFrame, keyframe: bool) -> ScreenreelResult<()>;

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>>;

    /// Signal end of input and wait until every remaining chunk is pollable.
    async fn finish(&mut self) -> ScreenreelResult<()>;

    fn close(&mut self) -> ScreenreelResult<()>;
}

#[async_trait]
pub trait AudioEncoder: Send {
    fn encode(&mut self, buffer: &AudioBuffer) -> ScreenreelResult<()>;

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>>;

    async fn finish(&mut self) -> ScreenreelResult<()>;

    fn close(&mut self) -> ScreenreelResult<()>;
}

/// Callback receiving finalize progress in `[0, 1]`. Returning `false`
/// aborts the finalize.
pub type FinalizeProgress<'a> = &'a mut (dyn FnMut(f64) -> bool + Send);

/// Container writer. Chunks arrive in per-stream order but with arbitrary
/// interleaving between streams.
#[async_trait]
pub trait Muxer: Send {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> ScreenreelResult<()>;

    /// Flush indexes and trailers and close the file.
    async fn finalize(&mut self, progress: FinalizeProgress<'_>) -> ScreenreelResult<OutputArtifact>;

    /// Abandon the output. Safe after `finalize`.
    fn close(&mut self) -> ScreenreelResult<()>;
}

/// Factory for platform demuxers, codecs and containers.
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Read source metadata.
    fn probe(&self, source: &Path) -> ScreenreelResult<DecodedVideoInfo>;

    fn open_video_demuxer(&self, source: &Path) -> ScreenreelResult<Box<dyn Demuxer>>;

    fn open_audio_demuxer(&self, source: &Path) -> ScreenreelResult<Box<dyn Demuxer>>;

    fn create_video_decoder(&self, config: &StreamConfig)
        -> ScreenreelResult<Box<dyn VideoDecoder>>;

    fn create_audio_decoder(&self, config: &StreamConfig)
        -> ScreenreelResult<Box<dyn AudioDecoder>>;

    /// Whether `config` can be encoded with the given preference.
    fn probe_video_encoder(
        &self,
        config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> EncoderSupport;

    fn create_video_encoder(
        &self,
        config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> ScreenreelResult<Box<dyn VideoEncoder>>;

    fn create_audio_encoder(&self, config: &AudioEncoderConfig)
        -> ScreenreelResult<Box<dyn AudioEncoder>>;

    fn create_muxer(&self, config: &MuxerConfig) -> ScreenreelResult<Box<dyn Muxer>>;
}
