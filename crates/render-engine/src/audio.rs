//! Audio path: demux, decode, cut to the kept segments, re-encode.
//!
//! Runs alongside the video path and forwards encoded chunks to the mux
//! loop in the order the encoder emits them.

use tokio::sync::mpsc::UnboundedSender;

use screenreel_common::clock::{secs_to_us, us_to_secs};
use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_media_engine::backend::{AudioDecoder, AudioEncoder, Demuxer};
use screenreel_media_engine::types::{AudioBuffer, EncodedChunk};
use screenreel_project_model::segments::SegmentPlan;

/// Counters reported when the audio path finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioStats {
    pub packets: u64,
    pub buffers_decoded: u64,
    pub buffers_dropped: u64,
    pub chunks_sent: u64,
}

/// Pieces of `buffer` that fall inside kept segments, each re-stamped onto
/// the export timeline.
pub fn retime_buffer(buffer: &AudioBuffer, plan: &SegmentPlan) -> Vec<AudioBuffer> {
    if buffer.sample_rate == 0 || buffer.frames() == 0 {
        return Vec::new();
    }
    let rate = buffer.sample_rate as f64;
    let start = us_to_secs(buffer.timestamp_us);
    let end = start + buffer.frames() as f64 / rate;

    let mut pieces = Vec::new();
    for segment in plan.segments() {
        let from = start.max(segment.start_sec);
        let to = end.min(segment.end_sec);
        if to <= from {
            continue;
        }
        let first = ((from - start) * rate).round() as usize;
        let last = ((to - start) * rate).round() as usize;
        if last <= first {
            continue;
        }
        let Some(export_sec) = plan.source_to_export(from) else {
            continue;
        };
        let mut piece = buffer.slice_frames(first, last);
        piece.timestamp_us = secs_to_us(export_sec);
        pieces.push(piece);
    }
    pieces
}

/// One run of the audio path over borrowed handles.
pub struct AudioProcessor<'a> {
    demuxer: &'a mut dyn Demuxer,
    decoder: &'a mut dyn AudioDecoder,
    encoder: &'a mut dyn AudioEncoder,
    plan: &'a SegmentPlan,
    stats: AudioStats,
}

impl<'a> AudioProcessor<'a> {
    pub fn new(
        demuxer: &'a mut dyn Demuxer,
        decoder: &'a mut dyn AudioDecoder,
        encoder: &'a mut dyn AudioEncoder,
        plan: &'a SegmentPlan,
    ) -> Self {
        Self {
            demuxer,
            decoder,
            encoder,
            plan,
            stats: AudioStats::default(),
        }
    }

    /// Process the whole stream. Returns early, without error, once
    /// `should_stop` reports true; nothing is sent after that point.
    pub async fn run<S>(
        mut self,
        should_stop: S,
        chunks: &UnboundedSender<EncodedChunk>,
    ) -> ScreenreelResult<AudioStats>
    where
        S: Fn() -> bool,
    {
        loop {
            if should_stop() {
                return Ok(self.stats);
            }
            match self.demuxer.read_packet().await? {
                Some(packet) => {
                    self.stats.packets += 1;
                    self.decoder.decode(packet)?;
                    self.pump(&should_stop, chunks)?;
                }
                None => break,
            }
            // Let the video path and mux loop make progress between packets.
            tokio::task::yield_now().await;
        }

        self.decoder.flush().await?;
        self.pump(&should_stop, chunks)?;
        if should_stop() {
            return Ok(self.stats);
        }
        self.encoder.finish().await?;
        self.forward(&should_stop, chunks)?;

        tracing::debug!(
            packets = self.stats.packets,
            decoded = self.stats.buffers_decoded,
            dropped = self.stats.buffers_dropped,
            chunks = self.stats.chunks_sent,
            "Audio path finished"
        );
        Ok(self.stats)
    }

    /// Move decoded buffers through the trim filter into the encoder, then
    /// forward whatever the encoder produced.
    fn pump<S: Fn() -> bool>(
        &mut self,
        should_stop: &S,
        chunks: &UnboundedSender<EncodedChunk>,
    ) -> ScreenreelResult<()> {
        while let Some(buffer) = self.decoder.poll_buffer()? {
            self.stats.buffers_decoded += 1;
            let pieces = retime_buffer(&buffer, self.plan);
            if pieces.is_empty() {
                self.stats.buffers_dropped += 1;
            }
            for piece in &pieces {
                self.encoder.encode(piece)?;
            }
        }
        self.forward(should_stop, chunks)
    }

    fn forward<S: Fn() -> bool>(
        &mut self,
        should_stop: &S,
        chunks: &UnboundedSender<EncodedChunk>,
    ) -> ScreenreelResult<()> {
        while let Some(chunk) = self.encoder.poll_chunk()? {
            if should_stop() {
                return Ok(());
            }
            if chunks.send(chunk).is_err() {
                if should_stop() {
                    return Ok(());
                }
                return Err(ScreenreelError::mux("muxer stopped accepting audio"));
            }
            self.stats.chunks_sent += 1;
        }
        Ok(())
    }
}
