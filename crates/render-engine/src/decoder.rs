//! Streaming decoder: one forward pass over the source, delivering frames
//! at a constant output rate for the kept segments only.
//!
//! Every packet is decoded (inter-frame state needs them all) but frames in
//! trimmed ranges are dropped. Kept frames are buffered per segment and
//! resampled to `ceil(duration × rate)` output frames when the segment
//! completes, duplicating or skipping source frames as needed. A segment
//! that received no frames repeats the most recent kept frame, or waits for
//! the first kept frame when none came before it. Held frames carry the
//! source times of the slots they fill, never a time inside a trim.

use std::collections::VecDeque;

use screenreel_common::clock::{secs_to_us, FrameClock};
use screenreel_common::error::ScreenreelResult;
use screenreel_media_engine::backend::{Demuxer, VideoDecoder};
use screenreel_media_engine::types::DecodedFrame;
use screenreel_project_model::segments::{Segment, SegmentPlan};

use crate::cancel::CancelHandle;

/// A frame scheduled for rendering.
#[derive(Debug, Clone)]
pub struct ResampledFrame {
    /// Position on the export timeline.
    pub export_index: u64,
    pub export_timestamp_us: i64,

    /// The decoded frame, shared with any other output it was duplicated to.
    pub frame: DecodedFrame,
}

impl ResampledFrame {
    pub fn source_timestamp_us(&self) -> i64 {
        self.frame.timestamp_us
    }
}

/// Pull-based decoder over borrowed demuxer and decoder handles.
///
/// The handles stay owned by the caller, who closes them on every exit
/// path.
pub struct StreamingDecoder<'a> {
    demuxer: &'a mut dyn Demuxer,
    decoder: &'a mut dyn VideoDecoder,
    segments: Vec<Segment>,
    clock: FrameClock,
    max_decode_queue: usize,
    cancel: CancelHandle,

    segment_idx: usize,
    segment_buffer: Vec<DecodedFrame>,
    last_kept: Option<DecodedFrame>,
    /// Source times of slots waiting for the first kept frame.
    deferred: Vec<i64>,
    output: VecDeque<ResampledFrame>,
    export_index: u64,
    packets_read: u64,
    frames_decoded: u64,
    input_done: bool,
    finished: bool,
}

impl<'a> StreamingDecoder<'a> {
    pub fn new(
        demuxer: &'a mut dyn Demuxer,
        decoder: &'a mut dyn VideoDecoder,
        plan: &SegmentPlan,
        fps: f64,
        max_decode_queue: usize,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            demuxer,
            decoder,
            segments: plan.segments().to_vec(),
            clock: FrameClock::new(fps),
            max_decode_queue: max_decode_queue.max(1),
            cancel,
            segment_idx: 0,
            segment_buffer: Vec::new(),
            last_kept: None,
            deferred: Vec::new(),
            output: VecDeque::new(),
            export_index: 0,
            packets_read: 0,
            frames_decoded: 0,
            input_done: false,
            finished: false,
        }
    }

    /// Output frames delivered or queued so far.
    pub fn frames_scheduled(&self) -> u64 {
        self.export_index
    }

    /// Next output frame, `None` at end of stream or after cancellation.
    pub async fn next_frame(&mut self) -> ScreenreelResult<Option<ResampledFrame>> {
        loop {
            if self.cancel.is_cancelled() {
                self.output.clear();
                return Ok(None);
            }
            if let Some(frame) = self.output.pop_front() {
                return Ok(Some(frame));
            }
            if self.finished {
                return Ok(None);
            }

            if self.input_done {
                self.decoder.flush().await?;
                self.drain_decoder()?;
                self.flush_remaining_segments();
                self.finished = true;
                tracing::debug!(
                    packets = self.packets_read,
                    decoded = self.frames_decoded,
                    delivered = self.export_index,
                    "Video stream finished"
                );
                continue;
            }

            if self.decoder.decode_queue_size() >= self.max_decode_queue {
                self.drain_decoder()?;
                tokio::task::yield_now().await;
                continue;
            }

            match self.demuxer.read_packet().await? {
                Some(packet) => {
                    self.packets_read += 1;
                    self.decoder.decode(packet)?;
                    self.drain_decoder()?;
                }
                None => self.input_done = true,
            }
        }
    }

    fn drain_decoder(&mut self) -> ScreenreelResult<()> {
        while let Some(frame) = self.decoder.poll_frame()? {
            self.frames_decoded += 1;
            self.route(frame);
        }
        Ok(())
    }

    /// Place one decoded frame relative to the current segment.
    fn route(&mut self, frame: DecodedFrame) {
        let t = frame.timestamp_us as f64 / 1_000_000.0;

        while let Some(segment) = self.segments.get(self.segment_idx).copied() {
            if t < segment.end_sec {
                // Frames before the segment start are trimmed.
                if segment.contains(t) {
                    self.keep(frame);
                }
                return;
            }
            self.complete_segment();
        }
    }

    fn keep(&mut self, frame: DecodedFrame) {
        for slot_us in std::mem::take(&mut self.deferred) {
            self.push_output(frame.retimed(slot_us));
        }
        self.last_kept = Some(frame.clone());
        self.segment_buffer.push(frame);
    }

    /// Resample the buffered frames of the current segment and advance.
    fn complete_segment(&mut self) {
        let Some(segment) = self.segments.get(self.segment_idx).copied() else {
            return;
        };
        let count = segment.frame_count(self.clock.fps());
        let frames = std::mem::take(&mut self.segment_buffer);

        if frames.is_empty() {
            let slots = self.slot_times(&segment, count);
            match self.last_kept.clone() {
                Some(held) => {
                    tracing::trace!(
                        segment = self.segment_idx,
                        count,
                        "Segment received no frames; holding last kept frame"
                    );
                    for slot_us in slots {
                        self.push_output(held.retimed(slot_us));
                    }
                }
                None => {
                    tracing::trace!(
                        segment = self.segment_idx,
                        count,
                        "Segment received no frames; waiting for the first kept frame"
                    );
                    self.deferred.extend(slots);
                }
            }
        } else {
            let n = frames.len() as u64;
            for i in 0..count {
                let idx = resample_index(i, n, count) as usize;
                self.push_output(frames[idx].clone());
            }
        }

        self.segment_idx += 1;
    }

    fn flush_remaining_segments(&mut self) {
        while self.segment_idx < self.segments.len() {
            self.complete_segment();
        }
        if !self.deferred.is_empty() {
            tracing::warn!(
                slots = self.deferred.len(),
                "No source frame inside any kept segment; nothing to deliver"
            );
            self.deferred.clear();
        }
    }

    /// Source time of each output slot of `segment`, kept inside its bounds.
    fn slot_times(&self, segment: &Segment, count: u64) -> Vec<i64> {
        let start_us = secs_to_us(segment.start_sec);
        let last_us = (secs_to_us(segment.end_sec) - 1).max(start_us);
        (0..count)
            .map(|i| (start_us + self.clock.export_timestamp_us(i)).min(last_us))
            .collect()
    }

    fn push_output(&mut self, frame: DecodedFrame) {
        self.output.push_back(ResampledFrame {
            export_index: self.export_index,
            export_timestamp_us: self.clock.export_timestamp_us(self.export_index),
            frame,
        });
        self.export_index += 1;
    }
}

/// Source index used for output frame `i` of a segment with `n` buffered
/// frames and `count` output frames.
pub fn resample_index(i: u64, n: u64, count: u64) -> u64 {
    if n == 0 || count == 0 {
        return 0;
    }
    ((i * n) / count).min(n - 1)
}
