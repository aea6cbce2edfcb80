//! Kept-segment planning.
//!
//! Trims are subtracted from `[0, duration)` to produce the ordered list of
//! source intervals that survive into the export. Every other part of the
//! pipeline (frame counts, frame routing, audio re-timing) is driven by the
//! resulting [`SegmentPlan`].

use serde::{Deserialize, Serialize};

use screenreel_common::clock::frame_count;

use crate::timeline::TrimRegion;

/// A maximal kept interval `[start_sec, end_sec)` of source time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_sec: f64,
    pub end_sec: f64,
}

impl Segment {
    pub fn new(start_sec: f64, end_sec: f64) -> Self {
        Self { start_sec, end_sec }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    /// Half-open containment.
    pub fn contains(&self, source_sec: f64) -> bool {
        source_sec >= self.start_sec && source_sec < self.end_sec
    }

    /// Output frames this segment produces at `fps`.
    pub fn frame_count(&self, fps: f64) -> u64 {
        frame_count(self.duration_secs(), fps)
    }
}

/// Ordered, non-overlapping kept segments for one source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentPlan {
    segments: Vec<Segment>,
    source_duration_secs: f64,
}

impl SegmentPlan {
    /// Subtract `trims` from `[0, duration_secs)`.
    ///
    /// Trims are sorted by start and walked with a cursor that only moves
    /// forward, so overlapping or adjacent trims merge naturally. Trims that
    /// start past the end of the source are clamped to it. Malformed trims
    /// (end not after start) are ignored.
    pub fn compute(duration_secs: f64, trims: &[TrimRegion]) -> Self {
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Self::default();
        }

        let mut sorted: Vec<&TrimRegion> = trims
            .iter()
            .filter(|t| t.start_ms.is_finite() && t.end_ms.is_finite() && t.end_ms > t.start_ms)
            .collect();
        sorted.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));

        let mut segments = Vec::with_capacity(sorted.len() + 1);
        let mut cursor = 0.0_f64;

        for trim in sorted {
            let trim_start = (trim.start_ms / 1000.0).min(duration_secs);
            let trim_end = trim.end_ms / 1000.0;
            if cursor < trim_start {
                segments.push(Segment::new(cursor, trim_start));
            }
            cursor = cursor.max(trim_end);
        }

        if cursor < duration_secs {
            segments.push(Segment::new(cursor, duration_secs));
        }

        Self {
            segments,
            source_duration_secs: duration_secs,
        }
    }

    /// Plan covering the whole source.
    pub fn untrimmed(duration_secs: f64) -> Self {
        Self::compute(duration_secs, &[])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn source_duration_secs(&self) -> f64 {
        self.source_duration_secs
    }

    /// Sum of kept segment durations.
    pub fn effective_duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration_secs).sum()
    }

    /// `ceil(effective_duration * fps)`.
    pub fn total_frames(&self, fps: f64) -> u64 {
        frame_count(self.effective_duration(), fps)
    }

    /// Per-segment output frame counts at `fps`.
    ///
    /// The sum can exceed [`total_frames`](Self::total_frames) by up to one
    /// frame per segment boundary since each segment rounds up on its own.
    pub fn segment_frame_counts(&self, fps: f64) -> Vec<u64> {
        self.segments.iter().map(|s| s.frame_count(fps)).collect()
    }

    /// Whether a source time survives trimming.
    pub fn contains(&self, source_sec: f64) -> bool {
        self.segments.iter().any(|s| s.contains(source_sec))
    }

    /// Map a source time onto the trimmed export timeline.
    ///
    /// Returns `None` for times inside a trim or past the end of the source.
    pub fn source_to_export(&self, source_sec: f64) -> Option<f64> {
        let mut offset = 0.0;
        for segment in &self.segments {
            if segment.contains(source_sec) {
                return Some(offset + (source_sec - segment.start_sec));
            }
            if source_sec < segment.start_sec {
                return None;
            }
            offset += segment.duration_secs();
        }
        None
    }
}
