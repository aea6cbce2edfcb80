//! MP4 writer: `appsrc ! queue ! mp4mux ! filesink`, one appsrc per track.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;
use gstreamer_app as gst_app;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use super::{escape_path, timed_buffer, LaunchedPipeline};
use crate::backend::{FinalizeProgress, Muxer};
use crate::types::{EncodedChunk, MuxerConfig, OutputArtifact, StreamKind};

/// Time allowed for mp4mux to write its index after the last chunk.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// appsrc queue limit; pushes block once it is full.
const TRACK_QUEUE_BYTES: u64 = 16 * 1024 * 1024;

struct Track {
    src: gst_app::AppSrc,
    caps_set: bool,
    chunks: u64,
}

impl Track {
    fn new(pipeline: &LaunchedPipeline, name: &str) -> ScreenreelResult<Self> {
        Ok(Self {
            src: pipeline.app_src(name)?,
            caps_set: false,
            chunks: 0,
        })
    }
}

pub struct GstMp4Muxer {
    pipeline: LaunchedPipeline,
    output_path: PathBuf,
    video: Track,
    audio: Option<Track>,
    finalized: bool,
}

impl GstMp4Muxer {
    pub fn new(config: &MuxerConfig) -> ScreenreelResult<Self> {
        let src = |name: &str| {
            format!(
                "appsrc name={name} format=time block=true max-bytes={TRACK_QUEUE_BYTES} ! queue ! mux.{name}_0 "
            )
        };
        let mut launch = src("video");
        if config.has_audio {
            launch.push_str(&src("audio"));
        }
        launch.push_str(&format!(
            "mp4mux name=mux faststart=true ! filesink location=\"{}\"",
            escape_path(&config.output_path)
        ));

        let pipeline = LaunchedPipeline::launch("mp4-mux", &launch, ScreenreelError::mux)?;
        let video = Track::new(&pipeline, "video")?;
        let audio = if config.has_audio {
            Some(Track::new(&pipeline, "audio")?)
        } else {
            None
        };
        pipeline.play()?;

        tracing::info!(
            output = %config.output_path.display(),
            has_audio = config.has_audio,
            "Created MP4 muxer"
        );
        Ok(Self {
            pipeline,
            output_path: config.output_path.clone(),
            video,
            audio,
            finalized: false,
        })
    }

    fn remove_partial_output(&self) {
        if self.output_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.output_path) {
                tracing::warn!(
                    output = %self.output_path.display(),
                    error = %e,
                    "Failed to remove partial output"
                );
            }
        }
    }
}

#[async_trait]
impl Muxer for GstMp4Muxer {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> ScreenreelResult<()> {
        if self.finalized {
            return Err(ScreenreelError::mux("muxer already finalized"));
        }
        let track = match chunk.kind {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => self
                .audio
                .as_mut()
                .ok_or_else(|| ScreenreelError::mux("audio chunk for a muxer without audio"))?,
        };

        if !track.caps_set {
            let config = chunk.config.as_ref().ok_or_else(|| {
                ScreenreelError::mux(format!(
                    "first {:?} chunk carries no decoder configuration",
                    chunk.kind
                ))
            })?;
            let caps: gst::Caps = config.codec.parse().map_err(|_| {
                ScreenreelError::mux(format!("unparseable track caps: {}", config.codec))
            })?;
            track.src.set_caps(Some(&caps));
            track.caps_set = true;
        }

        let mut buffer = timed_buffer(chunk.data, chunk.timestamp_us, chunk.duration_us);
        if !chunk.keyframe {
            if let Some(buffer) = buffer.get_mut() {
                buffer.set_flags(gst::BufferFlags::DELTA_UNIT);
            }
        }

        let src = track.src.clone();
        tokio::task::spawn_blocking(move || src.push_buffer(buffer))
            .await
            .map_err(|e| ScreenreelError::mux(format!("mux write task failed: {e}")))?
            .map_err(|e| ScreenreelError::mux(format!("muxer rejected chunk: {e:?}")))?;
        track.chunks += 1;

        self.pipeline.check(ScreenreelError::mux)
    }

    async fn finalize(&mut self, progress: FinalizeProgress<'_>) -> ScreenreelResult<OutputArtifact> {
        if self.finalized {
            return Err(ScreenreelError::mux("muxer already finalized"));
        }
        for track in std::iter::once(&self.video).chain(self.audio.as_ref()) {
            track
                .src
                .end_of_stream()
                .map_err(|e| ScreenreelError::mux(format!("failed to end track: {e:?}")))?;
        }

        let pipeline = self.pipeline.pipeline.clone();
        let name = self.pipeline.name;
        tokio::task::spawn_blocking(move || {
            LaunchedPipeline::wait_for_eos(&pipeline, name, FINALIZE_TIMEOUT)
        })
        .await
        .map_err(|e| ScreenreelError::mux(format!("mux finalize task failed: {e}")))?
        .map_err(ScreenreelError::mux)?;
        self.pipeline.stop()?;

        if !progress(1.0) {
            return Err(ScreenreelError::mux("MP4 finalize aborted"));
        }
        self.finalized = true;

        let size_bytes = std::fs::metadata(&self.output_path)?.len();
        tracing::info!(
            output = %self.output_path.display(),
            size_bytes,
            video_chunks = self.video.chunks,
            audio_chunks = self.audio.as_ref().map(|t| t.chunks).unwrap_or(0),
            "MP4 finalized"
        );
        Ok(OutputArtifact {
            path: self.output_path.clone(),
            size_bytes,
        })
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        let stopped = self.pipeline.stop();
        if !self.finalized {
            self.remove_partial_output();
        }
        stopped
    }
}
