//! Export orchestration.
//!
//! An [`Exporter`] runs one job at a time through
//! `Idle → Initializing → Exporting(Rendering → Finalizing) → {Completed, Cancelled, Failed}`.
//! The video path, the audio path and the mux loop run concurrently on the
//! calling task. Every handle opened for a run lives in [`ExportResources`]
//! and is released exactly once when the run ends, whatever the outcome.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use screenreel_common::clock::{ExportStopwatch, FrameClock};
use screenreel_common::config::ExportDefaults;
use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_media_engine::backend::{
    AudioDecoder, AudioEncoder, Demuxer, MediaBackend, Muxer, VideoDecoder, VideoEncoder,
};
use screenreel_media_engine::types::{
    AudioCodec, AudioEncoderConfig, ContainerFormat, EncodedChunk, MuxerConfig, OutputArtifact,
    VideoCodec, VideoEncoderConfig,
};
use screenreel_project_model::project::{
    CanvasStyle, ExportFormat, ExportSettings, LoadedProject,
};
use screenreel_project_model::segments::SegmentPlan;
use screenreel_project_model::timeline::Timeline;

use crate::audio::AudioProcessor;
use crate::cancel::CancelHandle;
use crate::compositor::{FrameRenderer, RendererConfig};
use crate::decoder::StreamingDecoder;
use crate::encode::{create_muxer, create_video_encoder, is_keyframe, InFlight};

/// Everything needed to export one recording.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Source recording.
    pub source: PathBuf,

    /// Output file path.
    pub output_path: PathBuf,

    pub timeline: Timeline,
    pub style: CanvasStyle,
    pub settings: ExportSettings,

    /// Queue limits, keyframe cadence and audio bitrate.
    pub pipeline: ExportDefaults,

    /// Directory relative wallpaper paths are resolved against.
    pub asset_dir: Option<PathBuf>,
}

impl ExportJob {
    /// Build a job from a loaded project bundle.
    pub fn from_project(
        project: &LoadedProject,
        pipeline: &ExportDefaults,
        output_path: Option<PathBuf>,
    ) -> Self {
        Self {
            source: project.source_path(),
            output_path: output_path.unwrap_or_else(|| project.default_output_path()),
            timeline: project.timeline.clone(),
            style: project.project.style.clone(),
            settings: project.project.export.clone(),
            pipeline: pipeline.clone(),
            asset_dir: Some(project.root.clone()),
        }
    }
}

/// Progress callback. Invoked on the exporting task.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Which part of the run a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Extracting,
    Finalizing,
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Frames rendered and submitted so far, never above `total_frames`.
    ///
    /// Segments round their frame counts up individually, so a trimmed
    /// export can submit a few more frames than `total_frames`.
    pub current_frame: u64,

    pub total_frames: u64,

    /// Percent complete, capped at 100.
    pub percentage: f64,

    pub estimated_time_remaining_secs: f64,

    pub phase: ProgressPhase,

    /// Finalize progress in percent, only while finalizing.
    pub render_progress: Option<f64>,
}

impl ExportProgress {
    fn extracting(current_frame: u64, total_frames: u64, eta_secs: f64) -> Self {
        Self {
            current_frame: current_frame.min(total_frames),
            total_frames,
            percentage: percentage(current_frame, total_frames),
            estimated_time_remaining_secs: eta_secs,
            phase: ProgressPhase::Extracting,
            render_progress: None,
        }
    }

    fn finalizing(current_frame: u64, total_frames: u64, fraction: f64) -> Self {
        Self {
            current_frame: current_frame.min(total_frames),
            total_frames,
            percentage: 100.0,
            estimated_time_remaining_secs: 0.0,
            phase: ProgressPhase::Finalizing,
            render_progress: Some((fraction * 100.0).clamp(0.0, 100.0)),
        }
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Sub-stage of an active export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Rendering,
    Finalizing,
}

/// Exporter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    Idle,
    Initializing,
    Exporting(ExportStage),
    Completed,
    Cancelled,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportState::Completed | ExportState::Cancelled | ExportState::Failed
        )
    }
}

/// How an export ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed(OutputArtifact),
    Cancelled,
    Failed(String),
}

impl ExportOutcome {
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        match self {
            ExportOutcome::Completed(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExportOutcome::Completed(_))
    }
}

/// Handles opened for one run.
#[derive(Default)]
pub struct ExportResources {
    video_demuxer: Option<Box<dyn Demuxer>>,
    video_decoder: Option<Box<dyn VideoDecoder>>,
    video_encoder: Option<Box<dyn VideoEncoder>>,
    audio_demuxer: Option<Box<dyn Demuxer>>,
    audio_decoder: Option<Box<dyn AudioDecoder>>,
    audio_encoder: Option<Box<dyn AudioEncoder>>,
    muxer: Option<Box<dyn Muxer>>,
}

impl ExportResources {
    /// Handles currently held.
    pub fn open_handles(&self) -> usize {
        [
            self.video_demuxer.is_some(),
            self.video_decoder.is_some(),
            self.video_encoder.is_some(),
            self.audio_demuxer.is_some(),
            self.audio_decoder.is_some(),
            self.audio_encoder.is_some(),
            self.muxer.is_some(),
        ]
        .iter()
        .filter(|open| **open)
        .count()
    }

    /// Close every held handle. Close failures are logged, never returned.
    /// Calling this again is a no-op.
    pub fn release(&mut self) {
        log_close("video encoder", self.video_encoder.take().map(|mut h| h.close()));
        log_close("audio encoder", self.audio_encoder.take().map(|mut h| h.close()));
        log_close("video decoder", self.video_decoder.take().map(|mut h| h.close()));
        log_close("audio decoder", self.audio_decoder.take().map(|mut h| h.close()));
        log_close("video demuxer", self.video_demuxer.take().map(|mut h| h.close()));
        log_close("audio demuxer", self.audio_demuxer.take().map(|mut h| h.close()));
        log_close("muxer", self.muxer.take().map(|mut h| h.close()));
    }
}

impl Drop for ExportResources {
    fn drop(&mut self) {
        self.release();
    }
}

fn log_close(handle: &str, result: Option<ScreenreelResult<()>>) {
    if let Some(Err(e)) = result {
        tracing::warn!(handle, error = %e, "Failed to close export handle");
    }
}

fn open<'a, T: ?Sized>(slot: &'a mut Option<Box<T>>, handle: &str) -> ScreenreelResult<&'a mut T> {
    slot.as_deref_mut()
        .ok_or_else(|| ScreenreelError::initialization(format!("{handle} is not open")))
}

/// User cancellation plus the internal abort raised when one path fails.
struct StopSignals {
    cancel: CancelHandle,
    aborted: AtomicBool,
}

impl StopSignals {
    fn new(cancel: CancelHandle) -> Self {
        Self {
            cancel,
            aborted: AtomicBool::new(false),
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.aborted.load(Ordering::SeqCst)
    }
}

/// Runs export jobs against a media backend.
pub struct Exporter {
    backend: Arc<dyn MediaBackend>,
    state: ExportState,
}

impl Exporter {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            state: ExportState::Idle,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Run `job` to completion, cancellation or failure.
    ///
    /// Once `cancel` is observed no further progress is reported and no
    /// output file is left behind.
    pub async fn export(
        &mut self,
        job: &ExportJob,
        progress: Option<ProgressCallback>,
        cancel: &CancelHandle,
    ) -> ExportOutcome {
        self.state = ExportState::Initializing;
        tracing::info!(
            source = %job.source.display(),
            output = %job.output_path.display(),
            format = ?job.settings.format,
            backend = self.backend.name(),
            "Starting export"
        );
        let stopwatch = ExportStopwatch::start();

        let mut resources = ExportResources::default();
        let result = self
            .run(job, progress.as_ref(), cancel, &mut resources)
            .await;
        resources.release();

        let outcome = match result {
            Ok(Some(artifact)) if cancel.is_cancelled() => {
                discard_output(&artifact.path);
                ExportOutcome::Cancelled
            }
            _ if cancel.is_cancelled() => ExportOutcome::Cancelled,
            Ok(Some(artifact)) => ExportOutcome::Completed(artifact),
            Ok(None) => ExportOutcome::Cancelled,
            Err(e) => ExportOutcome::Failed(e.to_string()),
        };

        self.state = match &outcome {
            ExportOutcome::Completed(artifact) => {
                tracing::info!(
                    output = %artifact.path.display(),
                    size_bytes = artifact.size_bytes,
                    elapsed_secs = stopwatch.elapsed_secs(),
                    "Export complete"
                );
                ExportState::Completed
            }
            ExportOutcome::Cancelled => {
                tracing::info!(elapsed_secs = stopwatch.elapsed_secs(), "Export cancelled");
                ExportState::Cancelled
            }
            ExportOutcome::Failed(reason) => {
                tracing::error!(error = %reason, "Export failed");
                ExportState::Failed
            }
        };
        outcome
    }

    /// `Ok(None)` means the run stopped on cancellation.
    async fn run(
        &mut self,
        job: &ExportJob,
        progress: Option<&ProgressCallback>,
        cancel: &CancelHandle,
        resources: &mut ExportResources,
    ) -> ScreenreelResult<Option<OutputArtifact>> {
        job.settings
            .validate()
            .map_err(|e| ScreenreelError::config(e.to_string()))?;
        job.timeline
            .validate()
            .map_err(|e| ScreenreelError::project(e.to_string()))?;

        let backend = Arc::clone(&self.backend);
        let info = backend.probe(&job.source)?;
        let plan = SegmentPlan::compute(info.duration_secs, &job.timeline.trims);
        let fps = job.settings.frame_rate() as f64;
        let total_frames = plan.total_frames(fps);
        if total_frames == 0 {
            return Err(ScreenreelError::initialization(format!(
                "nothing to export: {:.3}s of {:.3}s kept",
                plan.effective_duration(),
                info.duration_secs
            )));
        }

        let (width, height) = job.settings.output_size(info.width, info.height);
        tracing::info!(
            source_width = info.width,
            source_height = info.height,
            width,
            height,
            fps,
            segments = plan.len(),
            total_frames,
            has_audio = info.has_audio(),
            "Export plan ready"
        );

        let mut renderer = FrameRenderer::new(RendererConfig {
            width,
            height,
            source_width: info.width,
            source_height: info.height,
            style: job.style.clone(),
            crop: job.timeline.crop,
            zoom_regions: job.timeline.sorted_zoom_regions(),
            asset_dir: job.asset_dir.clone(),
        })?;

        let demuxer = resources
            .video_demuxer
            .insert(backend.open_video_demuxer(&job.source)?);
        resources.video_decoder = Some(backend.create_video_decoder(demuxer.config())?);

        let (codec, container) = match job.settings.format {
            ExportFormat::Mp4 => (VideoCodec::H264, ContainerFormat::Mp4),
            ExportFormat::Gif => (VideoCodec::Gif, ContainerFormat::Gif),
        };
        let video_config = VideoEncoderConfig {
            codec,
            width,
            height,
            frame_rate: fps,
            bitrate: job.settings.video_bitrate(width, height),
            keyframe_interval: job.pipeline.keyframe_interval,
        };
        resources.video_encoder = Some(create_video_encoder(backend.as_ref(), &video_config)?);

        // GIF has no audio track.
        let audio_info = match job.settings.format {
            ExportFormat::Mp4 => info.audio.clone(),
            ExportFormat::Gif => None,
        };
        if let Some(audio) = &audio_info {
            let demuxer = resources
                .audio_demuxer
                .insert(backend.open_audio_demuxer(&job.source)?);
            resources.audio_decoder = Some(backend.create_audio_decoder(demuxer.config())?);
            resources.audio_encoder = Some(backend.create_audio_encoder(&AudioEncoderConfig {
                codec: AudioCodec::Aac,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bitrate: job.pipeline.audio_bitrate,
            })?);
        }

        if let Some(parent) = job.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        resources.muxer = Some(create_muxer(
            backend.as_ref(),
            &MuxerConfig {
                format: container,
                output_path: job.output_path.clone(),
                width,
                height,
                frame_rate: fps,
                has_audio: audio_info.is_some(),
                looped: job.settings.gif.looped,
            },
        )?);

        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.state = ExportState::Exporting(ExportStage::Rendering);

        let ExportResources {
            video_demuxer,
            video_decoder,
            video_encoder,
            audio_demuxer,
            audio_decoder,
            audio_encoder,
            muxer,
        } = &mut *resources;
        let muxer = open(muxer, "muxer")?;
        let mut decoder = StreamingDecoder::new(
            open(video_demuxer, "video demuxer")?,
            open(video_decoder, "video decoder")?,
            &plan,
            fps,
            job.pipeline.max_decode_queue,
            cancel.clone(),
        );
        let audio = match (
            audio_demuxer.as_deref_mut(),
            audio_decoder.as_deref_mut(),
            audio_encoder.as_deref_mut(),
        ) {
            (Some(demuxer), Some(decoder), Some(encoder)) => {
                Some(AudioProcessor::new(demuxer, decoder, encoder, &plan))
            }
            _ => None,
        };

        let signals = StopSignals::new(cancel.clone());
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let audio_tx = audio.as_ref().map(|_| chunk_tx.clone());

        let video_path = VideoPath {
            decoder: &mut decoder,
            renderer: &mut renderer,
            encoder: open(video_encoder, "video encoder")?,
            chunks: chunk_tx,
            signals: &signals,
            total_frames,
            frame_duration_us: FrameClock::new(fps).frame_duration_us().round() as i64,
            keyframe_interval: job.pipeline.keyframe_interval,
            max_encode_queue: job.pipeline.max_encode_queue,
            progress,
        };

        let video_fut = async {
            let result = video_path.run().await;
            if result.is_err() {
                signals.abort();
            }
            result
        };
        let audio_fut = async {
            let (Some(processor), Some(tx)) = (audio, audio_tx) else {
                return Ok(None);
            };
            let result = processor.run(|| signals.should_stop(), &tx).await;
            if result.is_err() {
                signals.abort();
            }
            result.map(Some)
        };
        let mux_ref: &mut dyn Muxer = &mut *muxer;
        let mux_fut = async {
            let result = run_mux_loop(mux_ref, chunk_rx, &signals).await;
            if result.is_err() {
                signals.abort();
            }
            result
        };

        let (video_result, audio_result, mux_result) =
            tokio::join!(video_fut, audio_fut, mux_fut);
        let frames = video_result?;
        let audio_stats = audio_result?;
        let chunks_written = mux_result?;
        tracing::info!(
            frames,
            chunks_written,
            audio_chunks = audio_stats.map(|s| s.chunks_sent),
            "Streams complete"
        );

        if cancel.is_cancelled() {
            return Ok(None);
        }
        if frames == 0 {
            return Err(ScreenreelError::decode(
                "no source frames fall inside the kept segments",
            ));
        }

        self.state = ExportState::Exporting(ExportStage::Finalizing);
        let mut report = |fraction: f64| -> bool {
            if cancel.is_cancelled() {
                return false;
            }
            if let Some(cb) = progress {
                cb(ExportProgress::finalizing(frames, total_frames, fraction));
            }
            true
        };
        let artifact = muxer.finalize(&mut report).await?;
        Ok(Some(artifact))
    }
}

/// Render, encode and forward every output frame.
struct VideoPath<'a, 'd> {
    decoder: &'a mut StreamingDecoder<'d>,
    renderer: &'a mut FrameRenderer,
    encoder: &'a mut dyn VideoEncoder,
    chunks: UnboundedSender<EncodedChunk>,
    signals: &'a StopSignals,
    total_frames: u64,
    frame_duration_us: i64,
    keyframe_interval: u64,
    max_encode_queue: usize,
    progress: Option<&'a ProgressCallback>,
}

impl VideoPath<'_, '_> {
    /// Returns the number of frames submitted to the encoder.
    async fn run(mut self) -> ScreenreelResult<u64> {
        let stopwatch = ExportStopwatch::start();
        let mut in_flight = InFlight::new(self.max_encode_queue);
        let mut done = 0u64;

        while let Some(next) = self.decoder.next_frame().await? {
            if self.signals.should_stop() {
                return Ok(done);
            }
            let frame = self.renderer.render(
                &next.frame,
                next.export_timestamp_us,
                self.frame_duration_us,
            )?;

            while in_flight.is_full() {
                self.forward(&mut in_flight)?;
                if !in_flight.is_full() {
                    break;
                }
                if self.signals.should_stop() {
                    return Ok(done);
                }
                tokio::task::yield_now().await;
            }

            self.encoder
                .encode(&frame, is_keyframe(next.export_index, self.keyframe_interval))?;
            in_flight.submitted();
            self.forward(&mut in_flight)?;
            done += 1;

            if self.signals.should_stop() {
                return Ok(done);
            }
            if let Some(cb) = self.progress {
                cb(ExportProgress::extracting(
                    done,
                    self.total_frames,
                    stopwatch.eta_secs(done, self.total_frames),
                ));
            }
            tokio::task::yield_now().await;
        }

        if self.signals.should_stop() {
            return Ok(done);
        }
        self.encoder.finish().await?;
        self.forward(&mut in_flight)?;
        tracing::debug!(
            frames = done,
            scheduled = self.decoder.frames_scheduled(),
            "Video path finished"
        );
        Ok(done)
    }

    fn forward(&mut self, in_flight: &mut InFlight) -> ScreenreelResult<()> {
        while let Some(chunk) = self.encoder.poll_chunk()? {
            in_flight.emitted();
            if self.signals.should_stop() {
                continue;
            }
            if self.chunks.send(chunk).is_err() {
                if self.signals.should_stop() {
                    return Ok(());
                }
                return Err(ScreenreelError::mux("muxer stopped accepting video"));
            }
        }
        Ok(())
    }
}

/// Write chunks from both paths in arrival order until every sender is gone.
async fn run_mux_loop(
    muxer: &mut dyn Muxer,
    mut chunks: UnboundedReceiver<EncodedChunk>,
    signals: &StopSignals,
) -> ScreenreelResult<u64> {
    let mut written = 0u64;
    while let Some(chunk) = chunks.recv().await {
        if signals.should_stop() {
            break;
        }
        muxer.write_chunk(chunk).await?;
        written += 1;
    }
    Ok(written)
}

fn discard_output(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cancelled output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_is_capped() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(150, 300), 50.0);
        assert_eq!(percentage(301, 300), 100.0);
    }

    #[test]
    fn test_frame_count_is_capped_at_total() {
        let p = ExportProgress::extracting(302, 300, 0.0);
        assert_eq!(p.current_frame, 300);
        assert_eq!(p.percentage, 100.0);
        assert_eq!(ExportProgress::finalizing(302, 300, 0.5).current_frame, 300);
    }

    #[test]
    fn test_finalizing_report() {
        let p = ExportProgress::finalizing(300, 300, 0.25);
        assert_eq!(p.phase, ProgressPhase::Finalizing);
        assert_eq!(p.render_progress, Some(25.0));
        assert_eq!(p.percentage, 100.0);
    }

    #[test]
    fn test_progress_serializes_phase_lowercase() {
        let json = serde_json::to_value(ExportProgress::extracting(1, 2, 0.5)).unwrap();
        assert_eq!(json["phase"], "extracting");
        assert_eq!(json["percentage"], 50.0);
    }

    #[test]
    fn test_empty_resources_release_twice() {
        let mut resources = ExportResources::default();
        assert_eq!(resources.open_handles(), 0);
        resources.release();
        resources.release();
    }

    #[test]
    fn test_terminal_states() {
        assert!(ExportState::Cancelled.is_terminal());
        assert!(!ExportState::Exporting(ExportStage::Rendering).is_terminal());
    }
}
