//! GStreamer-backed [`MediaBackend`].
//!
//! Every stage is a small `parse::launch` pipeline bridged to Rust through
//! `appsrc`/`appsink`:
//! - demux: `filesrc ! parsebin ! appsink`
//! - decode: `appsrc ! decodebin ! convert ! appsink` (RGBA / F32LE)
//! - encode: `appsrc ! convert ! <encoder> ! <parser> ! appsink`
//! - mux: `appsrc(s) ! mp4mux ! filesink`
//!
//! Blocking pulls and pushes run on tokio's blocking pool so the export
//! task keeps its single scheduling context responsive.

mod decode;
mod demux;
mod encode;
mod mux;
mod probe;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use crate::backend::{
    AudioDecoder, AudioEncoder, Demuxer, MediaBackend, Muxer, VideoDecoder, VideoEncoder,
};
use crate::types::{
    AudioEncoderConfig, ContainerFormat, DecodedVideoInfo, EncoderSupport, HardwareAcceleration,
    MuxerConfig, StreamConfig, StreamKind, VideoEncoderConfig,
};

pub use encode::{select_video_encoder, EncoderCandidate};

/// Backend built on the system GStreamer installation.
#[derive(Debug)]
pub struct GstBackend {
    _private: (),
}

impl GstBackend {
    pub fn new() -> ScreenreelResult<Self> {
        init_gstreamer()?;
        Ok(Self { _private: () })
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn probe(&self, source: &Path) -> ScreenreelResult<DecodedVideoInfo> {
        probe::probe_source(source)
    }

    fn open_video_demuxer(&self, source: &Path) -> ScreenreelResult<Box<dyn Demuxer>> {
        Ok(Box::new(demux::GstDemuxer::open(source, StreamKind::Video)?))
    }

    fn open_audio_demuxer(&self, source: &Path) -> ScreenreelResult<Box<dyn Demuxer>> {
        Ok(Box::new(demux::GstDemuxer::open(source, StreamKind::Audio)?))
    }

    fn create_video_decoder(
        &self,
        config: &StreamConfig,
    ) -> ScreenreelResult<Box<dyn VideoDecoder>> {
        Ok(Box::new(decode::GstVideoDecoder::new(config)?))
    }

    fn create_audio_decoder(
        &self,
        config: &StreamConfig,
    ) -> ScreenreelResult<Box<dyn AudioDecoder>> {
        Ok(Box::new(decode::GstAudioDecoder::new(config)?))
    }

    fn probe_video_encoder(
        &self,
        config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> EncoderSupport {
        match select_video_encoder(config, acceleration) {
            Ok(_) => EncoderSupport::Supported,
            Err(reason) => EncoderSupport::Unsupported { reason },
        }
    }

    fn create_video_encoder(
        &self,
        config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> ScreenreelResult<Box<dyn VideoEncoder>> {
        let candidate =
            select_video_encoder(config, acceleration).map_err(ScreenreelError::capability)?;
        Ok(Box::new(encode::GstVideoEncoder::new(config, candidate)?))
    }

    fn create_audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> ScreenreelResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(encode::GstAudioEncoder::new(config)?))
    }

    fn create_muxer(&self, config: &MuxerConfig) -> ScreenreelResult<Box<dyn Muxer>> {
        match config.format {
            ContainerFormat::Mp4 => Ok(Box::new(mux::GstMp4Muxer::new(config)?)),
            ContainerFormat::Gif => Err(ScreenreelError::unsupported(
                "GIF output is written by the built-in GIF muxer",
            )),
        }
    }
}

fn init_gstreamer() -> ScreenreelResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(ScreenreelError::initialization(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Whether every named element is installed.
fn elements_available(names: &[&str]) -> Result<(), String> {
    match names
        .iter()
        .find(|name| gst::ElementFactory::find(name).is_none())
    {
        Some(missing) => Err(format!("GStreamer element '{missing}' is not installed")),
        None => Ok(()),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

fn us_to_clock(us: i64) -> gst::ClockTime {
    gst::ClockTime::from_useconds(us.max(0) as u64)
}

fn clock_to_us(time: Option<gst::ClockTime>) -> Option<i64> {
    time.map(|t| t.useconds() as i64)
}

/// Copy a sample's payload out of GStreamer memory.
fn sample_bytes(sample: &gst::Sample) -> Result<Vec<u8>, String> {
    let buffer = sample.buffer().ok_or("sample has no buffer")?;
    let map = buffer
        .map_readable()
        .map_err(|e| format!("failed to map buffer: {e}"))?;
    Ok(map.as_slice().to_vec())
}

/// A launched pipeline plus the name it is logged under.
struct LaunchedPipeline {
    name: &'static str,
    pipeline: gst::Pipeline,
    stopped: bool,
}

impl LaunchedPipeline {
    fn launch(
        name: &'static str,
        launch: &str,
        error: fn(String) -> ScreenreelError,
    ) -> ScreenreelResult<Self> {
        init_gstreamer()?;
        tracing::debug!(pipeline = name, launch, "Building pipeline");

        let element = gst::parse::launch(launch)
            .map_err(|e| error(format!("Failed to build {name} pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| error(format!("{name} launch string did not produce a pipeline")))?;

        Ok(Self {
            name,
            pipeline,
            stopped: false,
        })
    }

    fn app_src(&self, element: &str) -> ScreenreelResult<gst_app::AppSrc> {
        self.pipeline
            .by_name(element)
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| {
                ScreenreelError::initialization(format!(
                    "{} pipeline has no appsrc named '{element}'",
                    self.name
                ))
            })
    }

    fn app_sink(&self, element: &str) -> ScreenreelResult<gst_app::AppSink> {
        self.pipeline
            .by_name(element)
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| {
                ScreenreelError::initialization(format!(
                    "{} pipeline has no appsink named '{element}'",
                    self.name
                ))
            })
    }

    fn play(&self) -> ScreenreelResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            ScreenreelError::initialization(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;
        Ok(())
    }

    /// First error posted on the bus since the last check, if any.
    fn take_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(e) => Some(match e.debug() {
                Some(debug) => format!("{} ({debug})", e.error()),
                None => e.error().to_string(),
            }),
            _ => None,
        }
    }

    fn check(&self, error: fn(String) -> ScreenreelError) -> ScreenreelResult<()> {
        match self.take_error() {
            Some(message) => Err(error(format!("{} pipeline failed: {message}", self.name))),
            None => Ok(()),
        }
    }

    /// Block until EOS reaches the sink end of the pipeline.
    fn wait_for_eos(pipeline: &gst::Pipeline, name: &str, deadline: Duration) -> Result<(), String> {
        let bus = pipeline.bus().ok_or("pipeline has no bus")?;
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(format!("{name} pipeline did not drain within {deadline:?}"));
            }
            let remaining = gst::ClockTime::from_nseconds((deadline - elapsed).as_nanos() as u64);
            let Some(msg) =
                bus.timed_pop_filtered(remaining, &[gst::MessageType::Eos, gst::MessageType::Error])
            else {
                continue;
            };
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    tracing::debug!(pipeline = name, "EOS received; pipeline drained");
                    return Ok(());
                }
                gst::MessageView::Error(e) => {
                    return Err(format!("{name} pipeline error during drain: {}", e.error()));
                }
                _ => {}
            }
        }
    }

    fn stop(&mut self) -> ScreenreelResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            ScreenreelError::Other(anyhow::anyhow!("Failed to stop {} pipeline: {e:?}", self.name))
        })?;
        Ok(())
    }
}

/// `appsrc ... appsink` pipeline that is fed buffers and drained of samples.
///
/// Samples are moved out of the appsink into `ready` on every push and poll,
/// so the appsink never fills up while the caller is still feeding input.
struct AppBridge {
    pipeline: LaunchedPipeline,
    src: gst_app::AppSrc,
    sink: gst_app::AppSink,
    ready: VecDeque<gst::Sample>,
    ended: bool,
    error: fn(String) -> ScreenreelError,
}

impl AppBridge {
    fn launch(
        name: &'static str,
        launch: &str,
        src_caps: gst::Caps,
        error: fn(String) -> ScreenreelError,
    ) -> ScreenreelResult<Self> {
        let pipeline = LaunchedPipeline::launch(name, launch, ScreenreelError::initialization)?;
        let src = pipeline.app_src("src")?;
        let sink = pipeline.app_sink("sink")?;
        src.set_caps(Some(&src_caps));
        pipeline.play()?;

        Ok(Self {
            pipeline,
            src,
            sink,
            ready: VecDeque::new(),
            ended: false,
            error,
        })
    }

    fn push(&mut self, buffer: gst::Buffer) -> ScreenreelResult<()> {
        if self.ended {
            return Err((self.error)(format!(
                "{} pipeline already received end of stream",
                self.pipeline.name
            )));
        }
        self.src.push_buffer(buffer).map_err(|e| {
            (self.error)(format!("{} pipeline rejected buffer: {e:?}", self.pipeline.name))
        })?;
        self.drain_ready()
    }

    fn drain_ready(&mut self) -> ScreenreelResult<()> {
        self.pipeline.check(self.error)?;
        while let Some(sample) = self.sink.try_pull_sample(gst::ClockTime::ZERO) {
            self.ready.push_back(sample);
        }
        Ok(())
    }

    /// Send EOS and collect everything still inside the pipeline.
    async fn end(&mut self, timeout: Duration) -> ScreenreelResult<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        let name = self.pipeline.name;
        self.src.end_of_stream().map_err(|e| {
            (self.error)(format!("failed to send end of stream to {name} pipeline: {e:?}"))
        })?;

        let sink = self.sink.clone();
        let remaining = tokio::task::spawn_blocking(move || {
            let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
            let mut samples = Vec::new();
            loop {
                match sink.try_pull_sample(wait) {
                    Some(sample) => samples.push(sample),
                    None if sink.is_eos() => return Ok(samples),
                    None => return Err(format!("{name} pipeline did not drain within {timeout:?}")),
                }
            }
        })
        .await
        .map_err(|e| (self.error)(format!("{name} drain task failed: {e}")))?
        .map_err(self.error)?;

        self.pipeline.check(self.error)?;
        self.ready.extend(remaining);
        Ok(())
    }

    fn next(&mut self) -> ScreenreelResult<Option<gst::Sample>> {
        if !self.ended {
            self.drain_ready()?;
        }
        Ok(self.ready.pop_front())
    }

    /// Buffers pushed but not yet taken in by the pipeline, plus samples
    /// waiting to be polled.
    fn backlog(&self) -> usize {
        // `current-level-buffers` exists from GStreamer 1.20.
        let queued = if self.src.find_property("current-level-buffers").is_some() {
            self.src.property::<u64>("current-level-buffers") as usize
        } else {
            0
        };
        queued + self.ready.len()
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.ready.clear();
        self.pipeline.stop()
    }
}

fn caps_int(sample: &gst::Sample, field: &str) -> Option<i32> {
    sample.caps()?.structure(0)?.get::<i32>(field).ok()
}

fn sample_pts_us(sample: &gst::Sample) -> i64 {
    sample
        .buffer()
        .and_then(|b| clock_to_us(b.pts()))
        .unwrap_or(0)
}

fn timed_buffer(data: Vec<u8>, timestamp_us: i64, duration_us: i64) -> gst::Buffer {
    let mut buffer = gst::Buffer::from_mut_slice(data);
    if let Some(buffer) = buffer.get_mut() {
        buffer.set_pts(us_to_clock(timestamp_us));
        if duration_us > 0 {
            buffer.set_duration(us_to_clock(duration_us));
        }
    }
    buffer
}

impl Drop for LaunchedPipeline {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}
