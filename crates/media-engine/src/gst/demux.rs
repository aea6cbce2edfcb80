//! Compressed packet reader: `filesrc ! parsebin ! appsink`.

use std::path::Path;

use async_trait::async_trait;
use gstreamer as gst;
use gstreamer_app as gst_app;

use screenreel_common::error::{ScreenreelError, ScreenreelResult};

use super::{clock_to_us, escape_path, sample_bytes, LaunchedPipeline};
use crate::backend::Demuxer;
use crate::types::{EncodedPacket, StreamConfig, StreamKind};

const VIDEO_CAPS: &str =
    "video/x-h264;video/x-h265;video/x-vp8;video/x-vp9;video/x-av1;image/jpeg";
const AUDIO_CAPS: &str =
    "audio/mpeg;audio/x-opus;audio/x-vorbis;audio/x-flac;audio/x-alac;audio/x-ac3;audio/x-raw";

/// Time allowed for the container to be parsed and the first packet read.
const OPEN_TIMEOUT_SECS: u64 = 10;

pub struct GstDemuxer {
    kind: StreamKind,
    pipeline: LaunchedPipeline,
    sink: gst_app::AppSink,
    config: StreamConfig,
    first: Option<gst::Sample>,
    finished: bool,
}

impl GstDemuxer {
    pub fn open(source: &Path, kind: StreamKind) -> ScreenreelResult<Self> {
        if !source.exists() {
            return Err(ScreenreelError::FileNotFound {
                path: source.to_path_buf(),
            });
        }

        let caps = match kind {
            StreamKind::Video => VIDEO_CAPS,
            StreamKind::Audio => AUDIO_CAPS,
        };
        let name = match kind {
            StreamKind::Video => "video-demux",
            StreamKind::Audio => "audio-demux",
        };
        let launch = format!(
            "filesrc location=\"{}\" ! parsebin ! appsink name=sink sync=false max-buffers=64 caps=\"{caps}\"",
            escape_path(source)
        );
        let pipeline = LaunchedPipeline::launch(name, &launch, ScreenreelError::initialization)?;
        let sink = pipeline.app_sink("sink")?;
        pipeline.play()?;

        // The first packet carries the negotiated caps we hand to the decoder.
        let first = sink
            .try_pull_sample(gst::ClockTime::from_seconds(OPEN_TIMEOUT_SECS))
            .ok_or_else(|| match pipeline.take_error() {
                Some(message) => {
                    ScreenreelError::initialization(format!("Failed to open {}: {message}", source.display()))
                }
                None => ScreenreelError::initialization(format!(
                    "{} has no readable {kind:?} stream",
                    source.display()
                )),
            })?;

        let config = stream_config(&first, kind)?;
        tracing::info!(
            source = %source.display(),
            ?kind,
            codec = %config.codec,
            "Opened demuxer"
        );

        Ok(Self {
            kind,
            pipeline,
            sink,
            config,
            first: Some(first),
            finished: false,
        })
    }

    fn to_packet(&self, sample: &gst::Sample) -> ScreenreelResult<EncodedPacket> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| ScreenreelError::decode("demuxed sample has no buffer"))?;
        let timestamp_us = clock_to_us(buffer.pts())
            .or_else(|| clock_to_us(buffer.dts()))
            .unwrap_or(0);
        let duration_us = clock_to_us(buffer.duration()).unwrap_or(0);
        let keyframe = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
        let data = sample_bytes(sample).map_err(ScreenreelError::decode)?;

        Ok(EncodedPacket {
            kind: self.kind,
            data,
            timestamp_us,
            duration_us,
            keyframe,
        })
    }
}

fn stream_config(sample: &gst::Sample, kind: StreamKind) -> ScreenreelResult<StreamConfig> {
    let caps = sample
        .caps()
        .ok_or_else(|| ScreenreelError::initialization("demuxed stream has no caps"))?;
    let structure = caps
        .structure(0)
        .ok_or_else(|| ScreenreelError::initialization("demuxed stream caps are empty"))?;

    let mut config = StreamConfig::new(caps.to_string());
    config.description = structure
        .get::<gst::Buffer>("codec_data")
        .ok()
        .and_then(|b| b.map_readable().ok().map(|m| m.as_slice().to_vec()));
    match kind {
        StreamKind::Video => {
            config.width = structure.get::<i32>("width").ok().map(|w| w as u32);
            config.height = structure.get::<i32>("height").ok().map(|h| h as u32);
        }
        StreamKind::Audio => {
            config.sample_rate = structure.get::<i32>("rate").ok().map(|r| r as u32);
            config.channels = structure.get::<i32>("channels").ok().map(|c| c as u16);
        }
    }
    Ok(config)
}

#[async_trait]
impl Demuxer for GstDemuxer {
    fn config(&self) -> &StreamConfig {
        &self.config
    }

    async fn read_packet(&mut self) -> ScreenreelResult<Option<EncodedPacket>> {
        if let Some(sample) = self.first.take() {
            return self.to_packet(&sample).map(Some);
        }
        if self.finished {
            return Ok(None);
        }

        let sink = self.sink.clone();
        let pulled = tokio::task::spawn_blocking(move || sink.pull_sample().ok())
            .await
            .map_err(|e| ScreenreelError::decode(format!("demux read task failed: {e}")))?;

        match pulled {
            Some(sample) => self.to_packet(&sample).map(Some),
            None => {
                self.pipeline.check(ScreenreelError::decode)?;
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.first = None;
        self.pipeline.stop()
    }
}
