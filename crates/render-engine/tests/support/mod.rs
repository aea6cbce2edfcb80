//! In-memory media backend for pipeline tests.
//!
//! Video frames are solid colors that encode the source frame index, so
//! the encoder side can tell which source frame ended up at each output
//! position.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_media_engine::backend::{
    AudioDecoder, AudioEncoder, Demuxer, FinalizeProgress, MediaBackend, Muxer, VideoDecoder,
    VideoEncoder,
};
use screenreel_media_engine::types::{
    AudioBuffer, AudioEncoderConfig, AudioStreamInfo, ContainerFormat, DecodedFrame,
    DecodedVideoInfo, EncodedChunk, EncodedPacket, EncoderSupport, HardwareAcceleration,
    MuxerConfig, OutputArtifact, RenderedFrame, StreamConfig, StreamKind, VideoCodec,
    VideoEncoderConfig,
};
use screenreel_render_engine::CancelHandle;

/// Description of a synthetic recording.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub frame_times_us: Vec<i64>,
    /// Mono audio at this sample rate, in 100 ms packets.
    pub audio_rate: Option<u32>,
}

impl SyntheticSource {
    /// Screen-recording style timing: gaps alternate between 30 and 50 ms.
    pub fn variable_rate(duration_secs: f64) -> Self {
        let end = (duration_secs * 1_000_000.0) as i64;
        let mut frame_times_us = Vec::new();
        let mut t = 0;
        while t < end {
            frame_times_us.push(t);
            t += if frame_times_us.len() % 2 == 1 { 30_000 } else { 50_000 };
        }
        Self::with_times(duration_secs, frame_times_us)
    }

    pub fn constant_rate(duration_secs: f64, fps: f64) -> Self {
        let count = (duration_secs * fps).round() as usize;
        let frame_times_us = (0..count)
            .map(|i| (i as f64 * 1_000_000.0 / fps).round() as i64)
            .collect();
        Self::with_times(duration_secs, frame_times_us)
    }

    pub fn with_times(duration_secs: f64, frame_times_us: Vec<i64>) -> Self {
        Self {
            width: 32,
            height: 18,
            duration_secs,
            frame_times_us,
            audio_rate: None,
        }
    }

    pub fn with_audio(mut self, sample_rate: u32) -> Self {
        self.audio_rate = Some(sample_rate);
        self
    }

    pub fn source_time_us(&self, index: u32) -> i64 {
        self.frame_times_us[index as usize]
    }
}

pub fn index_color(index: u32) -> Rgba<u8> {
    Rgba([(index & 0xff) as u8, ((index >> 8) & 0xff) as u8, 0, 255])
}

pub fn color_index(color: Rgba<u8>) -> u32 {
    color.0[0] as u32 | (color.0[1] as u32) << 8
}

/// Counts every handle the backend hands out and every `close` call.
#[derive(Debug, Default)]
pub struct Ledger {
    opened: AtomicUsize,
    close_calls: AtomicUsize,
}

impl Ledger {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Every handle was closed exactly once.
    pub fn balanced(&self) -> bool {
        self.opened() == self.close_calls()
    }
}

struct Tracked(Arc<Ledger>);

impl Tracked {
    fn new(ledger: &Arc<Ledger>) -> Self {
        ledger.opened.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(ledger))
    }

    fn close(&self) {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedVideoFrame {
    pub export_timestamp_us: i64,
    pub source_index: u32,
    pub keyframe: bool,
}

/// What reached the encoders and the muxer.
#[derive(Debug, Default)]
pub struct Recorder {
    pub video: Mutex<Vec<EncodedVideoFrame>>,
    pub audio: Mutex<Vec<AudioBuffer>>,
    pub muxed: Mutex<Vec<(StreamKind, i64)>>,
    pub acceleration: Mutex<Option<HardwareAcceleration>>,
    pub max_in_flight: AtomicUsize,
    /// Every value the video decoder reported as its queue size.
    pub decode_queue_reports: Mutex<Vec<usize>>,
    /// Largest number of packets the video decoder held at once.
    pub max_decode_backlog: AtomicUsize,
}

impl Recorder {
    pub fn video_frames(&self) -> Vec<EncodedVideoFrame> {
        self.video.lock().unwrap().clone()
    }

    pub fn audio_buffers(&self) -> Vec<AudioBuffer> {
        self.audio.lock().unwrap().clone()
    }

    pub fn muxed(&self) -> Vec<(StreamKind, i64)> {
        self.muxed.lock().unwrap().clone()
    }

    pub fn decode_queue_reports(&self) -> Vec<usize> {
        self.decode_queue_reports.lock().unwrap().clone()
    }

    pub fn acceleration(&self) -> Option<HardwareAcceleration> {
        *self.acceleration.lock().unwrap()
    }

    pub fn clear(&self) {
        self.video.lock().unwrap().clear();
        self.audio.lock().unwrap().clear();
        self.muxed.lock().unwrap().clear();
    }
}

pub struct MockBackend {
    pub source: SyntheticSource,
    pub ledger: Arc<Ledger>,
    pub recorder: Arc<Recorder>,
    pub hardware_encoding: bool,
    pub software_encoding: bool,
    /// Chunks the video encoder holds back until `finish`.
    pub encoder_lag: usize,
    /// Cancel this handle once the video encoder has accepted N frames.
    pub cancel_after: Option<(usize, CancelHandle)>,
    /// Fail decoding after N packets.
    pub fail_decode_after: Option<usize>,
    /// Fail audio decoding after N packets.
    pub fail_audio_decode_after: Option<usize>,
    /// The video decoder finishes one frame per this many queue-size
    /// checks, so packets pile up while the caller keeps feeding it.
    /// Zero decodes instantly.
    pub decode_checks_per_frame: usize,
}

impl MockBackend {
    pub fn new(source: SyntheticSource) -> Self {
        Self {
            source,
            ledger: Arc::new(Ledger::default()),
            recorder: Arc::new(Recorder::default()),
            hardware_encoding: false,
            software_encoding: true,
            encoder_lag: 0,
            cancel_after: None,
            fail_decode_after: None,
            fail_audio_decode_after: None,
            decode_checks_per_frame: 0,
        }
    }
}

impl MediaBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn probe(&self, _source: &Path) -> ScreenreelResult<DecodedVideoInfo> {
        Ok(DecodedVideoInfo {
            width: self.source.width,
            height: self.source.height,
            duration_secs: self.source.duration_secs,
            frame_rate: self.source.frame_times_us.len() as f64 / self.source.duration_secs,
            codec: "video/x-test".into(),
            audio: self.source.audio_rate.map(|sample_rate| AudioStreamInfo {
                codec: "audio/x-test".into(),
                sample_rate,
                channels: 1,
            }),
        })
    }

    fn open_video_demuxer(&self, _source: &Path) -> ScreenreelResult<Box<dyn Demuxer>> {
        let packets = self
            .source
            .frame_times_us
            .iter()
            .enumerate()
            .map(|(i, ts)| EncodedPacket {
                kind: StreamKind::Video,
                data: (i as u32).to_le_bytes().to_vec(),
                timestamp_us: *ts,
                duration_us: 0,
                keyframe: i % 30 == 0,
            })
            .collect();
        Ok(Box::new(MockDemuxer {
            config: StreamConfig {
                width: Some(self.source.width),
                height: Some(self.source.height),
                ..StreamConfig::new("video/x-test")
            },
            packets,
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn open_audio_demuxer(&self, _source: &Path) -> ScreenreelResult<Box<dyn Demuxer>> {
        let rate = self
            .source
            .audio_rate
            .ok_or_else(|| ScreenreelError::initialization("source has no audio"))?;
        let per_packet = rate / 10;
        let count = (self.source.duration_secs * 10.0).round() as usize;
        let packets = (0..count)
            .map(|i| EncodedPacket {
                kind: StreamKind::Audio,
                data: per_packet.to_le_bytes().to_vec(),
                timestamp_us: i as i64 * 100_000,
                duration_us: 100_000,
                keyframe: true,
            })
            .collect();
        Ok(Box::new(MockDemuxer {
            config: StreamConfig {
                sample_rate: Some(rate),
                channels: Some(1),
                ..StreamConfig::new("audio/x-test")
            },
            packets,
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn create_video_decoder(
        &self,
        config: &StreamConfig,
    ) -> ScreenreelResult<Box<dyn VideoDecoder>> {
        Ok(Box::new(MockVideoDecoder {
            width: config.width.unwrap_or(self.source.width),
            height: config.height.unwrap_or(self.source.height),
            input: VecDeque::new(),
            accepted: 0,
            produced: 0,
            checks: AtomicUsize::new(0),
            checks_per_frame: self.decode_checks_per_frame,
            flushed: false,
            fail_after: self.fail_decode_after,
            recorder: Arc::clone(&self.recorder),
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn create_audio_decoder(
        &self,
        config: &StreamConfig,
    ) -> ScreenreelResult<Box<dyn AudioDecoder>> {
        Ok(Box::new(MockAudioDecoder {
            sample_rate: config.sample_rate.unwrap_or(48_000),
            ready: VecDeque::new(),
            accepted: 0,
            fail_after: self.fail_audio_decode_after,
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn probe_video_encoder(
        &self,
        config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> EncoderSupport {
        if config.codec != VideoCodec::H264 {
            return EncoderSupport::Unsupported {
                reason: "mock only encodes H.264".into(),
            };
        }
        let available = match acceleration {
            HardwareAcceleration::PreferHardware => self.hardware_encoding,
            HardwareAcceleration::PreferSoftware => self.software_encoding,
        };
        if available {
            EncoderSupport::Supported
        } else {
            EncoderSupport::Unsupported {
                reason: format!("no {acceleration:?} encoder"),
            }
        }
    }

    fn create_video_encoder(
        &self,
        _config: &VideoEncoderConfig,
        acceleration: HardwareAcceleration,
    ) -> ScreenreelResult<Box<dyn VideoEncoder>> {
        *self.recorder.acceleration.lock().unwrap() = Some(acceleration);
        Ok(Box::new(MockVideoEncoder {
            recorder: Arc::clone(&self.recorder),
            pending: VecDeque::new(),
            lag: self.encoder_lag,
            accepted: 0,
            cancel_after: self.cancel_after.clone(),
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn create_audio_encoder(
        &self,
        _config: &AudioEncoderConfig,
    ) -> ScreenreelResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(MockAudioEncoder {
            recorder: Arc::clone(&self.recorder),
            pending: VecDeque::new(),
            tracked: Tracked::new(&self.ledger),
        }))
    }

    fn create_muxer(&self, config: &MuxerConfig) -> ScreenreelResult<Box<dyn Muxer>> {
        if config.format != ContainerFormat::Mp4 {
            return Err(ScreenreelError::unsupported("mock only writes MP4"));
        }
        std::fs::write(&config.output_path, b"partial")?;
        Ok(Box::new(MockMuxer {
            path: config.output_path.clone(),
            recorder: Arc::clone(&self.recorder),
            finalized: false,
            tracked: Tracked::new(&self.ledger),
        }))
    }
}

struct MockDemuxer {
    config: StreamConfig,
    packets: VecDeque<EncodedPacket>,
    tracked: Tracked,
}

#[async_trait]
impl Demuxer for MockDemuxer {
    fn config(&self) -> &StreamConfig {
        &self.config
    }

    async fn read_packet(&mut self) -> ScreenreelResult<Option<EncodedPacket>> {
        Ok(self.packets.pop_front())
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.tracked.close();
        Ok(())
    }
}

struct MockVideoDecoder {
    width: u32,
    height: u32,
    input: VecDeque<EncodedPacket>,
    accepted: usize,
    produced: usize,
    checks: AtomicUsize,
    checks_per_frame: usize,
    flushed: bool,
    fail_after: Option<usize>,
    recorder: Arc<Recorder>,
    tracked: Tracked,
}

impl MockVideoDecoder {
    /// Frames the decoder may finish right now.
    fn budget(&self) -> usize {
        if self.checks_per_frame == 0 || self.flushed {
            return usize::MAX;
        }
        (self.checks.load(Ordering::SeqCst) / self.checks_per_frame).saturating_sub(self.produced)
    }
}

#[async_trait]
impl VideoDecoder for MockVideoDecoder {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()> {
        if self.fail_after.is_some_and(|n| self.accepted >= n) {
            return Err(ScreenreelError::decode("corrupt packet"));
        }
        self.input.push_back(packet);
        self.accepted += 1;
        self.recorder
            .max_decode_backlog
            .fetch_max(self.input.len(), Ordering::SeqCst);
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let size = self.input.len();
        self.recorder.decode_queue_reports.lock().unwrap().push(size);
        size
    }

    fn poll_frame(&mut self) -> ScreenreelResult<Option<DecodedFrame>> {
        if self.budget() == 0 {
            return Ok(None);
        }
        let Some(packet) = self.input.pop_front() else {
            return Ok(None);
        };
        self.produced += 1;
        let bytes: [u8; 4] = packet.data[..4]
            .try_into()
            .map_err(|_| ScreenreelError::decode("short packet"))?;
        let index = u32::from_le_bytes(bytes);
        let image = RgbaImage::from_pixel(self.width, self.height, index_color(index));
        Ok(Some(DecodedFrame::new(packet.timestamp_us, image)))
    }

    async fn flush(&mut self) -> ScreenreelResult<()> {
        self.flushed = true;
        Ok(())
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.tracked.close();
        Ok(())
    }
}

struct MockAudioDecoder {
    sample_rate: u32,
    ready: VecDeque<AudioBuffer>,
    accepted: usize,
    fail_after: Option<usize>,
    tracked: Tracked,
}

#[async_trait]
impl AudioDecoder for MockAudioDecoder {
    fn decode(&mut self, packet: EncodedPacket) -> ScreenreelResult<()> {
        if self.fail_after.is_some_and(|n| self.accepted >= n) {
            return Err(ScreenreelError::decode("audio packet truncated"));
        }
        self.accepted += 1;
        let bytes: [u8; 4] = packet.data[..4]
            .try_into()
            .map_err(|_| ScreenreelError::decode("short packet"))?;
        let frames = u32::from_le_bytes(bytes) as usize;
        self.ready.push_back(AudioBuffer {
            timestamp_us: packet.timestamp_us,
            sample_rate: self.sample_rate,
            channels: 1,
            samples: vec![0.25; frames],
        });
        Ok(())
    }

    fn poll_buffer(&mut self) -> ScreenreelResult<Option<AudioBuffer>> {
        Ok(self.ready.pop_front())
    }

    async fn flush(&mut self) -> ScreenreelResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.tracked.close();
        Ok(())
    }
}

struct MockVideoEncoder {
    recorder: Arc<Recorder>,
    pending: VecDeque<EncodedChunk>,
    lag: usize,
    accepted: usize,
    cancel_after: Option<(usize, CancelHandle)>,
    tracked: Tracked,
}

#[async_trait]
impl VideoEncoder for MockVideoEncoder {
    fn encode(&mut self, frame: &RenderedFrame, keyframe: bool) -> ScreenreelResult<()> {
        let center = *frame
            .image
            .get_pixel(frame.image.width() / 2, frame.image.height() / 2);
        self.recorder.video.lock().unwrap().push(EncodedVideoFrame {
            export_timestamp_us: frame.timestamp_us,
            source_index: color_index(center),
            keyframe,
        });
        self.pending.push_back(EncodedChunk {
            kind: StreamKind::Video,
            data: vec![0; 8],
            timestamp_us: frame.timestamp_us,
            duration_us: frame.duration_us,
            keyframe,
            config: None,
        });
        self.recorder
            .max_in_flight
            .fetch_max(self.pending.len(), Ordering::SeqCst);

        self.accepted += 1;
        if let Some((after, cancel)) = &self.cancel_after {
            if self.accepted >= *after {
                cancel.cancel();
            }
        }
        Ok(())
    }

    fn poll_chunk(&mut self) -> ScreenreelResult<Option<EncodedChunk>> {
        if self.pending.len() > self.lag {
            Ok(self.pending.pop_front())
        } else {
            Ok(None)
        }
    }

    async fn finish(&mut self) -> ScreenreelResult<()> {
        self.lag = 0;
        Ok(())
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.tracked.close();
        Ok(())
    }
}

struct MockAudioEncoder {
    recorder: Arc<Recorder>,
    pending: VecDeque<EncodedChunk>,
    tracked: Tracked,
}

#[async_trait]
impl AudioEncoder for MockAudioEncoder {
    fn encode(&mut self, buffer: &AudioBuffer) -> ScreenreelResult<()> {
        self.recorder.audio.lock().unwrap().push(buffer.clone());
        self.pending.push_back(EncodedChunk {
            kind: StreamKind::Audio,
            data: vec![0; 4],
            timestamp_us: buffer.timestamp_us,
            duration_us: buffer.duration_us(),
            keyframe: true,
            config: None,
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
        self.tracked.close();
        Ok(())
    }
}

struct MockMuxer {
    path: PathBuf,
    recorder: Arc<Recorder>,
    finalized: bool,
    tracked: Tracked,
}

#[async_trait]
impl Muxer for MockMuxer {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> ScreenreelResult<()> {
        self.recorder
            .muxed
            .lock()
            .unwrap()
            .push((chunk.kind, chunk.timestamp_us));
        Ok(())
    }

    async fn finalize(&mut self, progress: FinalizeProgress<'_>) -> ScreenreelResult<OutputArtifact> {
        for step in [0.5, 1.0] {
            if !progress(step) {
                return Err(ScreenreelError::mux("finalize aborted"));
            }
        }
        std::fs::write(&self.path, b"finished")?;
        self.finalized = true;
        Ok(OutputArtifact {
            path: self.path.clone(),
            size_bytes: 8,
        })
    }

    fn close(&mut self) -> ScreenreelResult<()> {
        self.tracked.close();
        if !self.finalized && self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
