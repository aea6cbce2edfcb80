use std::path::PathBuf;

use image::{Rgba, RgbaImage};

use screenreel_media_engine::backend::{Muxer, VideoEncoder};
use screenreel_media_engine::gif::{GifEncoder, GifMuxer};
use screenreel_media_engine::types::{
    ContainerFormat, MuxerConfig, RenderedFrame, VideoCodec, VideoEncoderConfig,
};

fn output_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("screenreel-gif-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

async fn write_gif(path: &PathBuf, looped: bool, frames: u32) {
    let mut encoder = GifEncoder::new(&VideoEncoderConfig {
        codec: VideoCodec::Gif,
        width: 8,
        height: 4,
        frame_rate: 10.0,
        bitrate: 0,
        keyframe_interval: 0,
    })
    .unwrap();
    let mut muxer = GifMuxer::new(&MuxerConfig {
        format: ContainerFormat::Gif,
        output_path: path.clone(),
        width: 8,
        height: 4,
        frame_rate: 10.0,
        has_audio: false,
        looped,
    })
    .unwrap();

    for i in 0..frames {
        let shade = (i * 40) as u8;
        let frame = RenderedFrame {
            timestamp_us: i as i64 * 100_000,
            duration_us: 100_000,
            image: RgbaImage::from_pixel(8, 4, Rgba([shade, 0, 255 - shade, 255])),
        };
        encoder.encode(&frame, i == 0).unwrap();
        while let Some(chunk) = encoder.poll_chunk().unwrap() {
            muxer.write_chunk(chunk).await.unwrap();
        }
    }
    encoder.finish().await.unwrap();

    let mut seen = Vec::new();
    let mut report = |p: f64| {
        seen.push(p);
        true
    };
    muxer.finalize(&mut report).await.unwrap();
    assert_eq!(seen.last().copied(), Some(1.0));
    muxer.close().unwrap();
}

#[tokio::test]
async fn looped_gif_repeats_forever() {
    let path = output_path("looped.gif");
    write_gif(&path, true, 5).await;

    let decoder = gif::DecodeOptions::new()
        .read_info(std::fs::File::open(&path).unwrap())
        .unwrap();
    assert_eq!(decoder.repeat(), gif::Repeat::Infinite);
    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn frames_keep_their_order_and_timing() {
    let path = output_path("once.gif");
    write_gif(&path, false, 4).await;

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(decoder.repeat(), gif::Repeat::Finite(0));

    let mut reds = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        // 10 fps is 10 centiseconds per frame.
        assert_eq!(frame.delay, 10);
        reds.push(frame.buffer[0]);
    }
    assert_eq!(reds.len(), 4);
    assert!(reds.windows(2).all(|w| w[0] < w[1]));
    std::fs::remove_file(&path).unwrap();
}
