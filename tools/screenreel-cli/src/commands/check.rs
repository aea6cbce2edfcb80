//! Check media backend capabilities.

use screenreel_media_engine::types::{
    EncoderSupport, HardwareAcceleration, VideoCodec, VideoEncoderConfig,
};

pub fn run() -> anyhow::Result<()> {
    println!("Screenreel System Check");
    println!("{}", "=".repeat(50));

    let backend = match screenreel_media_engine::default_backend() {
        Ok(backend) => backend,
        Err(e) => {
            println!("[FAIL] Media backend: {e}");
            println!("\nMP4 and GIF export need a media backend to decode sources.");
            return Ok(());
        }
    };
    println!("[OK] Media backend: {}", backend.name());

    let mut any_encoder = false;
    for (width, height) in [(1920, 1080), (1280, 720)] {
        let config = VideoEncoderConfig {
            codec: VideoCodec::H264,
            width,
            height,
            frame_rate: 30.0,
            bitrate: 8_000_000,
            keyframe_interval: 150,
        };
        for (label, acceleration) in [
            ("hardware", HardwareAcceleration::PreferHardware),
            ("software", HardwareAcceleration::PreferSoftware),
        ] {
            match backend.probe_video_encoder(&config, acceleration) {
                EncoderSupport::Supported => {
                    any_encoder = true;
                    println!("[OK] H.264 {width}x{height} ({label})");
                }
                EncoderSupport::Unsupported { reason } => {
                    println!("[WARN] H.264 {width}x{height} ({label}): {reason}");
                }
            }
        }
    }
    println!("[OK] GIF encoder: built in");

    println!();
    if any_encoder {
        println!("MP4 and GIF export are available.");
    } else {
        println!("No H.264 encoder found; only GIF export is available.");
    }
    Ok(())
}
