//! Export a project to MP4 or GIF.

use std::io::Write;
use std::path::PathBuf;

use screenreel_common::config::AppConfig;
use screenreel_project_model::project::ExportSettings;
use screenreel_project_model::LoadedProject;
use screenreel_render_engine::{
    CancelHandle, ExportJob, ExportOutcome, ExportProgress, Exporter, ProgressCallback,
    ProgressPhase,
};

use crate::ExportOverrides;

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    overrides: ExportOverrides,
    json_progress: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let default_output = output.is_none();
    let mut job = ExportJob::from_project(&project, &config.export, output);
    apply_overrides(&mut job.settings, &overrides);
    if default_output {
        // Follow a --format override.
        job.output_path = job
            .output_path
            .with_extension(job.settings.format.extension());
    }

    println!("  Source: {}", job.source.display());
    println!("  Output: {}", job.output_path.display());
    println!("  Format: {:?}", job.settings.format);

    let backend = screenreel_media_engine::default_backend()?;
    let mut exporter = Exporter::new(backend);

    let cancel = CancelHandle::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let progress: ProgressCallback = if json_progress {
        Box::new(|p: ExportProgress| {
            if let Ok(line) = serde_json::to_string(&p) {
                println!("{line}");
            }
        })
    } else {
        Box::new(print_status)
    };

    match exporter.export(&job, Some(progress), &cancel).await {
        ExportOutcome::Completed(artifact) => {
            println!(
                "\nExport complete: {} ({:.1} MiB)",
                artifact.path.display(),
                artifact.size_bytes as f64 / (1024.0 * 1024.0)
            );
            Ok(())
        }
        ExportOutcome::Cancelled => {
            println!("\nExport cancelled.");
            Ok(())
        }
        ExportOutcome::Failed(reason) => {
            println!();
            anyhow::bail!("Export failed: {reason}")
        }
    }
}

fn print_status(p: ExportProgress) {
    match p.phase {
        ProgressPhase::Extracting => print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.percentage, p.current_frame, p.total_frames, p.estimated_time_remaining_secs,
        ),
        ProgressPhase::Finalizing => print!(
            "\r  Finalizing: {:.0}%                              ",
            p.render_progress.unwrap_or(0.0)
        ),
    }
    let _ = std::io::stdout().flush();
}

fn apply_overrides(settings: &mut ExportSettings, overrides: &ExportOverrides) {
    if let Some(format) = overrides.format {
        settings.format = format.into();
    }
    if let Some(quality) = overrides.quality {
        settings.quality = quality.into();
    }
    if let Some(fps) = overrides.fps {
        settings.fps = fps;
    }
    if let Some(bitrate) = overrides.bitrate {
        settings.video_bitrate = Some(bitrate);
    }
    if let Some(rate) = overrides.gif_fps {
        settings.gif.frame_rate = rate;
    }
    if let Some(size) = overrides.gif_size {
        settings.gif.size_preset = size.into();
    }
    if overrides.no_loop {
        settings.gif.looped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FormatArg, GifSizeArg};
    use screenreel_project_model::project::{ExportFormat, GifSizePreset};

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let mut settings = ExportSettings::default();
        let before = settings.clone();
        apply_overrides(&mut settings, &ExportOverrides::default());
        assert_eq!(settings, before);

        apply_overrides(
            &mut settings,
            &ExportOverrides {
                format: Some(FormatArg::Gif),
                gif_fps: Some(20),
                gif_size: Some(GifSizeArg::Large),
                no_loop: true,
                ..ExportOverrides::default()
            },
        );
        assert_eq!(settings.format, ExportFormat::Gif);
        assert_eq!(settings.gif.frame_rate, 20);
        assert_eq!(settings.gif.size_preset, GifSizePreset::Large);
        assert!(!settings.gif.looped);
        assert_eq!(settings.fps, before.fps);
    }
}
