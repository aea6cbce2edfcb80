//! Initialize a new Screenreel project around a source recording.

use std::path::PathBuf;

use screenreel_project_model::project::SourceTrack;
use screenreel_project_model::LoadedProject;

pub fn run(name: String, source: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let source = source
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Cannot open source {}: {e}", source.display()))?;
    let project_dir = output.join(&name);
    println!("Creating project '{}' at {}", name, project_dir.display());

    let track = probe_track(&source);
    let project = LoadedProject::create(&project_dir, &name, track)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    let src = &project.project.source;
    println!("Project created successfully:");
    println!("  Directory: {}", project.root.display());
    println!("  Source: {}", src.path);
    if src.width > 0 {
        println!(
            "  Resolution: {}x{} ({:.1}s, {})",
            src.width, src.height, src.duration_secs, src.codec
        );
        println!("  Audio: {}", if src.has_audio { "yes" } else { "no" });
    }
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── meta/        (project.json, timeline.json)");
    println!("  └── exports/     (rendered output)");

    Ok(())
}

/// Source metadata from the media backend, or a bare track when probing
/// is unavailable.
fn probe_track(source: &std::path::Path) -> SourceTrack {
    let path = source.display().to_string();
    let probed = screenreel_media_engine::default_backend().and_then(|backend| backend.probe(source));
    match probed {
        Ok(info) => SourceTrack {
            width: info.width,
            height: info.height,
            duration_secs: info.duration_secs,
            codec: info.codec,
            has_audio: info.audio.is_some(),
            ..SourceTrack::new(path)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Could not probe source; metadata left empty");
            SourceTrack::new(path)
        }
    }
}
