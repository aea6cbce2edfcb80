//! Show project information.

use std::path::PathBuf;

use screenreel_project_model::project::ExportFormat;
use screenreel_project_model::{LoadedProject, SegmentPlan};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let p = &project.project;
    let timeline = &project.timeline;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!();

    println!("Source:");
    println!("  Path: {}", project.source_path().display());
    println!(
        "  Resolution: {}x{} ({:.1}s, {})",
        p.source.width, p.source.height, p.source.duration_secs, p.source.codec
    );
    println!("  Audio: {}", if p.source.has_audio { "yes" } else { "no" });
    println!();

    println!("Timeline:");
    println!("  Zoom regions: {}", timeline.zoom_regions.len());
    for region in timeline.sorted_zoom_regions() {
        println!(
            "    {} [{:.0}ms, {:.0}ms] depth {} ({}x) focus ({:.2}, {:.2})",
            region.id,
            region.start_ms,
            region.end_ms,
            region.depth.level(),
            region.depth.scale(),
            region.focus.cx,
            region.focus.cy
        );
    }
    println!("  Trims: {}", timeline.trims.len());
    for trim in timeline.sorted_trims() {
        println!("    [{:.0}ms, {:.0}ms)", trim.start_ms, trim.end_ms);
    }
    if !timeline.crop.is_full() {
        let c = timeline.crop;
        println!(
            "  Crop: x={:.3} y={:.3} w={:.3} h={:.3}",
            c.x, c.y, c.width, c.height
        );
    }
    println!();

    let export = &p.export;
    let fps = export.frame_rate();
    let (width, height) = export.output_size(p.source.width, p.source.height);
    println!("Export settings:");
    println!("  Format: {:?}", export.format);
    match export.format {
        ExportFormat::Mp4 => println!("  Quality: {:?}", export.quality),
        ExportFormat::Gif => println!(
            "  Size preset: {:?}, looped: {}",
            export.gif.size_preset, export.gif.looped
        ),
    }
    println!("  Output: {width}x{height} @ {fps}fps");

    if p.source.duration_secs > 0.0 {
        let plan = SegmentPlan::compute(p.source.duration_secs, &timeline.trims);
        println!(
            "  Kept: {:.2}s of {:.2}s in {} segment(s), {} frames",
            plan.effective_duration(),
            plan.source_duration_secs(),
            plan.len(),
            plan.total_frames(fps as f64)
        );
    }

    Ok(())
}
