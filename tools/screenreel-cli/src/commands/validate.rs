//! Validate a Screenreel project bundle.

use std::path::PathBuf;

use screenreel_project_model::LoadedProject;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    println!("  Name: {}", project.project.name);
    println!("  Version: {}", project.project.version);
    println!("  Source: {}", project.source_path().display());
    println!("  Zoom regions: {}", project.timeline.zoom_regions.len());
    println!("  Trims: {}", project.timeline.trims.len());

    let errors = project.validate();
    if errors.is_empty() {
        println!("\nProject is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for error in &errors {
        println!("  - {error}");
    }
    anyhow::bail!("{} issue(s) found", errors.len())
}
