//! Project metadata and export settings.
//!
//! A project bundle is a directory holding the source recording and two
//! metadata files: `meta/project.json` ([`Project`]) and
//! `meta/timeline.json` ([`Timeline`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::timeline::Timeline;

/// Top-level project file (`project.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier.
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// The recorded screen video.
    pub source: SourceTrack,

    /// Output settings.
    #[serde(default)]
    pub export: ExportSettings,

    /// Canvas styling applied around the video.
    #[serde(default)]
    pub style: CanvasStyle,
}

/// Reference to the source recording.
///
/// Dimensions and duration are informational; the export probes the file
/// itself and trusts the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTrack {
    /// Path to the video file, relative to the project root or absolute.
    pub path: String,

    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,

    /// Duration in seconds.
    #[serde(default)]
    pub duration_secs: f64,

    /// Codec name reported when the project was created.
    #[serde(default)]
    pub codec: String,

    #[serde(default)]
    pub has_audio: bool,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Gif,
}

/// MP4 output quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    /// 720p.
    Medium,
    /// 1080p.
    #[default]
    Good,
    /// Source resolution.
    Source,
}

/// Output size limit for GIF exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GifSizePreset {
    #[default]
    Medium,
    Large,
    Original,
}

/// Frame rates offered for GIF output.
pub const VALID_GIF_FRAME_RATES: [u32; 4] = [15, 20, 25, 30];

/// Whether `rate` is one of [`VALID_GIF_FRAME_RATES`].
pub fn is_valid_gif_frame_rate(rate: u32) -> bool {
    VALID_GIF_FRAME_RATES.contains(&rate)
}

/// GIF-specific export settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GifExportConfig {
    pub frame_rate: u32,

    /// Repeat forever when set, play once otherwise.
    pub looped: bool,

    pub size_preset: GifSizePreset,
}

/// Export settings stored with the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: ExportFormat,

    /// MP4 quality preset.
    pub quality: ExportQuality,

    /// MP4 frame rate.
    pub fps: u32,

    /// Explicit MP4 video bitrate (bits/s). Derived from the quality preset
    /// when absent.
    pub video_bitrate: Option<u32>,

    /// GIF settings, used when `format` is `gif`.
    pub gif: GifExportConfig,
}

/// Canvas background fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    /// Flat color, `#rrggbb`.
    Solid { color: String },

    /// Linear gradient with evenly spaced `#rrggbb` stops. `angle_deg`
    /// follows CSS conventions (0 = bottom to top, 90 = left to right).
    Gradient { angle_deg: f64, stops: Vec<String> },

    /// Wallpaper image scaled to cover the canvas.
    Image { path: String },
}

/// Cosmetic styling around the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasStyle {
    pub background: Background,

    /// Blur the background behind the video.
    pub blur_background: bool,

    /// Padding on each side as a percentage of the canvas, `[0, 40]`.
    pub padding_percent: f64,

    /// Corner radius in output pixels. Defaults to 2% of the shorter side
    /// of the video rectangle when unset.
    pub border_radius: Option<f64>,

    /// Draw a drop shadow under the video.
    pub shadow: bool,

    /// Shadow opacity multiplier in `[0, 1]`.
    pub shadow_intensity: f64,

    /// Blur frames while the zoom transform is moving.
    pub motion_blur: bool,
}

/// The complete in-memory representation of a loaded project.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    /// Filesystem path to the project directory.
    pub root: PathBuf,

    /// Project metadata.
    pub project: Project,

    /// Editing timeline.
    pub timeline: Timeline,
}

impl Default for GifExportConfig {
    fn default() -> Self {
        Self {
            frame_rate: 15,
            looped: true,
            size_preset: GifSizePreset::Medium,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4,
            quality: ExportQuality::Good,
            fps: 30,
            video_bitrate: None,
            gif: GifExportConfig::default(),
        }
    }
}

impl Default for Background {
    fn default() -> Self {
        Background::Gradient {
            angle_deg: 135.0,
            stops: vec!["#fbc8b4".to_string(), "#2447b1".to_string()],
        }
    }
}

impl Default for CanvasStyle {
    fn default() -> Self {
        Self {
            background: Background::default(),
            blur_background: false,
            padding_percent: 10.0,
            border_radius: None,
            shadow: true,
            shadow_intensity: 0.55,
            motion_blur: true,
        }
    }
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Gif => "gif",
        }
    }
}

impl ExportQuality {
    /// Target output height, or `None` to keep the source height.
    pub fn max_height(self) -> Option<u32> {
        match self {
            ExportQuality::Medium => Some(720),
            ExportQuality::Good => Some(1080),
            ExportQuality::Source => None,
        }
    }

    /// Output size for a source of `width` x `height`.
    pub fn output_size(self, width: u32, height: u32) -> (u32, u32) {
        fit_to_height(width, height, self.max_height())
    }

    /// Bitrate derived from the pixel rate of the output.
    pub fn bitrate(self, width: u32, height: u32, fps: u32) -> u32 {
        let bits_per_pixel = match self {
            ExportQuality::Medium => 0.08,
            ExportQuality::Good => 0.12,
            ExportQuality::Source => 0.18,
        };
        let pixel_rate = width as f64 * height as f64 * fps.max(1) as f64;
        (pixel_rate * bits_per_pixel).clamp(1_000_000.0, 80_000_000.0) as u32
    }
}

impl GifSizePreset {
    pub fn max_height(self) -> Option<u32> {
        match self {
            GifSizePreset::Medium => Some(720),
            GifSizePreset::Large => Some(1080),
            GifSizePreset::Original => None,
        }
    }
}

impl GifExportConfig {
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        fit_to_height(width, height, self.size_preset.max_height())
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if !is_valid_gif_frame_rate(self.frame_rate) {
            return Err(ProjectError::ValidationError {
                message: format!(
                    "GIF frame rate {} is not one of {:?}",
                    self.frame_rate, VALID_GIF_FRAME_RATES
                ),
            });
        }
        Ok(())
    }
}

impl ExportSettings {
    /// Output frame rate for the selected format.
    pub fn frame_rate(&self) -> u32 {
        match self.format {
            ExportFormat::Mp4 => self.fps,
            ExportFormat::Gif => self.gif.frame_rate,
        }
    }

    /// Output dimensions for a source of `width` x `height`.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.format {
            ExportFormat::Mp4 => self.quality.output_size(width, height),
            ExportFormat::Gif => self.gif.output_size(width, height),
        }
    }

    /// Video bitrate for MP4 output.
    pub fn video_bitrate(&self, width: u32, height: u32) -> u32 {
        self.video_bitrate
            .unwrap_or_else(|| self.quality.bitrate(width, height, self.fps))
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        match self.format {
            ExportFormat::Mp4 if self.fps == 0 || self.fps > 240 => {
                Err(ProjectError::ValidationError {
                    message: format!("frame rate {} is out of range", self.fps),
                })
            }
            ExportFormat::Mp4 => Ok(()),
            ExportFormat::Gif => self.gif.validate(),
        }
    }
}

/// Scale `width` x `height` down to at most `max_height` rows, keeping the
/// aspect ratio and rounding both sides down to even numbers (H.264 4:2:0
/// requires even dimensions).
pub fn fit_to_height(width: u32, height: u32, max_height: Option<u32>) -> (u32, u32) {
    let (w, h) = match max_height {
        Some(max_h) if height > max_h && height > 0 => {
            let scaled_w = (width as f64 * max_h as f64 / height as f64).round() as u32;
            (scaled_w, max_h)
        }
        _ => (width, height),
    };
    (even(w), even(h))
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

impl Background {
    pub fn solid(color: impl Into<String>) -> Self {
        Background::Solid {
            color: color.into(),
        }
    }
}

impl CanvasStyle {
    pub fn validate(&self) -> Result<(), ProjectError> {
        if !(0.0..=40.0).contains(&self.padding_percent) {
            return Err(ProjectError::ValidationError {
                message: format!("padding {}% is outside [0, 40]", self.padding_percent),
            });
        }
        if let Some(radius) = self.border_radius {
            if !(radius >= 0.0) {
                return Err(ProjectError::ValidationError {
                    message: format!("border radius {radius} is negative"),
                });
            }
        }
        match &self.background {
            Background::Solid { color } => check_color(color)?,
            Background::Gradient { stops, .. } => {
                if stops.len() < 2 {
                    return Err(ProjectError::ValidationError {
                        message: "gradient needs at least two stops".to_string(),
                    });
                }
                for stop in stops {
                    check_color(stop)?;
                }
            }
            Background::Image { .. } => {}
        }
        Ok(())
    }
}

/// Parse `#rrggbb` (or `rrggbb`) into RGB components.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn check_color(value: &str) -> Result<(), ProjectError> {
    parse_hex_color(value)
        .map(|_| ())
        .ok_or_else(|| ProjectError::ValidationError {
            message: format!("invalid color {value:?}, expected #rrggbb"),
        })
}

impl Project {
    /// Create a new project around a source recording.
    pub fn new(name: impl Into<String>, source: SourceTrack) -> Self {
        let now = chrono::Utc::now();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            id: project_id(now),
            created_at: now.to_rfc3339(),
            modified_at: now.to_rfc3339(),
            source,
            export: ExportSettings::default(),
            style: CanvasStyle::default(),
        }
    }

    /// Bump `modified_at` to now.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }
}

impl SourceTrack {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            width: 0,
            height: 0,
            duration_secs: 0.0,
            codec: String::new(),
            has_audio: false,
        }
    }
}

impl LoadedProject {
    /// Load a project from a directory.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();
        let meta = root.join("meta");

        let project: Project = read_json(&meta.join("project.json"))?;
        let timeline_path = meta.join("timeline.json");
        let timeline = if timeline_path.exists() {
            read_json(&timeline_path)?
        } else {
            Timeline::new()
        };

        Ok(Self {
            root,
            project,
            timeline,
        })
    }

    /// Save project and timeline to disk.
    pub fn save(&self) -> Result<(), ProjectError> {
        let meta_dir = self.root.join("meta");
        std::fs::create_dir_all(&meta_dir).map_err(|e| ProjectError::IoError {
            path: meta_dir.clone(),
            source: e,
        })?;
        write_json(&meta_dir.join("project.json"), &self.project)?;
        write_json(&meta_dir.join("timeline.json"), &self.timeline)
    }

    /// Create a new project bundle on disk.
    pub fn create(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        source: SourceTrack,
    ) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();
        for subdir in ["meta", "exports"] {
            let dir = root.join(subdir);
            std::fs::create_dir_all(&dir).map_err(|e| ProjectError::IoError {
                path: dir.clone(),
                source: e,
            })?;
        }

        let loaded = Self {
            root,
            project: Project::new(name, source),
            timeline: Timeline::new(),
        };
        loaded.save()?;
        Ok(loaded)
    }

    /// Absolute path of the source recording.
    pub fn source_path(&self) -> PathBuf {
        let path = Path::new(&self.project.source.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Default output path inside the bundle's `exports/` directory.
    pub fn default_output_path(&self) -> PathBuf {
        let stem = sanitize_file_stem(&self.project.name);
        self.root
            .join("exports")
            .join(format!("{stem}.{}", self.project.export.format.extension()))
    }

    /// Validate that referenced files exist. Returns human-readable problems.
    pub fn validate_sources(&self) -> Vec<String> {
        let mut errors = vec![];
        let source = self.source_path();
        if !source.exists() {
            errors.push(format!("Source video missing: {}", source.display()));
        }
        if let Background::Image { path } = &self.project.style.background {
            let image = self.root.join(path);
            if !image.exists() {
                errors.push(format!("Background image missing: {}", image.display()));
            }
        }
        errors
    }

    /// Validate settings, style and timeline. Returns human-readable problems.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.validate_sources();
        if let Err(e) = self.project.export.validate() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.project.style.validate() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.timeline.validate() {
            errors.push(e.to_string());
        }
        errors
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, json).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem
    }
}

/// Time-derived identifier, unique enough for local bundles.
fn project_id(now: chrono::DateTime<chrono::Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default() as u64;
    let mixed = nanos ^ (std::process::id() as u64).rotate_left(40);
    format!("{:08x}-{:08x}", (mixed >> 32) as u32, mixed as u32)
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

impl From<ProjectError> for screenreel_common::error::ScreenreelError {
    fn from(err: ProjectError) -> Self {
        screenreel_common::error::ScreenreelError::project(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TrimRegion;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("screenreel_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_quality_output_sizes() {
        assert_eq!(ExportQuality::Medium.output_size(1920, 1080), (1280, 720));
        assert_eq!(ExportQuality::Good.output_size(2560, 1440), (1920, 1080));
        assert_eq!(ExportQuality::Good.output_size(1280, 720), (1280, 720));
        assert_eq!(ExportQuality::Source.output_size(1921, 1081), (1920, 1080));
    }

    #[test]
    fn test_quality_bitrate_is_clamped() {
        assert_eq!(ExportQuality::Medium.bitrate(16, 16, 1), 1_000_000);
        let good = ExportQuality::Good.bitrate(1920, 1080, 30);
        assert!(good > 5_000_000 && good < 10_000_000);
    }

    #[test]
    fn test_gif_frame_rate_validation() {
        assert!(is_valid_gif_frame_rate(15));
        assert!(is_valid_gif_frame_rate(30));
        assert!(!is_valid_gif_frame_rate(24));

        let settings = ExportSettings {
            format: ExportFormat::Gif,
            gif: GifExportConfig {
                frame_rate: 12,
                ..GifExportConfig::default()
            },
            ..ExportSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_gif_size_presets() {
        let config = GifExportConfig {
            size_preset: GifSizePreset::Large,
            ..GifExportConfig::default()
        };
        assert_eq!(config.output_size(3840, 2160), (1920, 1080));
        let original = GifExportConfig {
            size_preset: GifSizePreset::Original,
            ..GifExportConfig::default()
        };
        assert_eq!(original.output_size(1001, 601), (1000, 600));
    }

    #[test]
    fn test_frame_rate_follows_format() {
        let mut settings = ExportSettings::default();
        assert_eq!(settings.frame_rate(), 30);
        settings.format = ExportFormat::Gif;
        assert_eq!(settings.frame_rate(), 15);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex_color("1a1a1a"), Some([26, 26, 26]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn test_style_validation() {
        assert!(CanvasStyle::default().validate().is_ok());
        let style = CanvasStyle {
            background: Background::Gradient {
                angle_deg: 90.0,
                stops: vec!["#000000".to_string()],
            },
            ..CanvasStyle::default()
        };
        assert!(style.validate().is_err());
        let style = CanvasStyle {
            padding_percent: 55.0,
            ..CanvasStyle::default()
        };
        assert!(style.validate().is_err());
    }

    #[test]
    fn test_background_serialization_is_tagged() {
        let json = serde_json::to_string(&Background::solid("#101010")).unwrap();
        assert_eq!(json, r##"{"kind":"solid","color":"#101010"}"##);
    }

    #[test]
    fn test_loaded_project_create_and_load() {
        let dir = temp_dir("create_load");
        let created =
            LoadedProject::create(&dir, "Integration Test", SourceTrack::new("recording.mp4"))
                .unwrap();
        assert_eq!(created.project.name, "Integration Test");

        let mut edited = LoadedProject::load(&dir).unwrap();
        assert_eq!(edited.timeline.version, "1.0");
        edited.timeline.trims.push(TrimRegion::new(1000.0, 2000.0));
        edited.save().unwrap();

        let reloaded = LoadedProject::load(&dir).unwrap();
        assert_eq!(reloaded.timeline.trims.len(), 1);
        assert_eq!(reloaded.source_path(), dir.join("recording.mp4"));
        assert_eq!(
            reloaded.default_output_path(),
            dir.join("exports").join("Integration_Test.mp4")
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_sources_reports_missing() {
        let dir = temp_dir("validate");
        let loaded =
            LoadedProject::create(&dir, "Validate", SourceTrack::new("missing.mp4")).unwrap();
        let errors = loaded.validate();
        assert!(errors.iter().any(|e| e.contains("Source video missing")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sparse_project_json_uses_defaults() {
        let json = r#"{
            "version": "1.0",
            "name": "Sparse",
            "id": "abc",
            "created_at": "2026-01-01T00:00:00Z",
            "modified_at": "2026-01-01T00:00:00Z",
            "source": { "path": "screen.mp4" }
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.export, ExportSettings::default());
        assert_eq!(project.style, CanvasStyle::default());
        assert!(!project.source.has_audio);
    }
}
