//! Screenreel CLI: create, inspect and export screen-recording projects.
//!
//! Usage:
//!   screenreel init <NAME> --source <VIDEO>   Create a project around a recording
//!   screenreel info <PATH>                    Show project information
//!   screenreel validate <PATH>                Validate a project bundle
//!   screenreel export <PATH>                  Export a project to MP4 or GIF
//!   screenreel check                          Report media backend capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use screenreel_common::config::AppConfig;
use screenreel_project_model::project::{ExportFormat, ExportQuality, GifSizePreset};

mod commands;

#[derive(Parser)]
#[command(
    name = "screenreel",
    about = "Export screen recordings with zoom, crop, trims and canvas styling",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/screenreel/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project around a source recording
    Init {
        /// Project name
        name: String,

        /// Source video file
        #[arg(short, long)]
        source: PathBuf,

        /// Parent directory for the project bundle
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show project information
    Info {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Validate a project bundle
    Validate {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Export a project
    Export {
        /// Path to the project directory
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: ExportOverrides,

        /// Print progress as JSON lines instead of a status line
        #[arg(long)]
        json_progress: bool,
    },

    /// Check media backend capabilities
    Check,
}

/// Per-run overrides of the project's export settings.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ExportOverrides {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// MP4 quality preset
    #[arg(long, value_enum)]
    pub quality: Option<QualityArg>,

    /// MP4 frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// MP4 video bitrate in bits per second
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// GIF frame rate (15, 20, 25 or 30)
    #[arg(long)]
    pub gif_fps: Option<u32>,

    /// GIF size preset
    #[arg(long, value_enum)]
    pub gif_size: Option<GifSizeArg>,

    /// Play the GIF once instead of looping
    #[arg(long)]
    pub no_loop: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Mp4,
    Gif,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QualityArg {
    Medium,
    Good,
    Source,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GifSizeArg {
    Medium,
    Large,
    Original,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Mp4 => ExportFormat::Mp4,
            FormatArg::Gif => ExportFormat::Gif,
        }
    }
}

impl From<QualityArg> for ExportQuality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Medium => ExportQuality::Medium,
            QualityArg::Good => ExportQuality::Good,
            QualityArg::Source => ExportQuality::Source,
        }
    }
}

impl From<GifSizeArg> for GifSizePreset {
    fn from(value: GifSizeArg) -> Self {
        match value {
            GifSizeArg::Medium => GifSizePreset::Medium,
            GifSizeArg::Large => GifSizePreset::Large,
            GifSizeArg::Original => GifSizePreset::Original,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    screenreel_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Init {
            name,
            source,
            output,
        } => commands::init::run(name, source, output),
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Export {
            path,
            output,
            overrides,
            json_progress,
        } => commands::export::run(path, output, overrides, json_progress, &config).await,
        Commands::Check => commands::check::run(),
    }
}
