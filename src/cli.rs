//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGS: i32 = 2;
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// Preset or confirmation model could not be loaded
    pub const MODEL_LOAD_ERROR: i32 = 4;
}

/// Defect inspection for scanned book pages
#[derive(Debug, Parser)]
#[command(name = "page-inspector", version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ./page-inspector.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch a scan folder and inspect each new spread as it arrives
    Live(LiveArgs),
    /// Normalize every raw scan of one or more book folders into pages
    Cut(BookArgs),
    /// Classify and confirm the pages of books that were already cut
    Inspect(BookArgs),
    /// Cut then inspect
    Run(BookArgs),
    /// Show system information and config file locations
    Info,
}

/// Settings shared by every processing command
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Root directory for presets, models and outputs
    #[arg(long)]
    pub root_dir: Option<PathBuf>,

    /// Edge length of normalized pages in pixels
    #[arg(long)]
    pub temp_image_size: Option<u32>,

    /// Patches per page side
    #[arg(short, long)]
    pub grid_size: Option<u32>,

    /// Maximum worker threads
    #[arg(short = 'j', long)]
    pub max_cores: Option<usize>,

    /// Preset file name under `<root>/presets/`
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Raw scan file extension
    #[arg(long)]
    pub raw_extension: Option<String>,
}

impl CommonArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root_dir: self.root_dir.clone(),
            temp_image_size: self.temp_image_size,
            grid_size: self.grid_size,
            max_cores: self.max_cores,
            preset: self.preset.clone(),
            raw_extension: self.raw_extension.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct BookArgs {
    /// Book scan folders; the folder name is the book barcode
    #[arg(required = true)]
    pub folders: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LiveArgs {
    /// Folder the scanner writes into; the folder name is the book barcode
    pub folder: PathBuf,

    /// Scans already in the folder are inspected too instead of skipped
    #[arg(long)]
    pub include_existing: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}
