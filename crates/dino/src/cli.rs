//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dino::{BridgeConfig, DecodeLimits};
use dino_state::{DEFAULT_MAX_OBSTACLES, DEFAULT_MAX_TOTAL_CELLS};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "dino")]
#[command(about = "Dino bridge - drive a simulation producer and decode its state buffer")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode every frame in a frame file
    Decode {
        /// Frame file (one frame per line, `null` for a missing buffer)
        #[arg(value_name = "FRAMES")]
        frames: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Drive the full lifecycle over recorded frames
    Replay {
        /// Frame file (one frame per line, `null` for a missing buffer)
        #[arg(value_name = "FRAMES")]
        path: PathBuf,

        #[command(flatten)]
        drive: DriveArgs,

        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Load a native producer library and drive it
    Run {
        /// Shared library exporting the game_* entry points
        #[arg(value_name = "LIBRARY")]
        library: PathBuf,

        #[command(flatten)]
        drive: DriveArgs,

        #[command(flatten)]
        limits: LimitArgs,
    },
}

/// Options shared by the commands that drive a session.
#[derive(Args, Clone, Debug)]
pub struct DriveArgs {
    /// Number of frames to step
    #[arg(long, default_value = "600")]
    pub frames: usize,

    /// Simulated milliseconds per frame
    #[arg(long, default_value = "16")]
    pub frame_ms: f32,

    /// Jump when the nearest obstacle ahead is within this many units
    #[arg(long, value_name = "DISTANCE", num_args = 0..=1, default_missing_value = "60")]
    pub auto_jump: Option<f32>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the decoded session to a frame file that `replay` can read
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,
}

/// Header-tier decode limits.
#[derive(Args, Clone, Copy, Debug)]
pub struct LimitArgs {
    /// Maximum obstacle count accepted in a header
    #[arg(long, default_value_t = DEFAULT_MAX_OBSTACLES)]
    pub max_obstacles: usize,

    /// Maximum total cells accepted in a buffer
    #[arg(long = "max-cells", default_value_t = DEFAULT_MAX_TOTAL_CELLS)]
    pub max_total_cells: usize,
}

impl LimitArgs {
    pub fn config(self) -> BridgeConfig {
        BridgeConfig::default().with_limits(DecodeLimits {
            max_obstacles: self.max_obstacles,
            max_total_cells: self.max_total_cells,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Text,
    /// Raw key-value output (for scripting)
    Raw,
    /// JSON output (one object per line)
    Json,
}
