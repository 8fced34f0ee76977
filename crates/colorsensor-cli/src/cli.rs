//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for the watch command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines with a color swatch
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "colorsensor")]
#[command(author, version, about = "Monitor BLE color sensors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file holding the sensor directory
    #[arg(long, global = true, env = "COLORSENSOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List registered sensors
    List,

    /// Register a sensor by its advertised name
    Add {
        /// Advertised device name, matched exactly
        name: String,
    },

    /// Unregister a sensor
    Remove {
        /// Advertised device name
        name: String,
    },

    /// Connect to sensors and stream their colors
    Watch(WatchArgs),
}

/// Arguments for the watch command
#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Sensor to watch; repeat for several. Defaults to every registered sensor
    #[arg(short, long = "sensor", value_name = "NAME")]
    pub sensors: Vec<String>,

    /// Delay between starting consecutive sensors, in milliseconds
    #[arg(long, value_name = "MS")]
    pub stagger_ms: Option<u64>,

    /// Give up on sensors not connected after this many seconds
    #[arg(short = 'T', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Stop after this many color values (0 for unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    pub count: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}
