//! Command-line interface for BLE color sensors.
//!
//! The CLI keeps a directory of sensor names in its config file and streams
//! color readings from them.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list` | List registered sensors |
//! | `add <name>` | Register a sensor by its advertised name |
//! | `remove <name>` | Unregister a sensor |
//! | `watch` | Connect to sensors and print their colors |
//!
//! # Output Formats
//!
//! - **Text** (default): one line per event, colors shown as `#RRGGBB` with a
//!   truecolor swatch
//! - **JSON**: one JSON object per event, for piping into other tools
//!
//! # Configuration
//!
//! The CLI stores configuration in `~/.config/colorsensor/config.toml` (or
//! platform equivalent):
//!
//! - `sensors`: registered sensor names
//! - `stagger_ms`: delay between starting consecutive sensors
//! - `timeout`: connect deadline in seconds
//! - `no_color`: disable colored output
//!
//! # Environment Variables
//!
//! - `COLORSENSOR_CONFIG`: config file path (overridden by `--config`)
//! - `NO_COLOR`: disable colored output when set
//! - `RUST_LOG`: log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! Register two sensors and watch both, starting them half a second apart:
//! ```bash
//! colorsensor add "Kitchen"
//! colorsensor add "Desk"
//! colorsensor watch --stagger-ms 500
//! ```
//!
//! Print ten readings from one sensor as JSON:
//! ```bash
//! colorsensor watch --sensor Desk --count 10 --format json
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;

// Re-export core dependencies for convenience
pub use colorsensor_core;
pub use colorsensor_types;
