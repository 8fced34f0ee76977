//! Command implementations for the CLI.

mod directory;
mod watch;

pub use directory::{cmd_add, cmd_list, cmd_remove};
pub use watch::{WatchOptions, cmd_watch};
