use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use colorsensor_cli::cli::{Cli, Commands};
use colorsensor_cli::commands::{cmd_add, cmd_list, cmd_remove, cmd_watch};
use colorsensor_cli::config::{Config, Directory};
use colorsensor_cli::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    tracing::debug!("Using config: {}", path.display());
    let mut directory = Directory::open(path);

    let no_color =
        cli.no_color || directory.config().no_color || std::env::var_os("NO_COLOR").is_some();

    match cli.command {
        Commands::List => cmd_list(&directory, cli.quiet)?,
        Commands::Add { name } => {
            cmd_add(&mut directory, &name, cli.quiet)?;
        }
        Commands::Remove { name } => {
            cmd_remove(&mut directory, &name, cli.quiet)?;
        }
        Commands::Watch(args) => {
            cmd_watch(&directory, args, FormatOptions::new(no_color), cli.quiet).await?
        }
    }

    Ok(())
}
