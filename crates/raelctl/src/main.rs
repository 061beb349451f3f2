mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    rael_runtime::init_logging();

    // Parse CLI args
    let cli = Cli::parse();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    // Load config
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.plugin_dir {
        config.plugins.directory = dir;
    }

    // Dispatch to command
    match cli.command {
        Commands::Init { .. } => {
            // Already handled above
            unreachable!()
        }
        Commands::List { format } => commands::list::execute(config, format)?,
        Commands::Load { path } => commands::load::execute(config, &path)?,
        Commands::Deps => commands::deps::execute(config)?,
        Commands::Watch => commands::watch::execute(config).await?,
    }

    Ok(())
}
