use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "raelctl")]
#[command(about = "RAEL - native plugin host", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (defaults to ./rael.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured plugin directory
    #[arg(long, global = true)]
    pub plugin_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "rael.toml")]
        path: PathBuf,
    },
    /// Load every plugin in the plugin directory and list them
    List {
        #[arg(long, default_value = "text", value_enum)]
        format: OutputFormat,
    },
    /// Load a single plugin library and report what it declares
    Load {
        /// Path to the plugin library
        path: PathBuf,
    },
    /// Show declared dependencies and a load order
    Deps,
    /// Load plugins and hot-reload them until Ctrl-C
    Watch,
}
