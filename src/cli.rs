//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// iplocate - IP geolocation and ASN lookup service
#[derive(Parser, Debug)]
#[command(name = "iplocate")]
#[command(version)]
#[command(about = "IP to country / city / ASN lookup service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Download and load the configured datasets, then exit
    Refresh {
        /// Reload even if the source has not changed
        #[arg(long)]
        force: bool,
    },

    /// Resolve a single address against the loaded data
    Lookup {
        /// IPv4 or IPv6 address
        ip: String,
    },

    /// Show the loaded generation of every dataset
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Configuration management commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.toml)
        output_path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
