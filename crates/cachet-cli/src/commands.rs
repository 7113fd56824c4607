//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// List items stored under a location
    Ls {
        /// Location, e.g. s3://bucket/cache
        location: String,

        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether an item exists
    Exists {
        /// Item location
        location: String,
    },

    /// Write an item's contents to stdout
    Cat {
        /// Item location
        location: String,
    },

    /// Store a file (or stdin) as an item
    Put {
        /// Item location
        location: String,

        /// File to upload, stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Move an item
    Mv {
        /// Source location
        src: String,

        /// Destination location
        dst: String,
    },

    /// Delete every item under a location
    Clear {
        /// Location prefix
        location: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,
    },
}
