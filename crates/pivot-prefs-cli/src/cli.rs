//! CLI argument definitions for pivot-prefs.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and edit per-application preferences stored under `~/.pivot`.
#[derive(Parser)]
#[command(
    name = "pivot-prefs",
    version,
    about = "Inspect and edit pivot preferences",
    long_about = "Reads and writes the JSON preference contexts that applications keep \
                  under the hidden .pivot directory of the user's home."
)]
pub struct Cli {
    /// Application name; dots map to nested directories.
    #[arg(long, short, global = true, default_value = "")]
    pub app: String,

    /// Root the preferences here instead of the home directory.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the preferences directory and the resource of a context.
    Path {
        #[arg(long, short)]
        context: Option<String>,
    },

    /// List the stored contexts of the application.
    List,

    /// Print the raw content of a context.
    Dump {
        #[arg(long, short)]
        context: Option<String>,
    },

    /// Print one value of a context as JSON.
    Get {
        key: String,
        #[arg(long, short)]
        context: Option<String>,
    },

    /// Set a value and save the context. VALUE is parsed as JSON, falling
    /// back to a plain string.
    Set {
        key: String,
        value: String,
        #[arg(long, short)]
        context: Option<String>,
    },

    /// Remove a value and save the context.
    Remove {
        key: String,
        #[arg(long, short)]
        context: Option<String>,
    },

    /// Delete a stored context.
    Delete {
        #[arg(long, short)]
        context: Option<String>,
    },

    /// Delete every stored context of the application.
    Purge,
}
