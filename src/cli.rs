use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "camkeep")]
#[command(author, version, about = "Continuous IP camera recording with self-healing")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start recording all cameras and keep them healthy
    Capture,

    /// Find and repair recordings with missing metadata
    Repair {
        /// Scan every camera once and exit
        #[arg(long)]
        once: bool,
    },

    /// Check that required external tools are available
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate,

    /// Display version information
    Version,
}
