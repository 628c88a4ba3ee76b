//! CLI Module
//!
//! Command-line collaborator for the Voxshift engine: uploads, effect
//! requests, listing, export and deletion against one storage directory.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Voxshift - voice effects for short audio clips
#[derive(Parser, Debug)]
#[command(name = "voxshift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage directory (overrides the configuration)
    #[arg(short, long, global = true)]
    pub storage: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store an audio file as a new original
    #[command(name = "upload")]
    Upload {
        /// Path of the .wav or .mp3 file
        path: PathBuf,
    },

    /// Apply an effect to a stored original
    #[command(name = "process")]
    Process {
        /// Stored filename of the original
        filename: String,

        /// Effect id (see `voxshift effects`)
        effect: String,
    },

    /// List stored artifacts
    #[command(name = "list")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a stored artifact
    #[command(name = "delete")]
    Delete {
        /// Stored filename
        filename: String,
    },

    /// Show the available effects
    #[command(name = "effects")]
    Effects,

    /// Copy a stored artifact out of storage
    #[command(name = "export")]
    Export {
        /// Stored filename
        filename: String,

        /// Destination path
        dest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process_with_global_storage() {
        let cli = Cli::parse_from([
            "voxshift",
            "process",
            "clip.wav",
            "robotic",
            "--storage",
            "/tmp/clips",
        ]);
        assert_eq!(cli.storage, Some(PathBuf::from("/tmp/clips")));
        match cli.command {
            Some(Commands::Process { filename, effect }) => {
                assert_eq!(filename, "clip.wav");
                assert_eq!(effect, "robotic");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
