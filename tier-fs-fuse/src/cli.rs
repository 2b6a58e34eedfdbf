use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tier-fs", about = "Manipulate a tier-fs image from the host")]
pub struct Cli {
    /// Path of the file-system image
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    /// Log verbosity (-v info, -vv debug)
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialise the image as an empty file system
    Format {
        /// Device size in sectors
        #[arg(long, default_value_t = 1024)]
        sectors: usize,
    },
    /// Create an empty file of a fixed size in the working directory
    Create { name: String, size: usize },
    /// Create a sub-directory
    Mkdir { name: String },
    /// Remove a file
    Rm { name: String },
    /// Remove a directory and everything below it
    Rmdir { name: String },
    /// Rename a file
    Rename { old: String, new: String },
    /// Change the working directory; ".." ascends. Persists in the image.
    Cd { name: String },
    /// List the working directory
    Ls,
    /// Dump the visible file-system state
    Print,
    /// Copy a host file into the image
    Put {
        source: PathBuf,
        /// Name inside the image; defaults to the source file name
        name: Option<String>,
    },
}
