//! # CLI Argument Definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface of the vault host tool.
#[derive(Debug, Parser)]
#[command(name = "wmp-vaultctl")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Moves media into the Watermelon Player vault and plays it back")]
pub struct Cli {
    /// Configuration file (extension optional). Defaults to `vaultctl` in the working
    /// directory, which may be absent.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: VaultCommand,
}

#[derive(Debug, Subcommand)]
pub enum VaultCommand {
    /// Encrypt a file into the vault
    Add {
        file: PathBuf,
        /// Delete the plaintext original after a successful move
        #[arg(long)]
        remove_source: bool,
    },
    /// List vault entries
    #[command(alias = "ls")]
    List {},
    /// Decrypt a byte range of an entry to a file or stdout
    Play {
        id: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        length: Option<u64>,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Decrypt an entry end to end and check its authentication tag
    Verify { id: String },
    /// Delete an entry, its container and its key
    #[command(alias = "rm")]
    Remove { id: String },
}
