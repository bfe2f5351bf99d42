use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CompressionMethod;

/// Command-line arguments for the evidence-output tool.
///
/// The tool packs acquired files into a single tar archive, optionally
/// compressed and encrypted for a recipient, and reverses the encryption
/// on the analyst's side.
#[derive(Parser, Debug)]
#[clap(
    name = "evidence-output",
    version,
    about = "Package acquired evidence into compressed, encrypted tar archives"
)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive files and directories into a new output
    Archive(ArchiveOpts),

    /// Decrypt an encrypted archive back to its tar stream
    Decrypt(DecryptOpts),

    /// Show the header and chunk layout of an encrypted archive
    Inspect {
        /// Encrypted archive to inspect
        input: PathBuf,
    },
}

/// Options for the archive subcommand.
///
/// Command-line flags override values loaded from `--config`.
#[derive(ClapArgs, Debug)]
pub struct ArchiveOpts {
    /// Files or directories to archive; directories are walked without following symlinks
    #[clap(required = true)]
    pub sources: Vec<PathBuf>,

    /// Archive base path; extensions are appended (default: <tmp>/evidence-output/<host>_<time>)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Path to output configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Compress the archive
    #[clap(long)]
    pub compress: bool,

    /// Compression method (implies --compress)
    #[clap(long, value_enum)]
    pub compression_method: Option<CompressionMethod>,

    /// Compression level
    #[clap(long)]
    pub compression_level: Option<u32>,

    /// Encrypt the archive for the holder of the private half of --public-key
    #[clap(long)]
    pub encrypt: bool,

    /// PEM encoded RSA public key of the recipient (implies --encrypt)
    #[clap(long)]
    pub public_key: Option<PathBuf>,

    /// Write a JSON summary next to the archive
    #[clap(long)]
    pub summary: bool,
}

/// Options for the decrypt subcommand.
#[derive(ClapArgs, Debug)]
pub struct DecryptOpts {
    /// Encrypted archive
    pub input: PathBuf,

    /// PEM encoded RSA private key
    #[clap(short = 'k', long)]
    pub private_key: PathBuf,

    /// Destination of the decrypted stream (default: input without the .enc suffix)
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}
