//! # evidence-output
//!
//! The output and protection stage of a forensic acquisition tool.
//!
//! ## Overview
//!
//! Entries collected from a target system (files, symlinks, directories) are
//! committed to a single portable tar archive. The archive can be compressed
//! and encrypted for one recipient, in a single forward pass over data whose
//! total size is not known in advance. A matching reader reverses the
//! encryption with the recipient's private key.
//!
//! ## Features
//!
//! - **Faithful tar serialization**: type, path, size, link target, mode and
//!   content preserved; PAX records for long paths and files over 8GB
//! - **Pluggable compression**: gzip, bzip2 or xz, chosen once per archive
//! - **Streaming hybrid encryption**: a fresh AES-256-GCM key per archive,
//!   wrapped with RSA-OAEP, applied in authenticated fixed-size chunks
//! - **Fail-closed decryption**: no unauthenticated plaintext is ever
//!   returned; reordered, truncated or extended containers are rejected
//!
//! ## Usage
//!
//! ```no_run
//! use evidence_output::config::{CompressionMethod, OutputConfig};
//! use evidence_output::filesystem::LocalEntry;
//! use evidence_output::output::{DecryptingReader, TarOutput};
//! use std::fs::File;
//!
//! # fn main() -> anyhow::Result<()> {
//! let public_key = std::fs::read("/keys/analyst.pub.pem")?;
//! let config = OutputConfig::new("/cases/host01")
//!     .with_compression(CompressionMethod::Gzip)
//!     .with_encryption(public_key);
//!
//! let mut output = TarOutput::new(config)?;
//! let entry = LocalEntry::new("/etc/hostname")?;
//! output.write_entry(&entry.identity(), &entry)?;
//! let summary = output.close()?;
//!
//! // On the analyst's side
//! let private_key = std::fs::read("/keys/analyst.pem")?;
//! let reader = DecryptingReader::open_pem(File::open(&summary.path)?, &private_key)?;
//! let _gzip_tar = reader.into_tempfile()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Output options and compression methods
//! - [`constants`]: Container formats and application-wide constants
//! - [`error`]: Typed errors of the output and decryption paths
//! - [`filesystem`]: Entry providers handed to an output
//! - [`models`]: Archive entries and summaries
//! - [`output`]: The write pipeline and the decryption reader
//! - [`utils`]: Hashing and summary reporting

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Output configuration and compression methods
pub mod config;

/// Application constants and container format values
pub mod constants;

/// Error types for writing and decrypting archives
pub mod error;

/// Filesystem entry providers
pub mod filesystem;

/// Core data models and structures used throughout the application
pub mod models;

/// Archive writer stack and decryption reader
pub mod output;

/// Utility functions for hashing and reporting
pub mod utils;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
