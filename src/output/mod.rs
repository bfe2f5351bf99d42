//! The archive output pipeline and its decryption reader.
//!
//! Write path:
//!
//! ```text
//! FilesystemEntry -> adapter -> TarSerializer -> compression? -> encryption? -> file
//! ```
//!
//! [`TarOutput`] owns one destination file and builds the stack once from an
//! [`crate::config::OutputConfig`]. The read path, [`DecryptingReader`], only
//! reverses the encryption layer; decompression and tar parsing are left to
//! the consumer.
//!
//! ## Example
//!
//! ```no_run
//! use evidence_output::config::{CompressionMethod, OutputConfig};
//! use evidence_output::output::TarOutput;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = OutputConfig::new("/cases/host01").with_compression(CompressionMethod::Xz);
//! let mut output = TarOutput::new(config)?;
//! output.write_bytes("/reports/uname.txt", b"Linux host01 6.1.0")?;
//! let summary = output.close()?;
//! println!("{} entries in {}", summary.entry_count, summary.path);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod compression;
pub mod container;
pub mod decrypt;
pub mod encryption;
pub mod tar;
pub mod tar_output;

pub use compression::{ArchiveSink, SinkReport};
pub use container::{inspect_container, ContainerHeader, ContainerInfo};
pub use decrypt::{load_private_key, DecryptingReader};
pub use encryption::EncryptingWriter;
pub use tar::TarSerializer;
pub use tar_output::TarOutput;
