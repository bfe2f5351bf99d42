//! Input boundary: filesystem entries handed to an output.
//!
//! The output stage never walks or mutates a filesystem itself. It is given
//! entries through the [`FilesystemEntry`] trait, classifies them with the
//! entry's own predicates, and opens file content only when it is copied.
//!
//! Two providers ship with the crate:
//!
//! - [`LocalEntry`]: an entry on the local disk, described with `lstat`
//!   semantics so symlinks are never followed.
//! - [`MemoryEntry`]: an entry held in memory, used for generated content
//!   (reports, command output) and in tests.

use std::io::{self, Read};

mod local;
mod memory;

pub use local::{to_identity, walk_tree, LocalEntry, TreeWalk};
pub use memory::MemoryEntry;

/// One entry supplied by a filesystem provider.
pub trait FilesystemEntry {
    fn is_file(&self) -> bool;
    fn is_dir(&self) -> bool;
    fn is_symlink(&self) -> bool;

    /// Content size in bytes; meaningful for files only.
    fn size(&self) -> io::Result<u64>;

    /// Permission and type bits as reported by the provider.
    fn mode(&self) -> io::Result<u32>;

    /// Modification time in seconds since the epoch, if known.
    fn mtime(&self) -> Option<i64> {
        None
    }

    /// Target of a symlink, read without following it.
    fn readlink(&self) -> io::Result<String>;

    /// Open the content for reading. May be called again for a fresh reader.
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}
