use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CompressionMethod;
use crate::filesystem::FilesystemEntry;

/// Kind of an archived entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Symlink,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Symlink => write!(f, "symlink"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// One filesystem entry ready for serialization.
///
/// Built by [`crate::output::adapter::adapt`]. The content of a file is not
/// read until the serializer copies it; the entry only borrows the source.
pub struct ArchiveEntry<'a> {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub link_target: Option<String>,
    pub mode: u32,
    pub mtime: i64,
    pub content: Option<&'a dyn FilesystemEntry>,
}

impl fmt::Debug for ArchiveEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("link_target", &self.link_target)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("mtime", &self.mtime)
            .finish()
    }
}

/// Outcome of a closed output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArchiveSummary {
    pub path: String,
    pub entry_count: u64,
    pub archive_bytes: u64,
    pub bytes_on_disk: u64,
    pub compression: Option<CompressionMethod>,
    pub encrypted: bool,
    pub encrypted_chunks: Option<u64>,
    pub sha256: String,
    pub closed_at: String,
}
