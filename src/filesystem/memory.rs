use std::io::{self, Cursor, Read};

use crate::filesystem::FilesystemEntry;

#[derive(Debug, Clone)]
enum MemoryKind {
    File(Vec<u8>),
    Symlink(String),
    Directory,
}

/// A filesystem entry whose content lives in memory.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    kind: MemoryKind,
    mode: u32,
    mtime: Option<i64>,
}

impl MemoryEntry {
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MemoryKind::File(content.into()),
            mode: 0o100644,
            mtime: None,
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        Self {
            kind: MemoryKind::Symlink(target.into()),
            mode: 0o120777,
            mtime: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: MemoryKind::Directory,
            mode: 0o040755,
            mtime: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// File content, `None` for symlinks and directories.
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            MemoryKind::File(data) => Some(data),
            _ => None,
        }
    }
}

impl FilesystemEntry for MemoryEntry {
    fn is_file(&self) -> bool {
        matches!(self.kind, MemoryKind::File(_))
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, MemoryKind::Directory)
    }

    fn is_symlink(&self) -> bool {
        matches!(self.kind, MemoryKind::Symlink(_))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.content().map_or(0, |data| data.len() as u64))
    }

    fn mode(&self) -> io::Result<u32> {
        Ok(self.mode)
    }

    fn mtime(&self) -> Option<i64> {
        self.mtime
    }

    fn readlink(&self) -> io::Result<String> {
        match &self.kind {
            MemoryKind::Symlink(target) => Ok(target.clone()),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink")),
        }
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match &self.kind {
            MemoryKind::File(data) => Ok(Box::new(Cursor::new(data.as_slice()))),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file")),
        }
    }
}
