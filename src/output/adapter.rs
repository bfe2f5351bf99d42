use log::debug;

use crate::constants::TAR_MODE_MASK;
use crate::error::OutputError;
use crate::filesystem::FilesystemEntry;
use crate::models::{ArchiveEntry, EntryKind};

/// Turn a filesystem entry into an archive entry.
///
/// The entry is classified with its own predicates, never by name, checking
/// symlink first so a link to a directory stays a link. File content is not
/// opened here; the returned entry borrows `entry` and the serializer reads
/// it later.
///
/// # Arguments
///
/// * `path` - Acquisition-time identity of the entry (absolute, `/` separated)
/// * `entry` - The filesystem entry to describe
///
/// # Returns
///
/// * `Ok(ArchiveEntry)` - Entry ready for [`crate::output::tar::TarSerializer::write_entry`]
/// * `Err(OutputError::InvalidPath)` - `path` is not a normalized absolute path
/// * `Err(OutputError::UnsupportedEntryType)` - Not a file, symlink or directory
/// * `Err(OutputError::ContentRead)` - The entry vanished before it could be described
pub fn adapt<'a>(path: &str, entry: &'a dyn FilesystemEntry) -> Result<ArchiveEntry<'a>, OutputError> {
    validate_identity(path)?;

    let content_error = |source| OutputError::ContentRead {
        path: path.to_string(),
        source,
    };

    let mode = entry.mode().map_err(content_error)? & TAR_MODE_MASK;
    let mtime = entry.mtime().unwrap_or(0);

    let adapted = if entry.is_symlink() {
        let target = entry.readlink().map_err(content_error)?;
        ArchiveEntry {
            path: path.to_string(),
            kind: EntryKind::Symlink,
            size: 0,
            link_target: Some(target),
            mode,
            mtime,
            content: None,
        }
    } else if entry.is_dir() {
        ArchiveEntry {
            path: path.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            link_target: None,
            mode,
            mtime,
            content: None,
        }
    } else if entry.is_file() {
        ArchiveEntry {
            path: path.to_string(),
            kind: EntryKind::File,
            size: entry.size().map_err(content_error)?,
            link_target: None,
            mode,
            mtime,
            content: Some(entry),
        }
    } else {
        return Err(OutputError::UnsupportedEntryType(path.to_string()));
    };

    debug!("Adapted {} as {} ({} bytes)", adapted.path, adapted.kind, adapted.size);
    Ok(adapted)
}

/// Check that `path` is a normalized absolute identity string.
pub fn validate_identity(path: &str) -> Result<(), OutputError> {
    let invalid = || OutputError::InvalidPath(path.to_string());

    if path.is_empty() || !path.starts_with('/') || path.contains('\0') {
        return Err(invalid());
    }
    if path == "/" {
        return Ok(());
    }

    for component in path[1..].split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(invalid());
        }
    }

    Ok(())
}
