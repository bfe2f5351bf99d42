use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::filesystem::FilesystemEntry;

/// A filesystem entry on the local disk.
///
/// Metadata is taken with `symlink_metadata` when the entry is created, so
/// a symlink is reported as a symlink and its target is never followed.
#[derive(Debug)]
pub struct LocalEntry {
    path: PathBuf,
    metadata: Metadata,
}

impl LocalEntry {
    /// Describe the entry at `path` without following a final symlink.
    pub fn new<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        let metadata = fs::symlink_metadata(&path)?;
        Ok(Self { path, metadata })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity string for the archive: absolute, slash separated.
    pub fn identity(&self) -> String {
        to_identity(&self.path)
    }
}

impl FilesystemEntry for LocalEntry {
    fn is_file(&self) -> bool {
        self.metadata.file_type().is_file()
    }

    fn is_dir(&self) -> bool {
        self.metadata.file_type().is_dir()
    }

    fn is_symlink(&self) -> bool {
        self.metadata.file_type().is_symlink()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata.len())
    }

    #[cfg(unix)]
    fn mode(&self) -> io::Result<u32> {
        use std::os::unix::fs::PermissionsExt;
        Ok(self.metadata.permissions().mode())
    }

    #[cfg(not(unix))]
    fn mode(&self) -> io::Result<u32> {
        let base = if self.is_dir() { 0o755 } else { 0o644 };
        if self.metadata.permissions().readonly() {
            Ok(base & !0o222)
        } else {
            Ok(base)
        }
    }

    fn mtime(&self) -> Option<i64> {
        self.metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
    }

    fn readlink(&self) -> io::Result<String> {
        let target = fs::read_link(&self.path)?;
        Ok(target.to_string_lossy().replace('\\', "/"))
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Convert a local path to an archive identity: absolute, `/` separated,
/// with Windows drive prefixes kept as a leading component (`/C:/Users`).
pub fn to_identity(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut parts: Vec<String> = Vec::new();
    for component in absolute.components() {
        match component {
            std::path::Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().to_string())
            }
            std::path::Component::Normal(name) => parts.push(name.to_string_lossy().to_string()),
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::RootDir | std::path::Component::CurDir => {}
        }
    }

    format!("/{}", parts.join("/"))
}

/// Walk `root` without following symlinks, yielding every entry, root
/// included, in walk order. Entries are produced one at a time as the
/// directory tree is read. Unreadable entries are logged and skipped.
pub fn walk_tree(root: &Path) -> TreeWalk {
    TreeWalk {
        root: root.to_path_buf(),
        inner: WalkDir::new(root).follow_links(false).sort_by_file_name().into_iter(),
        excluded: Vec::new(),
    }
}

/// Lazy iterator over a local directory tree, see [`walk_tree`].
pub struct TreeWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
    excluded: Vec<PathBuf>,
}

impl TreeWalk {
    /// Skip `path` if the walk reaches it, such as the archive being written
    /// into one of the source directories.
    pub fn excluding(mut self, path: &Path) -> Self {
        self.excluded.push(resolve(path).unwrap_or_else(|| path.to_path_buf()));
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| {
            path == excluded.as_path()
                || (path.file_name() == excluded.file_name()
                    && resolve(path).map_or(false, |resolved| &resolved == excluded))
        })
    }
}

impl Iterator for TreeWalk {
    type Item = LocalEntry;

    fn next(&mut self) -> Option<LocalEntry> {
        loop {
            let item = match self.inner.next()? {
                Ok(item) => item,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };

            if !self.excluded.is_empty() && self.is_excluded(item.path()) {
                debug!("Skipping {}: excluded from walk", item.path().display());
                continue;
            }

            match LocalEntry::new(item.path()) {
                Ok(entry) => return Some(entry),
                Err(e) => warn!("Skipping {}: {}", item.path().display(), e),
            }
        }
    }
}

/// Canonical form of `path` with only the parent resolved, so a symlink
/// keeps its own name instead of turning into its target.
fn resolve(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|parent| parent.join(name))
}
