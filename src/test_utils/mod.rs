//! Test utilities for evidence-output
//!
//! This module provides common testing helpers, key material and mock
//! filesystem entries for use across the unit test modules.

#![cfg(test)]

use anyhow::Result;
use std::fs;
use tempfile::TempDir;

/// Creates a temporary directory that is automatically cleaned up
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file structure in a temporary directory
///
/// Layout: two files at the top, a nested directory with one file, and on
/// unix a symlink pointing at `file1.txt`.
pub fn create_test_file_structure() -> Result<TempDir> {
    let temp_dir = create_temp_dir()?;
    let base_path = temp_dir.path();

    fs::create_dir_all(base_path.join("dir1/subdir1"))?;
    fs::write(base_path.join("file1.txt"), b"Test content 1")?;
    fs::write(base_path.join("file2.log"), b"Test log content")?;
    fs::write(base_path.join("dir1/subdir1/file3.txt"), b"Test content 3")?;

    #[cfg(unix)]
    std::os::unix::fs::symlink("file1.txt", base_path.join("link1"))?;

    Ok(temp_dir)
}

/// RSA key material for encryption tests
pub mod keys {
    use openssl::rsa::Rsa;
    use std::sync::OnceLock;

    #[derive(Clone)]
    pub struct TestKeyPair {
        pub public_pem: Vec<u8>,
        pub private_pem: Vec<u8>,
    }

    fn generate() -> TestKeyPair {
        let rsa = Rsa::generate(2048).unwrap();
        TestKeyPair {
            public_pem: rsa.public_key_to_pem().unwrap(),
            private_pem: rsa.private_key_to_pem().unwrap(),
        }
    }

    /// A 2048-bit key pair, generated once per test binary
    pub fn test_key_pair() -> TestKeyPair {
        static KEYS: OnceLock<TestKeyPair> = OnceLock::new();
        KEYS.get_or_init(generate).clone()
    }

    /// A second, unrelated key pair
    pub fn other_key_pair() -> TestKeyPair {
        static KEYS: OnceLock<TestKeyPair> = OnceLock::new();
        KEYS.get_or_init(generate).clone()
    }
}

/// Filesystem entries that misbehave in controlled ways
pub mod mock_fs {
    use crate::filesystem::FilesystemEntry;
    use std::io::{self, Cursor, Read};

    /// Neither a file, a directory nor a symlink (a device node, say)
    pub struct UnknownEntry;

    impl FilesystemEntry for UnknownEntry {
        fn is_file(&self) -> bool {
            false
        }
        fn is_dir(&self) -> bool {
            false
        }
        fn is_symlink(&self) -> bool {
            false
        }
        fn size(&self) -> io::Result<u64> {
            Ok(0)
        }
        fn mode(&self) -> io::Result<u32> {
            Ok(0o060660)
        }
        fn readlink(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink"))
        }
        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file"))
        }
    }

    /// A file whose content vanished after it was listed
    pub struct FailingEntry {
        size: u64,
    }

    impl FailingEntry {
        pub fn new(size: u64) -> Self {
            Self { size }
        }
    }

    impl FilesystemEntry for FailingEntry {
        fn is_file(&self) -> bool {
            true
        }
        fn is_dir(&self) -> bool {
            false
        }
        fn is_symlink(&self) -> bool {
            false
        }
        fn size(&self) -> io::Result<u64> {
            Ok(self.size)
        }
        fn mode(&self) -> io::Result<u32> {
            Ok(0o100644)
        }
        fn readlink(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink"))
        }
        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "file vanished"))
        }
    }

    /// A file whose declared size disagrees with its content
    pub struct LyingEntry {
        content: Vec<u8>,
        declared_size: u64,
    }

    impl LyingEntry {
        pub fn new(content: Vec<u8>, declared_size: u64) -> Self {
            Self { content, declared_size }
        }
    }

    impl FilesystemEntry for LyingEntry {
        fn is_file(&self) -> bool {
            true
        }
        fn is_dir(&self) -> bool {
            false
        }
        fn is_symlink(&self) -> bool {
            false
        }
        fn size(&self) -> io::Result<u64> {
            Ok(self.declared_size)
        }
        fn mode(&self) -> io::Result<u32> {
            Ok(0o100644)
        }
        fn readlink(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink"))
        }
        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(Cursor::new(&self.content[..])))
        }
    }
}
