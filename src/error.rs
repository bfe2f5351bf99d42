//! Error types for the output pipeline and the decryption reader.
//!
//! The library reports failures with typed errors so callers can tell a
//! vanished source file from a full disk or a tampered container; the binary
//! wraps them in `anyhow` with context.

use std::io;

use thiserror::Error;

/// Errors raised while building or writing an archive.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The content source of an entry vanished or failed mid-copy.
    #[error("Failed to read content of {path}: {source}")]
    ContentRead {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The bytes copied for an entry did not match its declared size.
    #[error("Size mismatch for {path}: declared {declared} bytes, read {actual} bytes")]
    SizeMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    /// The destination refused bytes.
    #[error("Failed to write archive: {0}")]
    Sink(#[source] io::Error),

    /// A construction option was missing, inconsistent or unknown.
    #[error("Unsupported output option: {0}")]
    UnsupportedOption(String),

    /// The identity path of an entry is not a normalized absolute path.
    #[error("Invalid entry path: {0:?}")]
    InvalidPath(String),

    /// The entry is neither a file, a symlink nor a directory.
    #[error("Unsupported entry type for {0}")]
    UnsupportedEntryType(String),

    /// The recipient public key could not be parsed or used.
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// A write was attempted after `close`.
    #[error("Output is already closed")]
    Closed,
}

impl OutputError {
    /// Rebuild an equivalent error so a failed handle can report the same
    /// failure again from later calls.
    pub fn replay(&self) -> OutputError {
        match self {
            OutputError::ContentRead { path, source } => OutputError::ContentRead {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            OutputError::SizeMismatch { path, declared, actual } => OutputError::SizeMismatch {
                path: path.clone(),
                declared: *declared,
                actual: *actual,
            },
            OutputError::Sink(e) => OutputError::Sink(io::Error::new(e.kind(), e.to_string())),
            OutputError::UnsupportedOption(msg) => OutputError::UnsupportedOption(msg.clone()),
            OutputError::InvalidPath(path) => OutputError::InvalidPath(path.clone()),
            OutputError::UnsupportedEntryType(path) => {
                OutputError::UnsupportedEntryType(path.clone())
            }
            OutputError::InvalidKey(msg) => OutputError::InvalidKey(msg.clone()),
            OutputError::Closed => OutputError::Closed,
        }
    }
}

/// Errors raised while opening or reading an encrypted container.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header is missing, truncated or malformed.
    #[error("Malformed encrypted container: {0}")]
    Format(String),

    /// The header names algorithms this reader does not implement.
    #[error("Unsupported container algorithms (cipher id {cipher}, key wrap id {wrap})")]
    UnsupportedAlgorithm { cipher: u8, wrap: u8 },

    /// The private key could not be loaded.
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// The symmetric key could not be unwrapped: wrong private key or corrupted header.
    #[error("Failed to unwrap archive key, wrong private key or corrupted header: {0}")]
    KeyUnwrap(String),

    /// A chunk failed authentication.
    #[error("Chunk {index} failed authentication; container is corrupted or tampered with")]
    ChunkAuthentication { index: u64 },

    /// A chunk carried an unexpected index.
    #[error("Chunk out of order: expected index {expected}, found {found}")]
    ChunkOutOfOrder { expected: u64, found: u64 },

    /// The stream ended before the final chunk.
    #[error("Container truncated at chunk {index}")]
    Truncated { index: u64 },

    /// Bytes follow the final chunk.
    #[error("Unexpected data after final chunk")]
    TrailingData,
}

impl DecryptError {
    /// Recover the typed error carried by an `io::Error` returned from
    /// `DecryptingReader`'s `Read` implementation.
    pub fn from_io(err: io::Error) -> DecryptError {
        if err.get_ref().map_or(false, |inner| inner.is::<DecryptError>()) {
            match err.into_inner().map(|inner| inner.downcast::<DecryptError>()) {
                Some(Ok(decrypt_err)) => *decrypt_err,
                Some(Err(other)) => DecryptError::Io(io::Error::new(io::ErrorKind::Other, other)),
                None => DecryptError::Format("empty I/O error".to_string()),
            }
        } else {
            DecryptError::Io(err)
        }
    }

    /// Rebuild an equivalent error so a failed reader keeps reporting the
    /// original failure on later reads.
    pub fn replay(&self) -> DecryptError {
        match self {
            DecryptError::Io(e) => DecryptError::Io(io::Error::new(e.kind(), e.to_string())),
            DecryptError::Format(msg) => DecryptError::Format(msg.clone()),
            DecryptError::UnsupportedAlgorithm { cipher, wrap } => DecryptError::UnsupportedAlgorithm {
                cipher: *cipher,
                wrap: *wrap,
            },
            DecryptError::InvalidKey(msg) => DecryptError::InvalidKey(msg.clone()),
            DecryptError::KeyUnwrap(msg) => DecryptError::KeyUnwrap(msg.clone()),
            DecryptError::ChunkAuthentication { index } => {
                DecryptError::ChunkAuthentication { index: *index }
            }
            DecryptError::ChunkOutOfOrder { expected, found } => DecryptError::ChunkOutOfOrder {
                expected: *expected,
                found: *found,
            },
            DecryptError::Truncated { index } => DecryptError::Truncated { index: *index },
            DecryptError::TrailingData => DecryptError::TrailingData,
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            DecryptError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_keeps_variant_and_message() {
        let original = OutputError::ContentRead {
            path: "/foo/bar".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        let replayed = original.replay();

        assert!(matches!(replayed, OutputError::ContentRead { .. }));
        assert_eq!(original.to_string(), replayed.to_string());
    }

    #[test]
    fn test_decrypt_error_survives_io_wrapping() {
        let wrapped = DecryptError::ChunkAuthentication { index: 7 }.into_io();
        assert_eq!(wrapped.kind(), io::ErrorKind::InvalidData);

        match DecryptError::from_io(wrapped) {
            DecryptError::ChunkAuthentication { index } => assert_eq!(index, 7),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decrypt_replay_keeps_variant_and_message() {
        let original = DecryptError::ChunkOutOfOrder { expected: 2, found: 5 };
        let replayed = original.replay();
        assert!(matches!(replayed, DecryptError::ChunkOutOfOrder { expected: 2, found: 5 }));
        assert_eq!(original.to_string(), replayed.to_string());

        let io_err = DecryptError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        match io_err.replay() {
            DecryptError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(DecryptError::from_io(err), DecryptError::Io(_)));
    }
}
