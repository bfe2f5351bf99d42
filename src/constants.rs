//! Global constants for the evidence-output application.
//!
//! This module centralizes the fixed parameters of the tar container and the
//! encrypted container so both the writers and the readers agree on them.

// Tar container constants
/// Size of one tar block; headers and content padding align to it
pub const TAR_BLOCK_SIZE: usize = 512;

/// Tar record size (20 blocks), the archive is padded to a multiple of it on close
pub const TAR_RECORD_SIZE: usize = 20 * TAR_BLOCK_SIZE;

/// Longest name or link name a plain ustar header can carry
pub const TAR_NAME_FIELD_LEN: usize = 100;

/// Largest size an 11-digit octal size field can hold (8GB - 1)
pub const TAR_MAX_OCTAL_SIZE: u64 = 0o77777777777;

/// ustar magic and version
pub const TAR_USTAR_MAGIC: &[u8; 6] = b"ustar\0";
pub const TAR_USTAR_VERSION: &[u8; 2] = b"00";

/// Name given to PAX extended header entries
pub const TAR_PAX_HEADER_NAME: &str = "././@PaxHeader";

/// Permission bits kept in the mode field
pub const TAR_MODE_MASK: u32 = 0o7777;

// Memory and buffer size constants
/// Increment used when copying entry content into the archive (64KB)
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Buffer in front of the destination file (1MB)
pub const SINK_BUFFER_SIZE: usize = 1024 * 1024;

// Encrypted container constants
/// Magic bytes opening every encrypted container
pub const ENC_MAGIC: &[u8; 8] = b"EVOUTENC";

/// Container format version
pub const ENC_VERSION: u8 = 1;

/// Cipher identifier: AES-256-GCM
pub const ENC_CIPHER_AES_256_GCM: u8 = 1;

/// Key wrap identifier: RSA-OAEP with SHA-256 and MGF1-SHA-256
pub const ENC_WRAP_RSA_OAEP_SHA256: u8 = 1;

/// Symmetric key length in bytes
pub const ENC_KEY_LEN: usize = 32;

/// Base nonce length in bytes
pub const ENC_NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
pub const ENC_TAG_LEN: usize = 16;

/// Fixed part of the container header: magic, version, ids, reserved, chunk size, nonce
pub const ENC_HEADER_FIXED_LEN: usize = 8 + 4 + 4 + ENC_NONCE_LEN;

/// Chunk frame prefix: flags, index, length, tag
pub const ENC_CHUNK_PREFIX_LEN: usize = 1 + 8 + 4 + ENC_TAG_LEN;

/// Chunk flag marking the last chunk of a container
pub const ENC_CHUNK_FLAG_FINAL: u8 = 0x01;

/// Default plaintext bytes per chunk (1MB)
pub const DEFAULT_ENC_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest chunk size a reader accepts (16MB)
pub const MAX_ENC_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Largest wrapped key a reader accepts (RSA-16384)
pub const MAX_WRAPPED_KEY_LEN: usize = 2048;

// File name conventions
pub const TAR_EXTENSION: &str = "tar";
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Default compression level when none is configured
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Progress reporting interval for the archive command, in entries
pub const PROGRESS_REPORT_INTERVAL_ENTRIES: u64 = 1000;

// Error messages
pub const ERROR_FAILED_TO_READ_FILE: &str = "Failed to read file";
pub const ERROR_FAILED_TO_WRITE_FILE: &str = "Failed to write file";
pub const ERROR_FAILED_TO_READ_KEY: &str = "Failed to read key file";
