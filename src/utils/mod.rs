//! Utility functions for finished archives.
//!
//! ## Components
//!
//! - **Hashing**: SHA-256 of the archive file for the chain of custody
//! - **Summary**: JSON report describing a closed archive

/// Archive summary rendering and persistence
pub mod summary;

/// Cryptographic hash calculation utilities
pub mod hash;
