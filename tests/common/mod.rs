//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::io::Read;
use std::sync::OnceLock;

use anyhow::Result;
use openssl::rsa::Rsa;

use evidence_output::config::CompressionMethod;

/// PEM encoded RSA key pair
#[derive(Clone)]
pub struct KeyPair {
    pub public_pem: Vec<u8>,
    pub private_pem: Vec<u8>,
}

fn generate() -> KeyPair {
    let rsa = Rsa::generate(2048).unwrap();
    KeyPair {
        public_pem: rsa.public_key_to_pem().unwrap(),
        private_pem: rsa.private_key_to_pem().unwrap(),
    }
}

/// The recipient key pair, generated once per test binary
pub fn recipient_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(generate).clone()
}

/// A key pair unrelated to the recipient
pub fn stranger_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(generate).clone()
}

/// Undo the compression layer
pub fn decompress(method: Option<CompressionMethod>, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match method {
        None => out.extend_from_slice(data),
        Some(CompressionMethod::Gzip) => {
            flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        }
        Some(CompressionMethod::Bzip2) => {
            bzip2::read::BzDecoder::new(data).read_to_end(&mut out)?;
        }
        Some(CompressionMethod::Xz) => {
            xz2::read::XzDecoder::new(data).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

/// An entry as seen by an independent tar reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub path: String,
    pub kind: tar::EntryType,
    pub size: u64,
    pub link_target: Option<String>,
    pub mode: u32,
    pub content: Vec<u8>,
}

/// Parse a plain tar stream with the `tar` crate
pub fn parse_tar(data: &[u8]) -> Result<Vec<ParsedEntry>> {
    let mut archive = tar::Archive::new(data);
    let mut parsed = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        let link_target = entry
            .link_name()?
            .map(|target| target.to_string_lossy().to_string());
        let header = entry.header();
        let kind = header.entry_type();
        let size = header.size()?;
        let mode = header.mode()?;

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;

        parsed.push(ParsedEntry {
            path,
            kind,
            size,
            link_target,
            mode,
            content,
        });
    }

    Ok(parsed)
}

pub const ALL_METHODS: [Option<CompressionMethod>; 4] = [
    None,
    Some(CompressionMethod::Gzip),
    Some(CompressionMethod::Bzip2),
    Some(CompressionMethod::Xz),
];
