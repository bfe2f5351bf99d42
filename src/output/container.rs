//! Layout of the encrypted container shared by the writer and the reader.
//!
//! ```text
//! header  magic(8) version(1) cipher(1) wrap(1) reserved(1) chunk_size(4)
//!         base_nonce(12) key_len(2) wrapped_key(key_len)
//! chunk   flags(1) index(8) length(4) tag(16) ciphertext(length)
//! ```
//!
//! Integers are big-endian. Chunk `i` is sealed with the base nonce whose
//! last eight bytes are XORed with `i`, and with the associated data
//! `SHA-256(header) || i || flags`, so a chunk cannot be moved to another
//! position, another container, or turned into the final chunk.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

use crate::constants::{
    ENC_CHUNK_FLAG_FINAL, ENC_CHUNK_PREFIX_LEN, ENC_CIPHER_AES_256_GCM, ENC_HEADER_FIXED_LEN,
    ENC_MAGIC, ENC_NONCE_LEN, ENC_TAG_LEN, ENC_VERSION, ENC_WRAP_RSA_OAEP_SHA256,
    MAX_ENC_CHUNK_SIZE, MAX_WRAPPED_KEY_LEN,
};
use crate::error::DecryptError;

/// Header record of an encrypted container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u8,
    pub cipher: u8,
    pub wrap: u8,
    pub chunk_size: u32,
    pub base_nonce: [u8; ENC_NONCE_LEN],
    pub wrapped_key: Vec<u8>,
}

impl ContainerHeader {
    pub fn new(chunk_size: u32, base_nonce: [u8; ENC_NONCE_LEN], wrapped_key: Vec<u8>) -> Self {
        Self {
            version: ENC_VERSION,
            cipher: ENC_CIPHER_AES_256_GCM,
            wrap: ENC_WRAP_RSA_OAEP_SHA256,
            chunk_size,
            base_nonce,
            wrapped_key,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENC_HEADER_FIXED_LEN + 2 + self.wrapped_key.len());
        bytes.extend_from_slice(ENC_MAGIC);
        bytes.push(self.version);
        bytes.push(self.cipher);
        bytes.push(self.wrap);
        bytes.push(0);
        bytes.extend_from_slice(&self.chunk_size.to_be_bytes());
        bytes.extend_from_slice(&self.base_nonce);
        bytes.extend_from_slice(&(self.wrapped_key.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.wrapped_key);
        bytes
    }

    /// Read and validate a header, returning it with its raw bytes.
    ///
    /// Unknown versions or algorithm identifiers are rejected: the reader
    /// fails closed rather than guessing at a layout.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, Vec<u8>), DecryptError> {
        let mut fixed = [0u8; ENC_HEADER_FIXED_LEN + 2];
        read_exact_or(reader, &mut fixed, || {
            DecryptError::Format("stream too short for a container header".to_string())
        })?;

        if &fixed[0..8] != ENC_MAGIC {
            return Err(DecryptError::Format(
                "missing container magic; not an encrypted archive".to_string(),
            ));
        }
        let version = fixed[8];
        if version != ENC_VERSION {
            return Err(DecryptError::Format(format!("unsupported container version {version}")));
        }
        let (cipher, wrap) = (fixed[9], fixed[10]);
        if cipher != ENC_CIPHER_AES_256_GCM || wrap != ENC_WRAP_RSA_OAEP_SHA256 {
            return Err(DecryptError::UnsupportedAlgorithm { cipher, wrap });
        }
        if fixed[11] != 0 {
            return Err(DecryptError::Format("reserved header byte is set".to_string()));
        }

        let chunk_size = u32::from_be_bytes([fixed[12], fixed[13], fixed[14], fixed[15]]);
        if chunk_size == 0 || chunk_size as usize > MAX_ENC_CHUNK_SIZE {
            return Err(DecryptError::Format(format!("invalid chunk size {chunk_size}")));
        }

        let mut base_nonce = [0u8; ENC_NONCE_LEN];
        base_nonce.copy_from_slice(&fixed[16..16 + ENC_NONCE_LEN]);

        let key_len = u16::from_be_bytes([fixed[28], fixed[29]]) as usize;
        if key_len == 0 || key_len > MAX_WRAPPED_KEY_LEN {
            return Err(DecryptError::Format(format!("invalid wrapped key length {key_len}")));
        }
        let mut wrapped_key = vec![0u8; key_len];
        read_exact_or(reader, &mut wrapped_key, || {
            DecryptError::Format("header truncated inside the wrapped key".to_string())
        })?;

        let mut raw = fixed.to_vec();
        raw.extend_from_slice(&wrapped_key);

        let header = ContainerHeader {
            version,
            cipher,
            wrap,
            chunk_size,
            base_nonce,
            wrapped_key,
        };
        Ok((header, raw))
    }
}

/// SHA-256 of the raw header, bound into every chunk.
pub fn header_digest(raw_header: &[u8]) -> [u8; 32] {
    Sha256::digest(raw_header).into()
}

/// Nonce of chunk `index`.
pub fn chunk_nonce(base: &[u8; ENC_NONCE_LEN], index: u64) -> [u8; ENC_NONCE_LEN] {
    let mut nonce = *base;
    for (byte, counter) in nonce[ENC_NONCE_LEN - 8..].iter_mut().zip(index.to_be_bytes()) {
        *byte ^= counter;
    }
    nonce
}

/// Associated data of chunk `index`.
pub fn chunk_aad(digest: &[u8; 32], index: u64, flags: u8) -> [u8; 41] {
    let mut aad = [0u8; 41];
    aad[..32].copy_from_slice(digest);
    aad[32..40].copy_from_slice(&index.to_be_bytes());
    aad[40] = flags;
    aad
}

/// Fixed-size prefix of a chunk frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPrefix {
    pub flags: u8,
    pub index: u64,
    pub length: u32,
    pub tag: [u8; ENC_TAG_LEN],
}

impl ChunkPrefix {
    pub fn is_final(&self) -> bool {
        self.flags & ENC_CHUNK_FLAG_FINAL != 0
    }

    pub fn encode(&self) -> [u8; ENC_CHUNK_PREFIX_LEN] {
        let mut bytes = [0u8; ENC_CHUNK_PREFIX_LEN];
        bytes[0] = self.flags;
        bytes[1..9].copy_from_slice(&self.index.to_be_bytes());
        bytes[9..13].copy_from_slice(&self.length.to_be_bytes());
        bytes[13..].copy_from_slice(&self.tag);
        bytes
    }

    fn decode(bytes: &[u8; ENC_CHUNK_PREFIX_LEN]) -> Self {
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[1..9]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&bytes[9..13]);
        let mut tag = [0u8; ENC_TAG_LEN];
        tag.copy_from_slice(&bytes[13..]);
        Self {
            flags: bytes[0],
            index: u64::from_be_bytes(index),
            length: u32::from_be_bytes(length),
            tag,
        }
    }

    /// Read the next prefix. `Ok(None)` means the stream ended cleanly
    /// before the first byte of a frame.
    pub fn read_from<R: Read>(reader: &mut R, index: u64) -> Result<Option<Self>, DecryptError> {
        let mut bytes = [0u8; ENC_CHUNK_PREFIX_LEN];
        match read_full(reader, &mut bytes)? {
            0 => Ok(None),
            ENC_CHUNK_PREFIX_LEN => Ok(Some(Self::decode(&bytes))),
            _ => Err(DecryptError::Truncated { index }),
        }
    }
}

/// Summary of a container obtained without the private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub header: ContainerHeader,
    pub chunk_count: u64,
    pub ciphertext_bytes: u64,
    /// Whether a final chunk was found
    pub complete: bool,
}

/// Walk the header and chunk frames of a container without decrypting.
pub fn inspect_container<R: Read>(mut reader: R) -> Result<ContainerInfo, DecryptError> {
    let (header, _) = ContainerHeader::read_from(&mut reader)?;
    let mut info = ContainerInfo {
        header,
        chunk_count: 0,
        ciphertext_bytes: 0,
        complete: false,
    };

    loop {
        let index = info.chunk_count;
        let prefix = match ChunkPrefix::read_from(&mut reader, index) {
            Ok(Some(prefix)) => prefix,
            Ok(None) | Err(DecryptError::Truncated { .. }) => return Ok(info),
            Err(e) => return Err(e),
        };
        if prefix.index != index {
            return Err(DecryptError::ChunkOutOfOrder {
                expected: index,
                found: prefix.index,
            });
        }

        let skipped = io::copy(&mut (&mut reader).take(u64::from(prefix.length)), &mut io::sink())?;
        if skipped != u64::from(prefix.length) {
            return Ok(info);
        }

        info.chunk_count += 1;
        info.ciphertext_bytes += skipped;

        if prefix.is_final() {
            info.complete = true;
            let mut probe = [0u8; 1];
            if read_full(&mut reader, &mut probe)? != 0 {
                return Err(DecryptError::TrailingData);
            }
            return Ok(info);
        }
    }
}

/// Fill `buf` as far as the stream allows and return how much was read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) fn read_exact_or<R: Read, F>(reader: &mut R, buf: &mut [u8], on_eof: F) -> Result<(), DecryptError>
where
    F: FnOnce() -> DecryptError,
{
    if read_full(reader, buf)? == buf.len() {
        Ok(())
    } else {
        Err(on_eof())
    }
}
