use std::io::{self, Write};

use log::{debug, info};
use openssl::encrypt::Encrypter;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::rand::rand_bytes;
use openssl::rsa::{Padding, Rsa};
use openssl::symm::{encrypt_aead, Cipher};
use zeroize::Zeroizing;

use crate::constants::{
    ENC_CHUNK_FLAG_FINAL, ENC_KEY_LEN, ENC_NONCE_LEN, ENC_TAG_LEN, MAX_ENC_CHUNK_SIZE,
};
use crate::error::OutputError;
use crate::output::compression::{ArchiveSink, SinkReport};
use crate::output::container::{chunk_aad, chunk_nonce, header_digest, ChunkPrefix, ContainerHeader};

/// Parse a PEM recipient key, SubjectPublicKeyInfo or PKCS#1 RSA.
pub fn load_public_key(pem: &[u8]) -> Result<PKey<Public>, OutputError> {
    let pkey = match PKey::public_key_from_pem(pem) {
        Ok(pkey) => pkey,
        Err(_) => {
            let rsa = Rsa::public_key_from_pem_pkcs1(pem)
                .map_err(|e| OutputError::InvalidKey(e.to_string()))?;
            PKey::from_rsa(rsa).map_err(|e| OutputError::InvalidKey(e.to_string()))?
        }
    };

    if pkey.rsa().is_err() {
        return Err(OutputError::InvalidKey("recipient key is not an RSA key".to_string()));
    }
    Ok(pkey)
}

/// Wrap the archive key with RSA-OAEP (SHA-256, MGF1-SHA-256).
fn wrap_key(public_key: &PKey<Public>, key: &[u8]) -> Result<Vec<u8>, openssl::error::ErrorStack> {
    let mut encrypter = Encrypter::new(public_key)?;
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
    encrypter.set_rsa_oaep_md(MessageDigest::sha256())?;
    encrypter.set_rsa_mgf1_md(MessageDigest::sha256())?;

    let mut wrapped = vec![0u8; encrypter.encrypt_len(key)?];
    let len = encrypter.encrypt(key, &mut wrapped)?;
    wrapped.truncate(len);
    Ok(wrapped)
}

fn crypto_error(e: openssl::error::ErrorStack) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Streaming encryption layer.
///
/// On construction a fresh AES-256 key and base nonce are drawn, the key is
/// wrapped for the recipient and the container header is written before any
/// payload. Writes are cut into chunks of exactly `chunk_size` plaintext
/// bytes, each sealed with AES-256-GCM under its own derived nonce. Finishing
/// emits the final, shorter chunk (possibly empty) and finishes the sink
/// below.
///
/// The key and pending plaintext are wiped when the writer is dropped.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    key: Zeroizing<[u8; ENC_KEY_LEN]>,
    base_nonce: [u8; ENC_NONCE_LEN],
    digest: [u8; 32],
    chunk_size: usize,
    buffer: Zeroizing<Vec<u8>>,
    next_index: u64,
}

impl<W: Write> EncryptingWriter<W> {
    /// Start an encrypted container on `inner` for the holder of `public_key_pem`.
    ///
    /// # Arguments
    ///
    /// * `inner` - Sink receiving the container bytes
    /// * `public_key_pem` - PEM encoded RSA public key of the recipient
    /// * `chunk_size` - Plaintext bytes per chunk
    ///
    /// # Returns
    ///
    /// The writer, after the container header has been written to `inner`
    pub fn new(mut inner: W, public_key_pem: &[u8], chunk_size: usize) -> Result<Self, OutputError> {
        if chunk_size == 0 || chunk_size > MAX_ENC_CHUNK_SIZE {
            return Err(OutputError::UnsupportedOption(format!(
                "chunk size {chunk_size} out of range 1..={MAX_ENC_CHUNK_SIZE}"
            )));
        }
        let public_key = load_public_key(public_key_pem)?;

        let mut key = Zeroizing::new([0u8; ENC_KEY_LEN]);
        let mut base_nonce = [0u8; ENC_NONCE_LEN];
        rand_bytes(&mut key[..]).map_err(|e| OutputError::Sink(crypto_error(e)))?;
        rand_bytes(&mut base_nonce).map_err(|e| OutputError::Sink(crypto_error(e)))?;

        let wrapped_key = wrap_key(&public_key, &key[..])
            .map_err(|e| OutputError::InvalidKey(format!("cannot wrap archive key: {e}")))?;

        let header = ContainerHeader::new(chunk_size as u32, base_nonce, wrapped_key);
        let raw = header.encode();
        inner.write_all(&raw).map_err(OutputError::Sink)?;

        info!(
            "Encrypting output with AES-256-GCM, {}-bit RSA key wrap, {} byte chunks",
            public_key.bits(),
            chunk_size
        );

        Ok(Self {
            inner,
            key,
            base_nonce,
            digest: header_digest(&raw),
            chunk_size,
            buffer: Zeroizing::new(Vec::with_capacity(chunk_size)),
            next_index: 0,
        })
    }

    /// Chunks emitted so far
    pub fn chunks_written(&self) -> u64 {
        self.next_index
    }

    fn emit_chunk(&mut self, last: bool) -> io::Result<()> {
        let index = self.next_index;
        let flags = if last { ENC_CHUNK_FLAG_FINAL } else { 0 };
        let nonce = chunk_nonce(&self.base_nonce, index);
        let aad = chunk_aad(&self.digest, index, flags);

        let mut tag = [0u8; ENC_TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key[..],
            Some(&nonce),
            &aad,
            &self.buffer,
            &mut tag,
        )
        .map_err(crypto_error)?;

        let prefix = ChunkPrefix {
            flags,
            index,
            length: ciphertext.len() as u32,
            tag,
        };
        self.inner.write_all(&prefix.encode())?;
        self.inner.write_all(&ciphertext)?;

        self.next_index = index.checked_add(1).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "chunk counter exhausted")
        })?;
        self.buffer.clear();
        Ok(())
    }

    /// Emit the final chunk and return the inner sink and the chunk count.
    pub fn finish_stream(mut self) -> io::Result<(W, u64)> {
        self.emit_chunk(true)?;
        self.inner.flush()?;
        debug!("Encrypted container closed after {} chunks", self.next_index);

        let chunks = self.next_index;
        let EncryptingWriter { inner, .. } = self;
        Ok((inner, chunks))
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < buf.len() {
            let room = self.chunk_size - self.buffer.len();
            let take = room.min(buf.len() - consumed);
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;

            if self.buffer.len() == self.chunk_size {
                self.emit_chunk(false)?;
            }
        }
        Ok(buf.len())
    }

    /// Flushes the sink below; a partial chunk stays buffered so every
    /// non-final chunk keeps the fixed size.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ArchiveSink for EncryptingWriter<Box<dyn ArchiveSink>> {
    fn finish(self: Box<Self>) -> io::Result<SinkReport> {
        let (inner, chunks) = (*self).finish_stream()?;
        let mut report = inner.finish()?;
        report.chunks = Some(chunks);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ENC_CHUNK_PREFIX_LEN, ENC_HEADER_FIXED_LEN, ENC_MAGIC};
    use crate::output::container::inspect_container;
    use crate::test_utils::keys::{test_key_pair, TestKeyPair};
    use std::io::Cursor;

    fn encrypt(keys: &TestKeyPair, data: &[u8], chunk_size: usize) -> Vec<u8> {
        let mut writer = EncryptingWriter::new(Vec::new(), &keys.public_pem, chunk_size).unwrap();
        writer.write_all(data).unwrap();
        let (out, _) = writer.finish_stream().unwrap();
        out
    }

    #[test]
    fn test_header_precedes_payload() {
        let keys = test_key_pair();
        let writer = EncryptingWriter::new(Vec::new(), &keys.public_pem, 64).unwrap();
        assert_eq!(&writer.inner[..8], ENC_MAGIC);
        assert_eq!(writer.chunks_written(), 0);
    }

    #[test]
    fn test_chunking_counts() {
        let keys = test_key_pair();

        // 100 bytes in 64 byte chunks: one full chunk and a final 36 byte chunk
        let out = encrypt(&keys, &[5u8; 100], 64);
        let info = inspect_container(Cursor::new(&out)).unwrap();
        assert_eq!(info.chunk_count, 2);
        assert_eq!(info.ciphertext_bytes, 100);
        assert!(info.complete);

        // An exact multiple ends with an empty final chunk
        let out = encrypt(&keys, &[5u8; 128], 64);
        let info = inspect_container(Cursor::new(&out)).unwrap();
        assert_eq!(info.chunk_count, 3);

        // Nothing written still yields a valid container with one final chunk
        let out = encrypt(&keys, &[], 64);
        let info = inspect_container(Cursor::new(&out)).unwrap();
        assert_eq!(info.chunk_count, 1);
        assert_eq!(info.ciphertext_bytes, 0);
    }

    #[test]
    fn test_small_writes_fill_chunks() {
        let keys = test_key_pair();
        let mut writer = EncryptingWriter::new(Vec::new(), &keys.public_pem, 16).unwrap();
        for _ in 0..10 {
            writer.write_all(&[1, 2, 3, 4, 5]).unwrap();
        }
        assert_eq!(writer.chunks_written(), 3);
        let (out, chunks) = writer.finish_stream().unwrap();
        assert_eq!(chunks, 4);

        // 2048-bit recipient key: 256 byte wrapped key
        let header_len = ENC_HEADER_FIXED_LEN + 2 + 256;
        assert_eq!(out.len(), header_len + 4 * ENC_CHUNK_PREFIX_LEN + 50);
    }

    #[test]
    fn test_fresh_key_per_container() {
        let keys = test_key_pair();
        let first = encrypt(&keys, b"same plaintext", 64);
        let second = encrypt(&keys, b"same plaintext", 64);
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejects_non_key_material() {
        let err = EncryptingWriter::new(Vec::new(), b"not a pem key", 64).err().unwrap();
        assert!(matches!(err, OutputError::InvalidKey(_)));
    }
}
