use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};
use openssl::encrypt::Decrypter;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Padding;
use openssl::symm::{decrypt_aead, Cipher};
use zeroize::Zeroizing;

use crate::constants::{ENC_CHUNK_FLAG_FINAL, ENC_KEY_LEN, ERROR_FAILED_TO_READ_KEY};
use crate::error::DecryptError;
use crate::output::container::{
    chunk_aad, chunk_nonce, header_digest, read_full, ChunkPrefix, ContainerHeader,
};

/// Parse a PEM private key (PKCS#8 or traditional RSA).
pub fn load_private_key(pem: &[u8]) -> Result<PKey<Private>, DecryptError> {
    let pkey = PKey::private_key_from_pem(pem).map_err(|e| DecryptError::InvalidKey(e.to_string()))?;
    if pkey.rsa().is_err() {
        return Err(DecryptError::InvalidKey("private key is not an RSA key".to_string()));
    }
    Ok(pkey)
}

fn unwrap_key(
    private_key: &PKey<Private>,
    wrapped: &[u8],
) -> Result<Zeroizing<[u8; ENC_KEY_LEN]>, DecryptError> {
    let unwrap_err = |e: openssl::error::ErrorStack| DecryptError::KeyUnwrap(e.to_string());

    let mut decrypter = Decrypter::new(private_key).map_err(unwrap_err)?;
    decrypter.set_rsa_padding(Padding::PKCS1_OAEP).map_err(unwrap_err)?;
    decrypter.set_rsa_oaep_md(MessageDigest::sha256()).map_err(unwrap_err)?;
    decrypter.set_rsa_mgf1_md(MessageDigest::sha256()).map_err(unwrap_err)?;

    let mut buffer = Zeroizing::new(vec![0u8; decrypter.decrypt_len(wrapped).map_err(unwrap_err)?]);
    let len = decrypter.decrypt(wrapped, &mut buffer).map_err(unwrap_err)?;
    if len != ENC_KEY_LEN {
        return Err(DecryptError::KeyUnwrap(format!(
            "unwrapped key is {len} bytes, expected {ENC_KEY_LEN}"
        )));
    }

    let mut key = Zeroizing::new([0u8; ENC_KEY_LEN]);
    key.copy_from_slice(&buffer[..ENC_KEY_LEN]);
    Ok(key)
}

/// Forward-only plaintext view of an encrypted container.
///
/// Opening reads the header and unwraps the archive key, so a wrong private
/// key is reported before any chunk is read. Each `read` then releases only
/// plaintext from chunks that passed authentication, in index order. After
/// the final chunk the reader checks that the stream ends there.
///
/// The reader cannot seek. Consumers that need random access (a tar parser,
/// for instance) drain it first with [`DecryptingReader::into_memory`] or
/// [`DecryptingReader::into_tempfile`].
pub struct DecryptingReader<R: Read> {
    inner: R,
    header: ContainerHeader,
    key: Zeroizing<[u8; ENC_KEY_LEN]>,
    digest: [u8; 32],
    next_index: u64,
    plaintext: Zeroizing<Vec<u8>>,
    pos: usize,
    ciphertext: Vec<u8>,
    finished: bool,
    failure: Option<DecryptError>,
}

impl<R: Read> DecryptingReader<R> {
    /// Open a container with an already parsed private key.
    ///
    /// # Arguments
    ///
    /// * `reader` - Stream positioned at the container header
    /// * `private_key` - RSA private key matching the encryption public key
    ///
    /// # Returns
    ///
    /// A reader yielding the plaintext archive bytes
    pub fn open(mut reader: R, private_key: &PKey<Private>) -> Result<Self, DecryptError> {
        let (header, raw) = ContainerHeader::read_from(&mut reader)?;
        let key = unwrap_key(private_key, &header.wrapped_key)?;

        debug!(
            "Opened encrypted container: version {}, {} byte chunks",
            header.version, header.chunk_size
        );

        Ok(Self {
            inner: reader,
            digest: header_digest(&raw),
            header,
            key,
            next_index: 0,
            plaintext: Zeroizing::new(Vec::new()),
            pos: 0,
            ciphertext: Vec::new(),
            finished: false,
            failure: None,
        })
    }

    /// Open a container with PEM encoded private key material.
    pub fn open_pem(reader: R, private_key_pem: &[u8]) -> Result<Self, DecryptError> {
        let pkey = load_private_key(private_key_pem)?;
        Self::open(reader, &pkey)
    }

    /// Open a container with a PEM private key read from `key_path`.
    pub fn open_pem_file(reader: R, key_path: &Path) -> Result<Self, DecryptError> {
        let pem = Zeroizing::new(fs::read(key_path).map_err(|e| {
            DecryptError::InvalidKey(format!(
                "{} {}: {}",
                ERROR_FAILED_TO_READ_KEY,
                key_path.display(),
                e
            ))
        })?);
        Self::open_pem(reader, &pem)
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Chunks authenticated and decrypted so far
    pub fn chunks_processed(&self) -> u64 {
        self.next_index
    }

    /// Whether the final chunk has been authenticated
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn next_chunk(&mut self) -> Result<(), DecryptError> {
        let index = self.next_index;
        let prefix = ChunkPrefix::read_from(&mut self.inner, index)?
            .ok_or(DecryptError::Truncated { index })?;

        // Framing that the writer never produces is treated as tampering
        let chunk_size = self.header.chunk_size;
        if prefix.flags & !ENC_CHUNK_FLAG_FINAL != 0
            || prefix.length > chunk_size
            || (!prefix.is_final() && prefix.length != chunk_size)
        {
            return Err(DecryptError::ChunkAuthentication { index });
        }

        self.ciphertext.resize(prefix.length as usize, 0);
        if read_full(&mut self.inner, &mut self.ciphertext)? != self.ciphertext.len() {
            // A final chunk shorter than its length field has a tampered length
            return Err(if prefix.is_final() {
                DecryptError::ChunkAuthentication { index }
            } else {
                DecryptError::Truncated { index }
            });
        }

        if prefix.index != index {
            // A chunk moved from elsewhere in the container still opens under its own index
            return Err(match self.open_chunk(prefix.index, &prefix) {
                Some(_) => DecryptError::ChunkOutOfOrder {
                    expected: index,
                    found: prefix.index,
                },
                None => DecryptError::ChunkAuthentication { index },
            });
        }

        let plaintext = self
            .open_chunk(index, &prefix)
            .ok_or(DecryptError::ChunkAuthentication { index })?;

        if prefix.is_final() {
            let mut probe = [0u8; 1];
            if read_full(&mut self.inner, &mut probe)? != 0 {
                return Err(DecryptError::TrailingData);
            }
            self.finished = true;
            debug!("Final chunk {} authenticated", index);
        }

        self.plaintext = plaintext;
        self.pos = 0;
        self.next_index = index + 1;
        Ok(())
    }

    /// Authenticate and decrypt the buffered ciphertext as chunk `index`.
    fn open_chunk(&self, index: u64, prefix: &ChunkPrefix) -> Option<Zeroizing<Vec<u8>>> {
        let nonce = chunk_nonce(&self.header.base_nonce, index);
        let aad = chunk_aad(&self.digest, index, prefix.flags);
        decrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key[..],
            Some(&nonce),
            &aad,
            &self.ciphertext,
            &prefix.tag,
        )
        .ok()
        .map(Zeroizing::new)
    }

    /// Decrypt the remaining stream into `writer`.
    ///
    /// # Returns
    ///
    /// Number of plaintext bytes written
    pub fn decrypt_to<W: Write>(&mut self, writer: &mut W) -> Result<u64, DecryptError> {
        let mut total = 0u64;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut buf).map_err(DecryptError::from_io)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
        writer.flush()?;
        info!(
            "Decrypted {} bytes from {} chunks",
            total, self.next_index
        );
        Ok(total)
    }

    /// Drain the plaintext into memory as a seekable buffer.
    pub fn into_memory(mut self) -> Result<Cursor<Vec<u8>>, DecryptError> {
        let mut data = Vec::new();
        self.decrypt_to(&mut data)?;
        Ok(Cursor::new(data))
    }

    /// Drain the plaintext into an anonymous scratch file, rewound to the start.
    pub fn into_tempfile(mut self) -> Result<File, DecryptError> {
        let mut file = tempfile::tempfile()?;
        self.decrypt_to(&mut file)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(failure) = &self.failure {
            return Err(failure.replay().into_io());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.plaintext.len() {
                let n = buf.len().min(self.plaintext.len() - self.pos);
                buf[..n].copy_from_slice(&self.plaintext[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            if let Err(e) = self.next_chunk() {
                self.failure = Some(e.replay());
                return Err(e.into_io());
            }
        }
    }
}
