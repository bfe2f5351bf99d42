use std::io::{self, Read, Write};

use log::debug;

use crate::constants::{
    COPY_BUFFER_SIZE, TAR_BLOCK_SIZE, TAR_MAX_OCTAL_SIZE, TAR_NAME_FIELD_LEN, TAR_PAX_HEADER_NAME,
    TAR_RECORD_SIZE, TAR_USTAR_MAGIC, TAR_USTAR_VERSION,
};
use crate::error::OutputError;
use crate::models::{ArchiveEntry, EntryKind};

/// Typeflag of a regular file
pub const TYPE_FILE: u8 = b'0';
/// Typeflag of a symbolic link
pub const TYPE_SYMLINK: u8 = b'2';
/// Typeflag of a directory
pub const TYPE_DIRECTORY: u8 = b'5';
/// Typeflag of a PAX extended header for the next entry
pub const TYPE_PAX: u8 = b'x';

/// One ustar header block.
pub struct TarHeader {
    pub name: Vec<u8>,
    pub mode: u32,
    pub size: u64,
    pub mtime: i64,
    pub typeflag: u8,
    pub linkname: Vec<u8>,
}

impl TarHeader {
    /// Encode the header into a 512-byte block.
    ///
    /// Names longer than the ustar field are truncated here; the caller puts
    /// the full value in a PAX header in front of this one.
    pub fn to_block(&self) -> [u8; TAR_BLOCK_SIZE] {
        let mut block = [0u8; TAR_BLOCK_SIZE];

        // Name
        copy_truncated(&mut block[0..100], &self.name);

        // Mode, uid, gid
        write_octal(&mut block[100..108], u64::from(self.mode));
        write_octal(&mut block[108..116], 0);
        write_octal(&mut block[116..124], 0);

        // Size
        if self.size > TAR_MAX_OCTAL_SIZE {
            write_base256(&mut block[124..136], self.size);
        } else {
            write_octal(&mut block[124..136], self.size);
        }

        // Modification time, clamped to the representable range
        write_octal(&mut block[136..148], self.mtime.clamp(0, 0o77777777777) as u64);

        // Typeflag and link name
        block[156] = self.typeflag;
        copy_truncated(&mut block[157..257], &self.linkname);

        // Magic and version
        block[257..263].copy_from_slice(TAR_USTAR_MAGIC);
        block[263..265].copy_from_slice(TAR_USTAR_VERSION);

        // Device numbers
        write_octal(&mut block[329..337], 0);
        write_octal(&mut block[337..345], 0);

        // Checksum is computed with its own field set to spaces
        block[148..156].fill(b' ');
        let checksum: u32 = block.iter().map(|&b| u32::from(b)).sum();
        write_octal(&mut block[148..155], u64::from(checksum));
        block[155] = b' ';

        block
    }
}

fn copy_truncated(field: &mut [u8], value: &[u8]) {
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value[..len]);
}

/// Zero-padded octal digits followed by a NUL terminator.
fn write_octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let text = format!("{:0width$o}", value, width = digits);
    let bytes = text.as_bytes();
    let start = bytes.len().saturating_sub(digits);
    field[..digits].copy_from_slice(&bytes[start..]);
    field[digits] = 0;
}

/// GNU base-256 encoding for numbers that do not fit the octal field.
fn write_base256(field: &mut [u8], value: u64) {
    field.fill(0);
    let len = field.len();
    field[len - 8..].copy_from_slice(&value.to_be_bytes());
    field[0] = 0x80;
}

/// Build the body of a PAX extended header from `key=value` pairs.
pub fn pax_records(records: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in records {
        // "<len> <key>=<value>\n" where <len> counts its own digits
        let base = key.len() + value.len() + 3;
        let mut len = base + decimal_digits(base);
        if decimal_digits(len) > decimal_digits(base) {
            len += 1;
        }
        out.extend_from_slice(format!("{len} {key}=").as_bytes());
        out.extend_from_slice(value);
        out.push(b'\n');
    }
    out
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn padding_for(len: u64, boundary: usize) -> usize {
    let boundary = boundary as u64;
    ((boundary - len % boundary) % boundary) as usize
}

/// Serializer writing tar entries to any byte sink.
///
/// Entries are written in call order, each as an optional PAX header, a
/// ustar header, the content and zero padding up to the next block. Nothing
/// is buffered for sorting and duplicate paths are written as given.
pub struct TarSerializer<W: Write> {
    writer: W,
    offset: u64,
    entries: u64,
    buffer: Vec<u8>,
}

impl<W: Write> TarSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            offset: 0,
            entries: 0,
            buffer: vec![0u8; COPY_BUFFER_SIZE],
        }
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Bytes of tar stream written so far
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Append one entry to the archive.
    ///
    /// File content is copied from the entry's source in bounded increments.
    /// The number of bytes copied must equal the declared size, otherwise the
    /// call fails with [`OutputError::SizeMismatch`]; the archive is then left
    /// with an incomplete last entry.
    pub fn write_entry(&mut self, entry: ArchiveEntry<'_>) -> Result<(), OutputError> {
        let typeflag = match entry.kind {
            EntryKind::File => TYPE_FILE,
            EntryKind::Symlink => TYPE_SYMLINK,
            EntryKind::Directory => TYPE_DIRECTORY,
        };
        let size = if entry.kind == EntryKind::File { entry.size } else { 0 };
        let linkname = entry.link_target.as_deref().unwrap_or("").as_bytes().to_vec();

        // Extended records for values the ustar fields cannot hold
        let size_text = size.to_string();
        let mut records: Vec<(&str, &[u8])> = Vec::new();
        if entry.path.len() > TAR_NAME_FIELD_LEN {
            records.push(("path", entry.path.as_bytes()));
        }
        if linkname.len() > TAR_NAME_FIELD_LEN {
            records.push(("linkpath", linkname.as_slice()));
        }
        if size > TAR_MAX_OCTAL_SIZE {
            records.push(("size", size_text.as_bytes()));
        }
        if !records.is_empty() {
            let body = pax_records(&records);
            let pax_header = TarHeader {
                name: TAR_PAX_HEADER_NAME.as_bytes().to_vec(),
                mode: 0o644,
                size: body.len() as u64,
                mtime: entry.mtime,
                typeflag: TYPE_PAX,
                linkname: Vec::new(),
            };
            self.write_raw(&pax_header.to_block())?;
            self.write_raw(&body)?;
            self.write_padding(body.len() as u64)?;
        }

        let header = TarHeader {
            name: entry.path.as_bytes().to_vec(),
            mode: entry.mode,
            size,
            mtime: entry.mtime,
            typeflag,
            linkname,
        };
        self.write_raw(&header.to_block())?;

        if entry.kind == EntryKind::File {
            self.copy_content(&entry)?;
            self.write_padding(size)?;
        }

        self.entries += 1;
        debug!("Wrote tar entry {} ({}, {} bytes)", entry.path, entry.kind, size);
        Ok(())
    }

    fn copy_content(&mut self, entry: &ArchiveEntry<'_>) -> Result<(), OutputError> {
        let content_error = |source| OutputError::ContentRead {
            path: entry.path.clone(),
            source,
        };

        let source = match entry.content {
            Some(source) => source,
            None if entry.size == 0 => return Ok(()),
            None => {
                return Err(OutputError::SizeMismatch {
                    path: entry.path.clone(),
                    declared: entry.size,
                    actual: 0,
                })
            }
        };

        let mut reader = source.open().map_err(content_error)?;
        let mut copied = 0u64;

        while copied < entry.size {
            let want = (entry.size - copied).min(self.buffer.len() as u64) as usize;
            let n = match reader.read(&mut self.buffer[..want]) {
                Ok(0) => {
                    return Err(OutputError::SizeMismatch {
                        path: entry.path.clone(),
                        declared: entry.size,
                        actual: copied,
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(content_error(e)),
            };
            self.writer
                .write_all(&self.buffer[..n])
                .map_err(OutputError::Sink)?;
            self.offset += n as u64;
            copied += n as u64;
        }

        // The source must be exhausted now; count whatever is left over
        let mut extra = 0u64;
        loop {
            match reader.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => extra += n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(content_error(e)),
            }
        }
        if extra > 0 {
            return Err(OutputError::SizeMismatch {
                path: entry.path.clone(),
                declared: entry.size,
                actual: copied + extra,
            });
        }

        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), OutputError> {
        self.writer.write_all(data).map_err(OutputError::Sink)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    fn write_padding(&mut self, len: u64) -> Result<(), OutputError> {
        let pad = padding_for(len, TAR_BLOCK_SIZE);
        if pad > 0 {
            self.write_raw(&[0u8; TAR_BLOCK_SIZE][..pad])?;
        }
        Ok(())
    }

    /// Write the end-of-archive marker and return the underlying sink.
    ///
    /// The marker is two zero blocks; the stream is then padded with zeros to
    /// a whole tar record.
    pub fn finish(self) -> Result<W, OutputError> {
        self.finish_counted().map(|(writer, _)| writer)
    }

    /// Like [`TarSerializer::finish`], also returning the total tar stream length.
    pub fn finish_counted(mut self) -> Result<(W, u64), OutputError> {
        self.write_raw(&[0u8; 2 * TAR_BLOCK_SIZE])?;

        let pad = padding_for(self.offset, TAR_RECORD_SIZE);
        if pad > 0 {
            let zeros = vec![0u8; pad];
            self.write_raw(&zeros)?;
        }
        self.writer.flush().map_err(OutputError::Sink)?;

        debug!("Finished tar stream: {} entries, {} bytes", self.entries, self.offset);
        Ok((self.writer, self.offset))
    }
}
