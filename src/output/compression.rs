use std::fs::File;
use std::io::{self, BufWriter, Write};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use log::debug;
use xz2::write::XzEncoder;

use crate::config::CompressionMethod;
use crate::constants::SINK_BUFFER_SIZE;

/// What the layers below the serializer did, reported on finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Bytes that reached the destination file
    pub bytes_on_disk: u64,
    /// Encrypted chunks emitted, if an encryption layer is present
    pub chunks: Option<u64>,
}

/// A byte sink in the output stack.
///
/// Every layer (file, compressor, encryption) is a `Write` that forwards to
/// the layer below it, plus a `finish` that writes its own trailer and then
/// finishes the layer below. Layers are chosen once when the output is
/// built, so writes never branch on the configured method.
pub trait ArchiveSink: Write + Send {
    fn finish(self: Box<Self>) -> io::Result<SinkReport>;
}

/// Bottom of the stack: the destination file.
pub struct FileSink {
    writer: BufWriter<File>,
    written: u64,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self {
            writer: BufWriter::with_capacity(SINK_BUFFER_SIZE, file),
            written: 0,
        }
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ArchiveSink for FileSink {
    fn finish(self: Box<Self>) -> io::Result<SinkReport> {
        let written = self.written;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(SinkReport {
            bytes_on_disk: written,
            chunks: None,
        })
    }
}

/// Sink collecting bytes in memory, used where an archive never reaches disk.
#[derive(Default)]
pub struct MemorySink {
    pub data: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?;
        data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArchiveSink for MemorySink {
    fn finish(self: Box<Self>) -> io::Result<SinkReport> {
        let len = self
            .data
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .len();
        Ok(SinkReport {
            bytes_on_disk: len as u64,
            chunks: None,
        })
    }
}

macro_rules! compressed_sink {
    ($name:ident, $encoder:ident) => {
        /// Compression layer over the next sink in the stack.
        pub struct $name {
            encoder: $encoder<Box<dyn ArchiveSink>>,
        }

        impl Write for $name {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.encoder.write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                self.encoder.flush()
            }
        }

        impl ArchiveSink for $name {
            fn finish(self: Box<Self>) -> io::Result<SinkReport> {
                let inner = self.encoder.finish()?;
                inner.finish()
            }
        }
    };
}

compressed_sink!(GzipSink, GzEncoder);
compressed_sink!(Bzip2Sink, BzEncoder);
compressed_sink!(XzSink, XzEncoder);

/// Put the compression layer for `method` on top of `inner`.
///
/// `None` is the identity transform and returns `inner` unchanged.
pub fn wrap_compression(
    inner: Box<dyn ArchiveSink>,
    method: Option<CompressionMethod>,
    level: u32,
) -> Box<dyn ArchiveSink> {
    match method {
        None => inner,
        Some(CompressionMethod::Gzip) => {
            debug!("Compressing output with gzip level {}", level);
            Box::new(GzipSink {
                encoder: GzEncoder::new(inner, flate2::Compression::new(level)),
            })
        }
        Some(CompressionMethod::Bzip2) => {
            debug!("Compressing output with bzip2 level {}", level);
            Box::new(Bzip2Sink {
                encoder: BzEncoder::new(inner, bzip2::Compression::new(level)),
            })
        }
        Some(CompressionMethod::Xz) => {
            debug!("Compressing output with xz level {}", level);
            Box::new(XzSink {
                encoder: XzEncoder::new(inner, level),
            })
        }
    }
}
