use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::{CompressionMethod, OutputConfig};
use crate::error::OutputError;
use crate::filesystem::{FilesystemEntry, MemoryEntry};
use crate::models::ArchiveSummary;
use crate::output::adapter::adapt;
use crate::output::compression::{wrap_compression, ArchiveSink, FileSink};
use crate::output::encryption::{load_public_key, EncryptingWriter};
use crate::output::tar::TarSerializer;
use crate::utils::hash::calculate_sha256;

enum State {
    Open(TarSerializer<Box<dyn ArchiveSink>>),
    Failed(OutputError),
    Closed(ArchiveSummary),
}

/// Output handle owning one destination archive.
///
/// The layer stack is fixed at construction:
/// tar serializer → compression (optional) → encryption (optional) → file.
/// Entries are written strictly in call order. The first failure poisons the
/// handle: later writes and `close` report that same failure, and the file
/// is left as a truncated, unusable archive. Only a successful `close`
/// writes the end-of-archive marker.
pub struct TarOutput {
    path: PathBuf,
    compression: Option<CompressionMethod>,
    encrypted: bool,
    state: State,
}

impl TarOutput {
    /// Create the destination file and build the output stack.
    ///
    /// All options are validated before the file is created, so a rejected
    /// configuration leaves nothing on disk. An existing file is never
    /// overwritten.
    ///
    /// # Arguments
    ///
    /// * `config` - Destination base path and layer options
    ///
    /// # Returns
    ///
    /// An open output handle
    pub fn new(config: OutputConfig) -> Result<Self, OutputError> {
        config.validate()?;
        let public_key = config.load_public_key()?;
        let compression = config.effective_compression();
        let path = config.archive_path();
        if let Some(pem) = &public_key {
            load_public_key(pem)?;
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(OutputError::UnsupportedOption(format!(
                    "output directory {} does not exist",
                    parent.display()
                )));
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(OutputError::Sink)?;
        let mut sink: Box<dyn ArchiveSink> = Box::new(FileSink::new(file));

        if let Some(pem) = public_key {
            sink = Box::new(EncryptingWriter::new(sink, &pem, config.chunk_size)?);
        }
        sink = wrap_compression(sink, compression, config.effective_level());

        info!(
            "Writing archive to {} (compression: {}, encryption: {})",
            path.display(),
            compression.map_or_else(|| "none".to_string(), |m| m.to_string()),
            if config.encrypt { "on" } else { "off" }
        );

        Ok(Self {
            path,
            compression,
            encrypted: config.encrypt,
            state: State::Open(TarSerializer::new(sink)),
        })
    }

    /// Path of the destination file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `close` has completed
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed(_))
    }

    /// Entries written so far
    pub fn entry_count(&self) -> u64 {
        match &self.state {
            State::Open(serializer) => serializer.entry_count(),
            State::Closed(summary) => summary.entry_count,
            State::Failed(_) => 0,
        }
    }

    /// Append one entry under its identity path.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute, normalized identity path recorded in the archive
    /// * `entry` - Provider entry to classify and copy
    pub fn write_entry(&mut self, path: &str, entry: &dyn FilesystemEntry) -> Result<(), OutputError> {
        let serializer = match &mut self.state {
            State::Open(serializer) => serializer,
            State::Failed(e) => return Err(e.replay()),
            State::Closed(_) => return Err(OutputError::Closed),
        };

        // Rejections before any byte is written leave the archive intact
        let archive_entry = adapt(path, entry)?;

        if let Err(e) = serializer.write_entry(archive_entry) {
            warn!("Archive {} failed: {}", self.path.display(), e);
            let replay = e.replay();
            self.state = State::Failed(e);
            return Err(replay);
        }
        Ok(())
    }

    /// Append generated content as a regular file entry.
    pub fn write_bytes(&mut self, path: &str, content: &[u8]) -> Result<(), OutputError> {
        let entry = MemoryEntry::file(content.to_vec()).with_mtime(chrono::Utc::now().timestamp());
        self.write_entry(path, &entry)
    }

    /// Finish the archive: end marker, compression trailer, final encrypted
    /// chunk, then sync the file to disk.
    ///
    /// Closing twice returns the same summary. Closing a failed output
    /// returns the failure and writes no end marker.
    pub fn close(&mut self) -> Result<ArchiveSummary, OutputError> {
        let state = std::mem::replace(&mut self.state, State::Failed(OutputError::Closed));
        let serializer = match state {
            State::Open(serializer) => serializer,
            State::Closed(summary) => {
                self.state = State::Closed(summary.clone());
                return Ok(summary);
            }
            State::Failed(e) => {
                let replay = e.replay();
                self.state = State::Failed(e);
                return Err(replay);
            }
        };

        match self.finish_stack(serializer) {
            Ok(summary) => {
                info!(
                    "Closed archive {}: {} entries, {} bytes on disk",
                    summary.path, summary.entry_count, summary.bytes_on_disk
                );
                self.state = State::Closed(summary.clone());
                Ok(summary)
            }
            Err(e) => {
                warn!("Failed to close archive {}: {}", self.path.display(), e);
                let replay = e.replay();
                self.state = State::Failed(e);
                Err(replay)
            }
        }
    }

    fn finish_stack(
        &self,
        serializer: TarSerializer<Box<dyn ArchiveSink>>,
    ) -> Result<ArchiveSummary, OutputError> {
        let entry_count = serializer.entry_count();
        let (sink, archive_bytes) = serializer.finish_counted()?;
        let report = sink.finish().map_err(OutputError::Sink)?;
        debug!("Output stack finished: {:?}", report);

        let sha256 = calculate_sha256(&self.path).map_err(OutputError::Sink)?;

        Ok(ArchiveSummary {
            path: self.path.display().to_string(),
            entry_count,
            archive_bytes,
            bytes_on_disk: report.bytes_on_disk,
            compression: self.compression,
            encrypted: self.encrypted,
            encrypted_chunks: report.chunks,
            sha256,
            closed_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}
