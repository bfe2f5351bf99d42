use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::CompressionMethod;
use crate::constants::{
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_ENC_CHUNK_SIZE, ENCRYPTED_EXTENSION, MAX_ENC_CHUNK_SIZE,
    TAR_EXTENSION,
};
use crate::error::OutputError;

/// Construction-time options of a tar output.
///
/// Every option is fixed once the output has been created. Values can come
/// from code, from a YAML file, or from the command line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Base path of the archive; extensions are appended by [`OutputConfig::archive_path`]
    pub path: PathBuf,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub compression_method: Option<CompressionMethod>,
    #[serde(default)]
    pub compression_level: Option<u32>,
    #[serde(default)]
    pub encrypt: bool,
    /// PEM encoded recipient public key
    #[serde(default, skip_serializing)]
    pub public_key: Option<Vec<u8>>,
    /// File holding the PEM encoded recipient public key
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_ENC_CHUNK_SIZE
}

impl OutputConfig {
    /// Plain, uncompressed, unencrypted output at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            compress: false,
            compression_method: None,
            compression_level: None,
            encrypt: false,
            public_key: None,
            public_key_file: None,
            chunk_size: DEFAULT_ENC_CHUNK_SIZE,
        }
    }

    /// Enable compression with the given method.
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compress = true;
        self.compression_method = Some(method);
        self
    }

    /// Enable encryption for the holder of the private half of `public_key_pem`.
    pub fn with_encryption(mut self, public_key_pem: Vec<u8>) -> Self {
        self.encrypt = true;
        self.public_key = Some(public_key_pem);
        self
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: OutputConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded output configuration from {}", path.display());
        Ok(config)
    }

    /// The compression method in effect, `None` for the identity transform.
    ///
    /// Compression without an explicit method falls back to gzip.
    pub fn effective_compression(&self) -> Option<CompressionMethod> {
        if self.compress {
            Some(self.compression_method.unwrap_or(CompressionMethod::Gzip))
        } else {
            None
        }
    }

    /// Compression level in effect for the chosen method.
    pub fn effective_level(&self) -> u32 {
        self.compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL)
    }

    /// Check option consistency before anything touches the disk.
    pub fn validate(&self) -> Result<(), OutputError> {
        if self.path.as_os_str().is_empty() {
            return Err(OutputError::UnsupportedOption(
                "destination path must not be empty".to_string(),
            ));
        }

        if !self.compress && self.compression_method.is_some() {
            return Err(OutputError::UnsupportedOption(
                "compression method given but compression is disabled".to_string(),
            ));
        }

        if let Some(method) = self.effective_compression() {
            let level = self.effective_level();
            if level < method.min_level() || level > method.max_level() {
                return Err(OutputError::UnsupportedOption(format!(
                    "compression level {} out of range {}..={} for {}",
                    level,
                    method.min_level(),
                    method.max_level(),
                    method
                )));
            }
        } else if self.compression_level.is_some() {
            return Err(OutputError::UnsupportedOption(
                "compression level given but compression is disabled".to_string(),
            ));
        }

        let has_key = self.public_key.is_some() || self.public_key_file.is_some();
        if self.encrypt && !has_key {
            return Err(OutputError::UnsupportedOption(
                "encryption requires a public key".to_string(),
            ));
        }
        if !self.encrypt && has_key {
            return Err(OutputError::UnsupportedOption(
                "public key given but encryption is disabled".to_string(),
            ));
        }

        if self.encrypt && (self.chunk_size == 0 || self.chunk_size > MAX_ENC_CHUNK_SIZE) {
            return Err(OutputError::UnsupportedOption(format!(
                "chunk size {} out of range 1..={}",
                self.chunk_size, MAX_ENC_CHUNK_SIZE
            )));
        }

        Ok(())
    }

    /// PEM bytes of the recipient key, reading `public_key_file` if needed.
    pub fn load_public_key(&self) -> Result<Option<Vec<u8>>, OutputError> {
        if !self.encrypt {
            return Ok(None);
        }
        match (&self.public_key, &self.public_key_file) {
            (Some(pem), _) => Ok(Some(pem.clone())),
            (None, Some(path)) => fs::read(path).map(Some).map_err(|e| {
                OutputError::InvalidKey(format!("cannot read {}: {}", path.display(), e))
            }),
            (None, None) => Err(OutputError::UnsupportedOption(
                "encryption requires a public key".to_string(),
            )),
        }
    }

    /// Destination file name derived from the base path and the chosen layers.
    ///
    /// `<base>.tar[.gz|.bz2|.xz][.enc]`; a base already ending in `.tar`
    /// does not get a second one.
    pub fn archive_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();

        let has_tar = self
            .path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case(TAR_EXTENSION));
        if !has_tar {
            name.push(format!(".{TAR_EXTENSION}"));
        }
        if let Some(method) = self.effective_compression() {
            name.push(format!(".{}", method.extension()));
        }
        if self.encrypt {
            name.push(format!(".{ENCRYPTED_EXTENSION}"));
        }

        PathBuf::from(name)
    }
}

/// Default base path for an acquisition: `<tmp>/<hostname>_<timestamp>`.
pub fn default_base_path(output_dir: Option<&Path>) -> PathBuf {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string());
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();

    let dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| env::temp_dir().join("evidence-output"));
    dir.join(format!("{hostname}_{timestamp}"))
}
