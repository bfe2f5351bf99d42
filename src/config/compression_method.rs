use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::OutputError;

/// Compression applied to the serialized tar stream.
///
/// The identity transform is expressed as `compress: false` on the output
/// configuration rather than as a variant here, so a method is only ever
/// chosen when compression is actually on.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// gzip (deflate), `.gz`
    #[serde(alias = "gz")]
    #[value(alias = "gz")]
    Gzip,
    /// bzip2, `.bz2`
    #[serde(alias = "bz2")]
    #[value(alias = "bz2")]
    Bzip2,
    /// xz (LZMA2), `.xz`
    Xz,
}

impl CompressionMethod {
    /// File name suffix, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "gz",
            CompressionMethod::Bzip2 => "bz2",
            CompressionMethod::Xz => "xz",
        }
    }

    /// Highest level the backing compressor accepts.
    pub fn max_level(&self) -> u32 {
        9
    }

    /// Lowest level the backing compressor accepts.
    pub fn min_level(&self) -> u32 {
        match self {
            CompressionMethod::Xz => 0,
            CompressionMethod::Gzip | CompressionMethod::Bzip2 => 1,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Gzip => write!(f, "gzip"),
            CompressionMethod::Bzip2 => write!(f, "bzip2"),
            CompressionMethod::Xz => write!(f, "xz"),
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" => Ok(CompressionMethod::Gzip),
            "bzip2" | "bz2" => Ok(CompressionMethod::Bzip2),
            "xz" => Ok(CompressionMethod::Xz),
            other => Err(OutputError::UnsupportedOption(format!(
                "unknown compression method '{other}' (expected gzip, bzip2 or xz)"
            ))),
        }
    }
}
