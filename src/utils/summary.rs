use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::constants::ERROR_FAILED_TO_WRITE_FILE;
use crate::models::ArchiveSummary;

/// Render an archive summary as pretty JSON.
pub fn summary_to_json(summary: &ArchiveSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("Failed to serialize archive summary to JSON")
}

/// Path of the summary written next to an archive: `<archive>.json`.
pub fn summary_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Write the summary of a closed archive as JSON.
///
/// # Arguments
///
/// * `summary` - Summary returned by closing the output
/// * `path` - Destination of the JSON document
pub fn write_summary(summary: &ArchiveSummary, path: &Path) -> Result<()> {
    let json = summary_to_json(summary)?;
    fs::write(path, json)
        .with_context(|| format!("{} {}", ERROR_FAILED_TO_WRITE_FILE, path.display()))?;
    info!("Wrote archive summary to {}", path.display());
    Ok(())
}
