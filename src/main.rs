use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use evidence_output::cli::{ArchiveOpts, Args, Commands, DecryptOpts};
use evidence_output::config::{default_base_path, OutputConfig};
use evidence_output::constants::{
    ENCRYPTED_EXTENSION, ERROR_FAILED_TO_READ_FILE, ERROR_FAILED_TO_READ_KEY,
    PROGRESS_REPORT_INTERVAL_ENTRIES,
};
use evidence_output::error::OutputError;
use evidence_output::filesystem::walk_tree;
use evidence_output::output::{inspect_container, DecryptingReader, TarOutput};
use evidence_output::utils::summary;

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    match &args.command {
        Commands::Archive(opts) => run_archive(opts),
        Commands::Decrypt(opts) => run_decrypt(opts),
        Commands::Inspect { input } => run_inspect(input),
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Merge the YAML configuration (if any) with command-line flags
fn build_output_config(opts: &ArchiveOpts) -> Result<OutputConfig> {
    let mut config = match &opts.config {
        Some(path) => OutputConfig::from_yaml_file(path)?,
        None => OutputConfig::new(default_base_path(None)),
    };

    if let Some(output) = &opts.output {
        config.path = output.clone();
    }
    if opts.compress || opts.compression_method.is_some() {
        config.compress = true;
    }
    if let Some(method) = opts.compression_method {
        config.compression_method = Some(method);
    }
    if let Some(level) = opts.compression_level {
        config.compression_level = Some(level);
    }
    if let Some(key_path) = &opts.public_key {
        let pem = fs::read(key_path)
            .with_context(|| format!("{} {}", ERROR_FAILED_TO_READ_KEY, key_path.display()))?;
        config.encrypt = true;
        config.public_key = Some(pem);
        config.public_key_file = None;
    } else if opts.encrypt {
        config.encrypt = true;
    }

    Ok(config)
}

/// Walk every source and write its entries to a new archive
fn run_archive(opts: &ArchiveOpts) -> Result<()> {
    let config = build_output_config(opts)?;
    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let mut output = TarOutput::new(config).context("Failed to create archive output")?;
    info!("Starting archive of {} source(s)", opts.sources.len());

    let mut written = 0u64;
    let mut skipped = 0u64;
    for source in &opts.sources {
        let mut walked = 0u64;
        for entry in walk_tree(source).excluding(output.path()) {
            walked += 1;
            let identity = entry.identity();
            match output.write_entry(&identity, &entry) {
                Ok(()) => written += 1,
                Err(e @ OutputError::UnsupportedEntryType(_)) => {
                    warn!("Skipping {}", e);
                    skipped += 1;
                }
                Err(e) => {
                    let message = format!(
                        "Failed to archive {}; {} is incomplete",
                        identity,
                        output.path().display()
                    );
                    return Err(anyhow::Error::new(e).context(message));
                }
            }

            if written > 0 && written % PROGRESS_REPORT_INTERVAL_ENTRIES == 0 {
                info!("Archived {} entries so far", written);
            }
        }

        if walked == 0 {
            warn!("Nothing to archive under {}", source.display());
        }
    }

    let archive_summary = output.close().context("Failed to close archive")?;
    info!(
        "Archive complete: {} entries ({} skipped), {} bytes, sha256 {}",
        archive_summary.entry_count, skipped, archive_summary.bytes_on_disk, archive_summary.sha256
    );

    if opts.summary {
        let path = summary::summary_path(output.path());
        summary::write_summary(&archive_summary, &path)?;
    }

    println!("{}", archive_summary.path);
    Ok(())
}

/// Default destination of a decrypted archive: the input without `.enc`
fn default_decrypt_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == ENCRYPTED_EXTENSION => input.with_extension(""),
        _ => {
            let mut name = input.as_os_str().to_os_string();
            name.push(".dec");
            PathBuf::from(name)
        }
    }
}

/// Decrypt an encrypted archive to its compressed or plain tar stream
fn run_decrypt(opts: &DecryptOpts) -> Result<()> {
    let input = File::open(&opts.input)
        .with_context(|| format!("{} {}", ERROR_FAILED_TO_READ_FILE, opts.input.display()))?;
    let mut reader = DecryptingReader::open_pem_file(BufReader::new(input), &opts.private_key)
        .with_context(|| format!("Failed to open encrypted archive {}", opts.input.display()))?;
    info!(
        "Opened {} (container version {}, {} byte chunks)",
        opts.input.display(),
        reader.header().version,
        reader.header().chunk_size
    );

    let output_path = opts
        .output
        .clone()
        .unwrap_or_else(|| default_decrypt_output(&opts.input));
    let output_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(output_file);

    match reader.decrypt_to(&mut writer) {
        Ok(bytes) => {
            info!(
                "Decrypted {} bytes from {} chunks to {}",
                bytes,
                reader.chunks_processed(),
                output_path.display()
            );
            println!("{}", output_path.display());
            Ok(())
        }
        Err(e) => {
            drop(writer);
            if let Err(remove_err) = fs::remove_file(&output_path) {
                warn!("Failed to remove partial output {}: {}", output_path.display(), remove_err);
            }
            Err(anyhow::Error::new(e).context(format!("Failed to decrypt {}", opts.input.display())))
        }
    }
}

/// Print the container header and chunk layout without decrypting
fn run_inspect(input: &Path) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("{} {}", ERROR_FAILED_TO_READ_FILE, input.display()))?;
    let info = inspect_container(BufReader::new(file))
        .with_context(|| format!("Failed to inspect {}", input.display()))?;

    println!("container:        {}", input.display());
    println!("version:          {}", info.header.version);
    println!("cipher:           AES-256-GCM (id {})", info.header.cipher);
    println!("key wrap:         RSA-OAEP-SHA256 (id {})", info.header.wrap);
    println!("wrapped key:      {} bytes", info.header.wrapped_key.len());
    println!("chunk size:       {} bytes", info.header.chunk_size);
    println!("chunks:           {}", info.chunk_count);
    println!("ciphertext bytes: {}", info.ciphertext_bytes);
    println!("complete:         {}", if info.complete { "yes" } else { "no (truncated)" });

    if !info.complete {
        warn!("{} has no final chunk; the archive is truncated", input.display());
    }
    Ok(())
}
