//! Integration tests for the full output pipeline.
//!
//! Archives are written through `TarOutput`, then reversed independently:
//! decryption with `DecryptingReader`, decompression with the codec crates
//! and parsing with the `tar` crate.

mod common;

use std::fs::{self, File};

use anyhow::Result;
use tempfile::TempDir;

use evidence_output::config::{CompressionMethod, OutputConfig};
use evidence_output::filesystem::{walk_tree, MemoryEntry};
use evidence_output::output::{DecryptingReader, TarOutput};

use common::{decompress, parse_tar, recipient_keys, ALL_METHODS};

fn config_for(
    base: &std::path::Path,
    method: Option<CompressionMethod>,
    public_key: Option<Vec<u8>>,
) -> OutputConfig {
    let mut config = OutputConfig::new(base);
    if let Some(method) = method {
        config = config.with_compression(method);
    }
    if let Some(pem) = public_key {
        config = config.with_encryption(pem);
    }
    config
}

/// Write the mixed sample set used by several tests
fn write_sample_entries(output: &mut TarOutput) -> Result<()> {
    output.write_entry("/etc", &MemoryEntry::directory().with_mode(0o040755))?;
    output.write_entry(
        "/etc/passwd",
        &MemoryEntry::file(b"root:x:0:0:root:/root:/bin/bash\n".to_vec()).with_mode(0o100644),
    )?;
    output.write_entry(
        "/etc/shadow",
        &MemoryEntry::file(b"root:*:19000:0:99999:7:::\n".to_vec()).with_mode(0o100640),
    )?;
    output.write_entry(
        "/etc/localtime",
        &MemoryEntry::symlink("/usr/share/zoneinfo/UTC").with_mode(0o120777),
    )?;
    output.write_entry("/var/log/empty.log", &MemoryEntry::file(Vec::new()))?;
    Ok(())
}

/// Recover the plain tar bytes of a closed archive
fn recover_tar(
    path: &std::path::Path,
    method: Option<CompressionMethod>,
    private_pem: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let compressed = match private_pem {
        Some(pem) => {
            let reader = DecryptingReader::open_pem(File::open(path)?, pem)?;
            reader.into_memory()?.into_inner()
        }
        None => fs::read(path)?,
    };
    decompress(method, &compressed)
}

#[test]
fn test_round_trip_every_method_plain_and_encrypted() -> Result<()> {
    let keys = recipient_keys();

    for method in ALL_METHODS {
        for encrypt in [false, true] {
            let dir = TempDir::new()?;
            let public_key = encrypt.then(|| keys.public_pem.clone());
            let mut output = TarOutput::new(config_for(&dir.path().join("case"), method, public_key))?;
            write_sample_entries(&mut output)?;
            let summary = output.close()?;

            let private_pem = encrypt.then_some(keys.private_pem.as_slice());
            let tar_bytes = recover_tar(output.path(), method, private_pem)?;
            assert_eq!(tar_bytes.len() as u64, summary.archive_bytes);

            let entries = parse_tar(&tar_bytes)?;
            assert_eq!(entries.len(), 5, "method {method:?}, encrypt {encrypt}");

            assert_eq!(entries[0].path, "/etc");
            assert_eq!(entries[0].kind, tar::EntryType::Directory);
            assert_eq!(entries[0].mode, 0o755);

            assert_eq!(entries[1].path, "/etc/passwd");
            assert_eq!(entries[1].kind, tar::EntryType::Regular);
            assert_eq!(entries[1].content, b"root:x:0:0:root:/root:/bin/bash\n");
            assert_eq!(entries[1].mode, 0o644);

            assert_eq!(entries[2].mode, 0o640);
            assert_eq!(entries[2].size, 26);

            assert_eq!(entries[3].kind, tar::EntryType::Symlink);
            assert_eq!(entries[3].link_target.as_deref(), Some("/usr/share/zoneinfo/UTC"));
            assert_eq!(entries[3].size, 0);

            assert_eq!(entries[4].path, "/var/log/empty.log");
            assert!(entries[4].content.is_empty());
        }
    }

    Ok(())
}

#[test]
fn test_entry_order_for_zero_one_and_many() -> Result<()> {
    for count in [0usize, 1, 250] {
        let dir = TempDir::new()?;
        let mut output = TarOutput::new(OutputConfig::new(dir.path().join("order")))?;

        // Reverse-sorted names, so any reordering would show
        let names: Vec<String> = (0..count).rev().map(|i| format!("/data/entry-{i:04}")).collect();
        for name in &names {
            output.write_bytes(name, name.as_bytes())?;
        }
        let summary = output.close()?;
        assert_eq!(summary.entry_count, count as u64);

        let entries = parse_tar(&fs::read(output.path())?)?;
        let parsed: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(parsed, names);
        for entry in &entries {
            assert_eq!(entry.content, entry.path.as_bytes());
        }
    }

    Ok(())
}

#[test]
fn test_empty_archive_is_end_marker_only() -> Result<()> {
    let dir = TempDir::new()?;
    let mut output = TarOutput::new(OutputConfig::new(dir.path().join("empty")))?;
    let summary = output.close()?;

    let bytes = fs::read(output.path())?;
    assert_eq!(bytes.len(), 10240);
    assert!(bytes.iter().all(|&b| b == 0));
    assert_eq!(summary.entry_count, 0);
    assert!(parse_tar(&bytes)?.is_empty());
    Ok(())
}

#[test]
fn test_ten_entry_gzip_archive() -> Result<()> {
    let dir = TempDir::new()?;
    let config = OutputConfig::new(dir.path().join("host01"))
        .with_compression(CompressionMethod::Gzip);
    let mut output = TarOutput::new(config)?;

    let mut expected = Vec::new();
    for i in 0..10 {
        let path = format!("/collected/item-{i}");
        match i % 3 {
            0 => output.write_entry(&path, &MemoryEntry::directory())?,
            1 => output.write_entry(&path, &MemoryEntry::symlink(format!("/target/{i}")))?,
            _ => output.write_entry(&path, &MemoryEntry::file(vec![i as u8; 100 * i]))?,
        }
        expected.push(path);
    }
    let summary = output.close()?;

    assert!(output.path().to_string_lossy().ends_with(".tar.gz"));
    assert!(summary.path.ends_with("host01.tar.gz"));

    let entries = parse_tar(&decompress(Some(CompressionMethod::Gzip), &fs::read(output.path())?)?)?;
    assert_eq!(entries.len(), 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.path, expected[i]);
        match i % 3 {
            0 => assert_eq!(entry.kind, tar::EntryType::Directory),
            1 => assert_eq!(entry.link_target, Some(format!("/target/{i}"))),
            _ => assert_eq!(entry.content, vec![i as u8; 100 * i]),
        }
    }
    Ok(())
}

#[test]
fn test_file_names_follow_layers() -> Result<()> {
    let keys = recipient_keys();
    let cases = [
        (None, false, "evidence.tar"),
        (Some(CompressionMethod::Gzip), false, "evidence.tar.gz"),
        (Some(CompressionMethod::Bzip2), false, "evidence.tar.bz2"),
        (Some(CompressionMethod::Xz), false, "evidence.tar.xz"),
        (None, true, "evidence.tar.enc"),
        (Some(CompressionMethod::Xz), true, "evidence.tar.xz.enc"),
    ];

    for (method, encrypt, name) in cases {
        let dir = TempDir::new()?;
        let public_key = encrypt.then(|| keys.public_pem.clone());
        let mut output = TarOutput::new(config_for(&dir.path().join("evidence"), method, public_key))?;
        assert_eq!(output.path(), dir.path().join(name));
        output.close()?;
        assert!(dir.path().join(name).is_file());
    }
    Ok(())
}

#[test]
fn test_large_file_spans_several_chunks() -> Result<()> {
    let keys = recipient_keys();
    let dir = TempDir::new()?;
    let mut config = OutputConfig::new(dir.path().join("large")).with_encryption(keys.public_pem.clone());
    config.chunk_size = 64 * 1024;

    let content: Vec<u8> = (0..300 * 1024u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
    let mut output = TarOutput::new(config)?;
    output.write_entry("/disk/image.raw", &MemoryEntry::file(content.clone()))?;
    let summary = output.close()?;

    // 300KB of content plus headers in 64KB chunks
    let chunks = summary.encrypted_chunks.unwrap_or(0);
    assert!(chunks > 4, "expected several chunks, got {chunks}");

    let mut reader = DecryptingReader::open_pem(File::open(output.path())?, &keys.private_pem)?;
    let mut tar_bytes = Vec::new();
    reader.decrypt_to(&mut tar_bytes)?;
    assert_eq!(reader.chunks_processed(), chunks);

    let entries = parse_tar(&tar_bytes)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, content);
    Ok(())
}

#[test]
fn test_long_paths_and_link_targets_survive() -> Result<()> {
    let dir = TempDir::new()?;
    let mut output = TarOutput::new(OutputConfig::new(dir.path().join("long")))?;

    let long_dir = format!("/{}", vec!["deeply-nested-directory"; 12].join("/"));
    let long_file = format!("{long_dir}/file-with-a-long-name.txt");
    let long_target = format!("{long_dir}/target");
    assert!(long_file.len() > 100 && long_target.len() > 100);

    output.write_entry(&long_file, &MemoryEntry::file(b"deep".to_vec()))?;
    output.write_entry("/short-link", &MemoryEntry::symlink(long_target.clone()))?;
    output.close()?;

    let entries = parse_tar(&fs::read(output.path())?)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, long_file);
    assert_eq!(entries[0].content, b"deep");
    assert_eq!(entries[1].link_target, Some(long_target));
    Ok(())
}

#[test]
fn test_duplicate_paths_are_kept() -> Result<()> {
    let dir = TempDir::new()?;
    let mut output = TarOutput::new(OutputConfig::new(dir.path().join("dups")))?;
    output.write_bytes("/tmp/x", b"first")?;
    output.write_bytes("/tmp/x", b"second")?;
    output.close()?;

    let entries = parse_tar(&fs::read(output.path())?)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].content, b"first");
    assert_eq!(entries[1].content, b"second");
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_local_tree_round_trip() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let source = TempDir::new()?;
    fs::create_dir_all(source.path().join("logs/old"))?;
    fs::write(source.path().join("logs/auth.log"), b"Accepted publickey for root")?;
    fs::write(source.path().join("logs/old/auth.log.1"), b"Failed password")?;
    fs::set_permissions(source.path().join("logs/auth.log"), fs::Permissions::from_mode(0o600))?;
    std::os::unix::fs::symlink("auth.log", source.path().join("logs/current"))?;

    let out_dir = TempDir::new()?;
    let config = OutputConfig::new(out_dir.path().join("tree")).with_compression(CompressionMethod::Xz);
    let mut output = TarOutput::new(config)?;

    let walked: Vec<_> = walk_tree(source.path()).collect();
    for entry in &walked {
        output.write_entry(&entry.identity(), entry)?;
    }
    let summary = output.close()?;
    assert_eq!(summary.entry_count, walked.len() as u64);

    let entries = parse_tar(&decompress(Some(CompressionMethod::Xz), &fs::read(output.path())?)?)?;
    assert_eq!(entries.len(), walked.len());

    let find = |suffix: &str| entries.iter().find(|e| e.path.ends_with(suffix)).cloned();

    let auth = find("logs/auth.log").expect("auth.log archived");
    assert_eq!(auth.content, b"Accepted publickey for root");
    assert_eq!(auth.mode, 0o600);

    let link = find("logs/current").expect("symlink archived");
    assert_eq!(link.kind, tar::EntryType::Symlink);
    assert_eq!(link.link_target.as_deref(), Some("auth.log"));

    let old = find("logs/old").expect("directory archived");
    assert_eq!(old.kind, tar::EntryType::Directory);
    Ok(())
}
