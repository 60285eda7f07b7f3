//! Catalog authoring: hash reference files into catalog records.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::{BlockCatalog, BlockEntry, is_plain_file_name};
use crate::constants::AUTHOR_READ_BUFFER;
use crate::scanner::fingerprint::FingerprintAccumulator;

/// Compute size, fingerprint and digests of `reader` in one pass.
pub fn describe_block<R: Read>(name: &str, mut reader: R) -> std::io::Result<BlockEntry> {
    let mut buf = vec![0u8; AUTHOR_READ_BUFFER];
    let mut size = 0u64;
    let mut fingerprint = FingerprintAccumulator::new();
    let mut md5 = md5::Context::new();
    let mut sha1 = Sha1::new();
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let data = &buf[..n];
        fingerprint.update(data);
        md5.consume(data);
        sha1.update(data);
        size += n as u64;
    }
    let mut sha1_digest = [0u8; 20];
    sha1_digest.copy_from_slice(&sha1.finalize());
    Ok(BlockEntry {
        name: name.to_string(),
        size,
        fingerprint: fingerprint.finish(),
        md5: md5.compute().0,
        sha1: sha1_digest,
    })
}

/// Describe every readable regular file directly inside `dir`.
///
/// Files that cannot be read, are empty, or whose name cannot be stored in
/// a catalog record are skipped with a warning. The catalog is ordered by
/// fingerprint, then name.
pub fn author_directory(dir: &Path) -> std::io::Result<BlockCatalog> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", dir.display()),
        ));
    }
    let mut entries = Vec::new();
    for item in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };
        if !item.file_type().is_file() {
            continue;
        }
        let name = item.file_name().to_string_lossy().to_string();
        if !is_plain_file_name(&name) {
            warn!("skipping {name:?}: name cannot be stored in a catalog");
            continue;
        }
        let entry = match File::open(item.path()).and_then(|f| describe_block(&name, f)) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping {}: {err}", item.path().display());
                continue;
            }
        };
        if entry.size == 0 {
            warn!("skipping {name}: empty file");
            continue;
        }
        debug!(
            "{} {} {} {}",
            entry.name,
            entry.size,
            entry.fingerprint,
            hex::encode(entry.md5)
        );
        entries.push(entry);
    }
    entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint).then_with(|| a.name.cmp(&b.name)));
    Ok(BlockCatalog::new(entries))
}
