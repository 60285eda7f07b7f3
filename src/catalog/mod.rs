//! # Block Catalog
//!
//! The set of blocks a run looks for, indexed by fingerprint.
//!
//! The persisted form is line oriented text, one record per line:
//!
//! ```text
//! <name> <size> <fingerprint> <md5 hex> <sha1 hex>
//! ```
//!
//! Malformed records are reported as [`CatalogParseWarning`]s and skipped;
//! only a missing, unreadable or empty catalog is fatal.

pub mod author;

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{FINGERPRINT_SPACE, MAX_BLOCK_SIZE};

pub type Md5Digest = [u8; 16];
pub type Sha1Digest = [u8; 20];

/// One named, fixed-size block. Identity is `(size, md5, sha1)`; the
/// fingerprint is only a bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub name: String,
    pub size: u64,
    pub fingerprint: u16,
    pub md5: Md5Digest,
    pub sha1: Sha1Digest,
}

impl BlockEntry {
    /// Catalog record for this entry, without the trailing newline.
    pub fn to_record(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.name,
            self.size,
            self.fingerprint,
            hex::encode(self.md5),
            hex::encode(self.sha1)
        )
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog {} contains no usable records", path.display())]
    Empty { path: PathBuf },
}

/// A skipped catalog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogParseWarning {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for CatalogParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Immutable, fingerprint-indexed set of blocks.
#[derive(Debug, Clone)]
pub struct BlockCatalog {
    entries: Vec<BlockEntry>,
    buckets: HashMap<u16, Vec<usize>>,
    present: Vec<u64>,
    sizes: Vec<u64>,
}

impl BlockCatalog {
    pub fn new(entries: Vec<BlockEntry>) -> Self {
        let mut buckets: HashMap<u16, Vec<usize>> = HashMap::new();
        let mut present = vec![0u64; FINGERPRINT_SPACE / 64];
        let mut sizes = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            buckets.entry(entry.fingerprint).or_default().push(idx);
            present[entry.fingerprint as usize / 64] |= 1u64 << (entry.fingerprint % 64);
            sizes.push(entry.size);
        }
        sizes.sort_unstable();
        sizes.dedup();
        Self {
            entries,
            buckets,
            present,
            sizes,
        }
    }

    /// Parse catalog text. Returns the catalog of well formed records plus a
    /// warning per skipped line.
    pub fn parse(text: &str) -> (Self, Vec<CatalogParseWarning>) {
        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_record(line) {
                Ok(entry) => entries.push(entry),
                Err(reason) => warnings.push(CatalogParseWarning {
                    line: idx + 1,
                    reason,
                }),
            }
        }
        (Self::new(entries), warnings)
    }

    /// Read and parse a catalog file. Parse warnings are logged and
    /// returned; an unreadable or empty catalog is an error.
    pub fn load(path: &Path) -> Result<(Self, Vec<CatalogParseWarning>), CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (catalog, warnings) = Self::parse(&text);
        for warning in &warnings {
            warn!("catalog {}: skipping {warning}", path.display());
        }
        if catalog.is_empty() {
            return Err(CatalogError::Empty {
                path: path.to_path_buf(),
            });
        }
        debug!(
            "catalog {} loaded: {} entries, {} distinct sizes",
            path.display(),
            catalog.len(),
            catalog.sizes.len()
        );
        Ok((catalog, warnings))
    }

    /// Indices of every entry in the given bucket, in catalog order.
    pub fn lookup(&self, fingerprint: u16) -> &[usize] {
        self.buckets
            .get(&fingerprint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fast rejection test, no hashing.
    #[inline]
    pub fn has_bucket(&self, fingerprint: u16) -> bool {
        self.present[fingerprint as usize / 64] & (1u64 << (fingerprint % 64)) != 0
    }

    pub fn entry(&self, idx: usize) -> &BlockEntry {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BlockEntry> {
        self.entries
    }

    /// Distinct block sizes, ascending.
    pub fn distinct_sizes(&self) -> &[u64] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry as a catalog record.
    pub fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for entry in &self.entries {
            writeln!(out, "{}", entry.to_record())?;
        }
        out.flush()
    }
}

fn parse_record(line: &str) -> Result<BlockEntry, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }
    let name = fields[0];
    if !is_plain_file_name(name) {
        return Err(format!("invalid block name {name:?}"));
    }
    let size: u64 = fields[1]
        .parse()
        .map_err(|_| format!("invalid size {:?}", fields[1]))?;
    if size == 0 {
        return Err("block size must be positive".to_string());
    }
    if size > MAX_BLOCK_SIZE {
        return Err(format!("block size {size} exceeds {MAX_BLOCK_SIZE}"));
    }
    let fingerprint: u16 = fields[2]
        .parse()
        .map_err(|_| format!("invalid fingerprint {:?}", fields[2]))?;
    let mut md5 = [0u8; 16];
    hex::decode_to_slice(fields[3], &mut md5)
        .map_err(|e| format!("invalid md5 {:?}: {e}", fields[3]))?;
    let mut sha1 = [0u8; 20];
    hex::decode_to_slice(fields[4], &mut sha1)
        .map_err(|e| format!("invalid sha1 {:?}: {e}", fields[4]))?;
    Ok(BlockEntry {
        name: name.to_string(),
        size,
        fingerprint,
        md5,
        sha1,
    })
}

/// A name that stays inside the destination directory when joined to it.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_whitespace)
}

/// Find `file_name` in the first search directory that holds a readable
/// copy. A leading `~/` is expanded from `HOME`.
pub fn locate(file_name: &str, search_paths: &[String]) -> Option<PathBuf> {
    search_paths
        .iter()
        .filter_map(|dir| expand_home(dir))
        .map(|dir| dir.join(file_name))
        .find(|candidate| std::fs::File::open(candidate).is_ok())
}

fn expand_home(dir: &str) -> Option<PathBuf> {
    match dir.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME").map(|home| PathBuf::from(home).join(rest)),
        None => Some(PathBuf::from(dir)),
    }
}
