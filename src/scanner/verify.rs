//! Candidate verification by full digest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::catalog::{BlockEntry, Md5Digest, Sha1Digest};

/// A byte window split across at most two slices, in stream order.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub head: &'a [u8],
    pub tail: &'a [u8],
}

impl<'a> Window<'a> {
    pub fn new(head: &'a [u8], tail: &'a [u8]) -> Self {
        Self { head, tail }
    }

    pub fn len(&self) -> u64 {
        (self.head.len() + self.tail.len()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.tail.is_empty()
    }

    pub fn digests(&self) -> (Md5Digest, Sha1Digest) {
        let mut md5 = md5::Context::new();
        let mut sha1 = Sha1::new();
        for part in [self.head, self.tail] {
            md5.consume(part);
            sha1.update(part);
        }
        let mut sha1_digest = [0u8; 20];
        sha1_digest.copy_from_slice(&sha1.finalize());
        (md5.compute().0, sha1_digest)
    }

    /// Write the window verbatim to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(self.head)?;
        writer.write_all(self.tail)?;
        writer.flush()
    }
}

/// True only when the window has the entry's size and both digests match.
pub fn verify(entry: &BlockEntry, window: &Window<'_>) -> bool {
    if window.len() != entry.size {
        return false;
    }
    let (md5, sha1) = window.digests();
    md5 == entry.md5 && sha1 == entry.sha1
}
