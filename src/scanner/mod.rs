//! # Block Scanner
//!
//! Streams a file through the [`FingerprintEngine`], looks every emitted
//! key up in the [`BlockCatalog`] and confirms bucket hits with full MD5 and
//! SHA-1 digests. Confirmed blocks are handed to a [`MatchSink`] and marked
//! in the run's [`FoundSet`].

pub mod fingerprint;
pub mod verify;

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::catalog::{BlockCatalog, BlockEntry};
use fingerprint::FingerprintEngine;
use verify::Window;

/// One found-flag per catalog entry. Flags only go from false to true.
#[derive(Debug, Clone)]
pub struct FoundSet {
    flags: Vec<bool>,
    found: usize,
}

impl FoundSet {
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
            found: 0,
        }
    }

    /// Mark an entry found. Returns false if it already was.
    pub fn mark(&mut self, idx: usize) -> bool {
        if self.flags[idx] {
            return false;
        }
        self.flags[idx] = true;
        self.found += 1;
        true
    }

    pub fn is_found(&self, idx: usize) -> bool {
        self.flags[idx]
    }

    pub fn found_count(&self) -> usize {
        self.found
    }

    pub fn all_found(&self) -> bool {
        self.found == self.flags.len()
    }

    /// Indices still missing, in catalog order.
    pub fn missing(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|&(_, &found)| !found)
            .map(|(idx, _)| idx)
    }
}

/// A verified block at a stream position.
#[derive(Debug)]
pub struct BlockMatch<'a> {
    pub index: usize,
    pub entry: &'a BlockEntry,
    /// Offset of the first byte of the block in the scanned stream.
    pub offset: u64,
    pub window: Window<'a>,
}

/// Receives verified blocks. Returning false leaves the entry unfound, so a
/// later occurrence gets another chance.
pub trait MatchSink {
    fn accept(&mut self, hit: &BlockMatch<'_>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The whole stream was consumed.
    Finished,
    /// Every catalog entry is found; the rest of the stream was skipped.
    Satisfied,
    /// Cancellation was requested mid-stream.
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub bytes: u64,
    /// Bucket hits that went to digest verification.
    pub candidates: u64,
    pub matches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    pub stats: ScanStats,
}

pub struct BlockScanner<'c> {
    catalog: &'c BlockCatalog,
    engine: FingerprintEngine,
    buf: Vec<u8>,
}

impl<'c> BlockScanner<'c> {
    pub fn new(catalog: &'c BlockCatalog, read_buffer: usize) -> Self {
        Self {
            catalog,
            engine: FingerprintEngine::new(catalog.distinct_sizes()),
            buf: vec![0u8; read_buffer.max(1)],
        }
    }

    /// Scan one stream from its start.
    ///
    /// `cancel` is checked before every buffer refill, so a cancelled scan
    /// stops after at most one buffer plus the verification in flight.
    /// Entries already found are never verified again. Read errors abort
    /// the stream; anything confirmed before stays marked.
    pub fn scan<R: Read>(
        &mut self,
        mut reader: R,
        found: &mut FoundSet,
        cancel: &AtomicBool,
        sink: &mut dyn MatchSink,
    ) -> std::io::Result<ScanReport> {
        self.engine.reset();
        let mut stats = ScanStats::default();
        if found.all_found() {
            return Ok(ScanReport {
                outcome: ScanOutcome::Satisfied,
                stats,
            });
        }

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(ScanReport {
                    outcome: ScanOutcome::Cancelled,
                    stats,
                });
            }
            let n = match reader.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            stats.bytes += n as u64;

            for i in 0..n {
                let byte = self.buf[i];
                if self.engine.feed(byte).is_empty() {
                    continue;
                }
                for key in self.engine.ready() {
                    if !self.catalog.has_bucket(key.key) {
                        continue;
                    }
                    for &idx in self.catalog.lookup(key.key) {
                        let entry = self.catalog.entry(idx);
                        if entry.size != key.size || found.is_found(idx) {
                            continue;
                        }
                        let Some((head, tail)) = self.engine.trailing(entry.size) else {
                            continue;
                        };
                        stats.candidates += 1;
                        let window = Window::new(head, tail);
                        let offset = self.engine.position() - entry.size;
                        if !verify::verify(entry, &window) {
                            debug!(
                                "bucket hit for {} at offset {offset} failed verification",
                                entry.name
                            );
                            continue;
                        }
                        let hit = BlockMatch {
                            index: idx,
                            entry,
                            offset,
                            window,
                        };
                        if sink.accept(&hit) {
                            found.mark(idx);
                            stats.matches += 1;
                        }
                    }
                }
                if found.all_found() {
                    return Ok(ScanReport {
                        outcome: ScanOutcome::Satisfied,
                        stats,
                    });
                }
            }
        }

        Ok(ScanReport {
            outcome: ScanOutcome::Finished,
            stats,
        })
    }
}
