//! Shared test infrastructure for extraction tests.
//!
//! Builds installer trees and catalogs in temp directories and runs jobs to
//! completion while collecting their progress lines.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crossbeam_channel::Receiver;

use fwlocate::catalog::BlockCatalog;
use fwlocate::catalog::author::describe_block;
use fwlocate::config::{self, Config};
use fwlocate::pipeline::{ExtractionJob, RunReport};
use fwlocate::special::{DecodeError, GameDataDecoder};

// ============================================================================
// Trees and Data
// ============================================================================

pub fn write_file(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, data).expect("write file");
}

/// Deterministic filler bytes (xorshift).
pub fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// `prefix` filler bytes, then `block`, then `suffix` filler bytes.
pub fn embed(block: &[u8], prefix: usize, suffix: usize, seed: u64) -> Vec<u8> {
    let mut data = pseudo_random(prefix, seed);
    data.extend_from_slice(block);
    data.extend(pseudo_random(suffix, seed.wrapping_add(1)));
    data
}

pub fn catalog_of(blocks: &[(&str, &[u8])]) -> BlockCatalog {
    BlockCatalog::new(
        blocks
            .iter()
            .map(|(name, data)| describe_block(name, *data).expect("describe block"))
            .collect(),
    )
}

// ============================================================================
// Config and Jobs
// ============================================================================

/// Default config without special targets or latest link.
pub fn plain_config() -> Config {
    let mut cfg = config::load_config(None).expect("config").config;
    cfg.special_targets.clear();
    cfg.latest_link = None;
    cfg
}

/// Default config, special targets included.
pub fn default_config() -> Config {
    let mut cfg = config::load_config(None).expect("config").config;
    cfg.latest_link = None;
    cfg
}

pub fn job(catalog: BlockCatalog, cfg: &Config) -> ExtractionJob {
    ExtractionJob::from_config(catalog, cfg).expect("job")
}

/// Start a run and block until it is done.
pub fn run(job: &ExtractionJob, root: &Path, output: &Path) -> (RunReport, Vec<String>) {
    let handle = job.start(root, output).expect("start");
    let mut lines = Vec::new();
    let report = handle
        .wait_with(|line| lines.push(line.to_string()))
        .expect("wait");
    (report, lines)
}

// ============================================================================
// Decoders
// ============================================================================

/// Decoder that waits for a signal before writing a fixed output.
pub struct GatedDecoder {
    gate: Mutex<Receiver<()>>,
}

impl GatedDecoder {
    pub fn new(gate: Receiver<()>) -> Self {
        Self {
            gate: Mutex::new(gate),
        }
    }
}

impl GameDataDecoder for GatedDecoder {
    fn decode(&self, _source: &Path, output: &Path) -> Result<(), DecodeError> {
        if let Ok(gate) = self.gate.lock() {
            let _ = gate.recv();
        }
        fs::write(output, b"decoded").map_err(|source| DecodeError::Launch {
            program: "gated".to_string(),
            source,
        })
    }
}
