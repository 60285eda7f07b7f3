//! # Pipeline Module
//!
//! Runs one extraction: walks the installer tree, routes every candidate
//! file to a special-target action or to the block scanner, writes what is
//! found into a fresh destination directory and reports progress lines over
//! the job's channel.

pub mod events;
pub mod workers;

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{Local, Utc};
use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{BlockCatalog, BlockEntry, is_plain_file_name};
use crate::config::{Config, SpecialAction};
use crate::constants::{DESTINATION_TIME_FORMAT, MANIFEST_FILE_NAME, PROGRESS_RULE};
use crate::metadata::{self, ExtractedKind, ExtractedRecord, ManifestSink, NullManifest};
use crate::scanner::{BlockMatch, BlockScanner, FoundSet, MatchSink, ScanOutcome};
use crate::special::{GameDataDecoder, Route, SpecialTable, SpecialTargetError};
use crate::walker::{self, WalkFilter, WalkOutcome, WalkVisitor};

use events::JobEvent;

pub use workers::{CancelToken, ExtractionJob, JobHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// Every catalog entry and every special target was extracted.
    Complete,
    /// The tree was searched but something is still missing.
    Incomplete,
    /// Stopped on request before the search finished.
    Cancelled,
}

impl RunVerdict {
    pub fn is_success(self) -> bool {
        matches!(self, RunVerdict::Complete)
    }
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub verdict: RunVerdict,
    pub destination: PathBuf,
    /// Targets extracted, catalog entries first, in catalog order.
    pub found: Vec<String>,
    /// Targets still missing, in the same order.
    pub missing: Vec<String>,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub candidates_checked: u64,
    pub blocks_extracted: u64,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("an extraction is already running for this job")]
    AlreadyRunning,
    #[error("cannot create destination under {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn extraction worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("extraction worker panicked")]
    Worker,
    #[error(transparent)]
    SpecialTargets(#[from] SpecialTargetError),
    #[error("latest_link {0:?} is not a plain file name")]
    InvalidLinkName(String),
}

/// Everything a run needs besides the catalog and the decoder.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub filter: WalkFilter,
    pub specials: SpecialTable,
    pub read_buffer: usize,
    pub write_manifest: bool,
    pub latest_link: Option<String>,
}

impl JobSettings {
    pub fn from_config(cfg: &Config) -> Result<Self, JobError> {
        if let Some(link) = &cfg.latest_link {
            if !is_plain_file_name(link) {
                return Err(JobError::InvalidLinkName(link.clone()));
            }
        }
        Ok(Self {
            filter: WalkFilter::from_config(cfg),
            specials: SpecialTable::from_config(&cfg.special_targets)?,
            read_buffer: cfg.read_buffer_bytes(),
            write_manifest: cfg.write_manifest,
            latest_link: cfg.latest_link.clone(),
        })
    }
}

/// Drop catalog entries whose output file would clash with the run manifest,
/// a special target's output or an earlier entry. Names are compared
/// case-insensitively.
pub(crate) fn drop_clashing_entries(
    catalog: BlockCatalog,
    specials: &SpecialTable,
) -> BlockCatalog {
    let mut taken: HashSet<String> = specials
        .iter()
        .map(|target| target.output.to_ascii_lowercase())
        .collect();
    taken.insert(MANIFEST_FILE_NAME.to_ascii_lowercase());
    let entries: Vec<BlockEntry> = catalog
        .into_entries()
        .into_iter()
        .filter(|entry| {
            let fresh = taken.insert(entry.name.to_ascii_lowercase());
            if !fresh {
                warn!(
                    "dropping catalog entry {}: output name already in use",
                    entry.name
                );
            }
            fresh
        })
        .collect();
    BlockCatalog::new(entries)
}

/// Create `<base>/<yymmdd_hhmmss>[_<n>]`, picking the first free name.
pub fn make_destination(base: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(base)?;
    let stamp = Local::now().format(DESTINATION_TIME_FORMAT).to_string();
    let mut name = stamp.clone();
    let mut counter = 0u32;
    loop {
        let candidate = base.join(&name);
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                name = format!("{stamp}_{counter}");
                counter += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Point `<destination's parent>/<link_name>` at `destination`.
fn update_latest_link(destination: &Path, link_name: &str) -> std::io::Result<PathBuf> {
    let base = destination.parent().unwrap_or(destination);
    let link = base.join(link_name);
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(&link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(destination, &link)?;
        Ok(link)
    }
    #[cfg(not(unix))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are only created on unix",
        ))
    }
}

fn progress(events: &Sender<JobEvent>, line: impl Into<String>) {
    if let Err(err) = events.send(JobEvent::Progress(line.into())) {
        debug!("progress receiver gone, dropping {:?}", err.into_inner());
    }
}

/// Borrowed state shared by one run.
pub(crate) struct RunContext<'a> {
    pub catalog: &'a BlockCatalog,
    pub settings: &'a JobSettings,
    pub decoder: &'a dyn GameDataDecoder,
    pub cancel: &'a AtomicBool,
    pub events: &'a Sender<JobEvent>,
}

/// Writes verified blocks into the destination.
struct BlockWriter<'a> {
    destination: &'a Path,
    source: &'a Path,
    manifest: &'a mut dyn ManifestSink,
    events: &'a Sender<JobEvent>,
}

impl MatchSink for BlockWriter<'_> {
    fn accept(&mut self, hit: &BlockMatch<'_>) -> bool {
        let output = self.destination.join(&hit.entry.name);
        if let Err(err) = hit.window.write_to(&output) {
            warn!("failed to write {}: {err}", output.display());
            return false;
        }
        info!(
            "extracted {} from {} at offset {}",
            hit.entry.name,
            self.source.display(),
            hit.offset
        );
        let record = ExtractedRecord {
            name: hit.entry.name.clone(),
            kind: ExtractedKind::Block,
            source: self.source.display().to_string(),
            output: output.display().to_string(),
            offset: Some(hit.offset),
            size: Some(hit.entry.size),
            md5: Some(hex::encode(hit.entry.md5)),
            sha1: Some(hex::encode(hit.entry.sha1)),
            extracted_at: Utc::now(),
        };
        if let Err(err) = self.manifest.record(&record) {
            warn!("manifest record error: {err}");
        }
        progress(self.events, format!("Extracted {}...", hit.entry.name));
        true
    }
}

struct ExtractionVisitor<'a> {
    ctx: &'a RunContext<'a>,
    destination: &'a Path,
    scanner: BlockScanner<'a>,
    found: FoundSet,
    special_found: Vec<bool>,
    manifest: Box<dyn ManifestSink>,
    files_scanned: u64,
    bytes_scanned: u64,
    candidates_checked: u64,
    blocks_extracted: u64,
}

impl<'a> ExtractionVisitor<'a> {
    fn new(ctx: &'a RunContext<'a>, destination: &'a Path, manifest: Box<dyn ManifestSink>) -> Self {
        Self {
            ctx,
            destination,
            scanner: BlockScanner::new(ctx.catalog, ctx.settings.read_buffer),
            found: FoundSet::new(ctx.catalog.len()),
            special_found: vec![false; ctx.settings.specials.len()],
            manifest,
            files_scanned: 0,
            bytes_scanned: 0,
            candidates_checked: 0,
            blocks_extracted: 0,
        }
    }

    fn extract_special(&mut self, idx: usize, path: &Path) {
        let target = self.ctx.settings.specials.get(idx);
        if self.special_found[idx] {
            debug!("{} already extracted, ignoring {}", target.name, path.display());
            return;
        }
        match target.apply(path, self.destination, self.ctx.decoder) {
            Ok(output) => {
                self.special_found[idx] = true;
                info!("extracted {} from {}", target.display_name(), path.display());
                let record = ExtractedRecord {
                    name: target.name.clone(),
                    kind: match target.action {
                        SpecialAction::Copy => ExtractedKind::Copy,
                        SpecialAction::Decode => ExtractedKind::Decode,
                    },
                    source: path.display().to_string(),
                    output: output.display().to_string(),
                    offset: None,
                    size: None,
                    md5: None,
                    sha1: None,
                    extracted_at: Utc::now(),
                };
                if let Err(err) = self.manifest.record(&record) {
                    warn!("manifest record error: {err}");
                }
                progress(
                    self.ctx.events,
                    format!("Extracted {}...", target.display_name()),
                );
            }
            Err(err) => {
                warn!("couldn't extract {} from {}: {err}", target.display_name(), path.display());
            }
        }
    }

    fn scan_file(&mut self, path: &Path) {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                return;
            }
        };
        debug!("analyzing {}", path.display());
        self.files_scanned += 1;
        let mut writer = BlockWriter {
            destination: self.destination,
            source: path,
            manifest: self.manifest.as_mut(),
            events: self.ctx.events,
        };
        match self
            .scanner
            .scan(file, &mut self.found, self.ctx.cancel, &mut writer)
        {
            Ok(report) => {
                self.bytes_scanned += report.stats.bytes;
                self.candidates_checked += report.stats.candidates;
                self.blocks_extracted += report.stats.matches;
                if report.outcome == ScanOutcome::Cancelled {
                    debug!("scan of {} cancelled", path.display());
                }
            }
            Err(err) => warn!("read error in {}, skipping rest of file: {err}", path.display()),
        }
    }

    fn finish(mut self, outcome: WalkOutcome, started: Instant) -> RunReport {
        if let Err(err) = self.manifest.flush() {
            warn!("manifest flush error: {err}");
        }
        let verdict = match outcome {
            WalkOutcome::Cancelled => RunVerdict::Cancelled,
            _ if self.satisfied() => RunVerdict::Complete,
            _ => RunVerdict::Incomplete,
        };

        let catalog = self.ctx.catalog;
        let specials = &self.ctx.settings.specials;
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for (idx, entry) in catalog.entries().iter().enumerate() {
            let bucket = if self.found.is_found(idx) { &mut found } else { &mut missing };
            bucket.push(entry.name.clone());
        }
        for (target, &done) in specials.iter().zip(&self.special_found) {
            let bucket = if done { &mut found } else { &mut missing };
            bucket.push(target.display_name().to_string());
        }

        let events = self.ctx.events;
        progress(events, PROGRESS_RULE);
        match verdict {
            RunVerdict::Complete => progress(events, "Extraction done!"),
            RunVerdict::Incomplete => {
                for name in &missing {
                    progress(events, format!("Couldn't extract {name}!"));
                }
            }
            RunVerdict::Cancelled => progress(events, "Extraction cancelled."),
        }

        if verdict.is_success() {
            if let Some(link_name) = &self.ctx.settings.latest_link {
                match update_latest_link(self.destination, link_name) {
                    Ok(link) => debug!("{} -> {}", link.display(), self.destination.display()),
                    Err(err) => warn!("cannot update {link_name} link: {err}"),
                }
            }
        }

        info!(
            "run_summary verdict={:?} files_scanned={} bytes_scanned={} candidates_checked={} blocks_extracted={} found={} missing={} elapsed_ms={}",
            verdict,
            self.files_scanned,
            self.bytes_scanned,
            self.candidates_checked,
            self.blocks_extracted,
            found.len(),
            missing.len(),
            started.elapsed().as_millis()
        );

        RunReport {
            verdict,
            destination: self.destination.to_path_buf(),
            found,
            missing,
            files_scanned: self.files_scanned,
            bytes_scanned: self.bytes_scanned,
            candidates_checked: self.candidates_checked,
            blocks_extracted: self.blocks_extracted,
        }
    }
}

impl WalkVisitor for ExtractionVisitor<'_> {
    fn cancelled(&self) -> bool {
        self.ctx.cancel.load(Ordering::Relaxed)
    }

    fn satisfied(&self) -> bool {
        self.found.all_found() && self.special_found.iter().all(|&done| done)
    }

    fn enter_dir(&mut self, dir: &Path) {
        debug!("entering {}", dir.display());
    }

    fn visit_file(&mut self, path: &Path, name: &str) {
        match self.ctx.settings.specials.classify(name) {
            Route::Special(idx) => self.extract_special(idx, path),
            Route::Scan => self.scan_file(path),
        }
    }
}

/// Run one extraction of `root` into an existing `destination`.
pub(crate) fn run_extraction(ctx: &RunContext<'_>, root: &Path, destination: &Path) -> RunReport {
    let started = Instant::now();
    progress(
        ctx.events,
        format!("Commencing analysis of directory '{}'...", root.display()),
    );
    info!(
        "starting extraction root={} destination={} entries={} special_targets={}",
        root.display(),
        destination.display(),
        ctx.catalog.len(),
        ctx.settings.specials.len()
    );
    if !root.is_dir() {
        warn!("source {} is not a readable directory", root.display());
    }

    let manifest = match metadata::build_manifest(ctx.settings.write_manifest, destination) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!("cannot create extraction manifest: {err}");
            Box::new(NullManifest)
        }
    };
    let mut visitor = ExtractionVisitor::new(ctx, destination, manifest);
    let outcome = walker::walk(root, &ctx.settings.filter, &mut visitor);
    visitor.finish(outcome, started)
}
