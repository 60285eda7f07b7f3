//! # Pipeline Workers
//!
//! The extraction job object, its background worker thread and the handle
//! the caller uses to follow, stop and join a run.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, unbounded};
use tracing::{debug, error};

use crate::catalog::BlockCatalog;
use crate::config::Config;
use crate::special::{self, GameDataDecoder};

use super::events::JobEvent;
use super::{
    JobError, JobSettings, RunContext, RunReport, RunVerdict, drop_clashing_entries,
    make_destination, run_extraction,
};

/// Shared stop flag for one run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Clears the job's busy flag when dropped, panics included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A loaded catalog plus settings; runs at most one extraction at a time.
///
/// Catalog entries whose output name clashes with the manifest, a special
/// target or an earlier entry are dropped with a warning when the job is
/// built.
pub struct ExtractionJob {
    catalog: Arc<BlockCatalog>,
    settings: Arc<JobSettings>,
    decoder: Arc<dyn GameDataDecoder>,
    busy: Arc<AtomicBool>,
}

impl ExtractionJob {
    pub fn new(
        catalog: BlockCatalog,
        settings: JobSettings,
        decoder: Arc<dyn GameDataDecoder>,
    ) -> Self {
        let catalog = drop_clashing_entries(catalog, &settings.specials);
        Self {
            catalog: Arc::new(catalog),
            settings: Arc::new(settings),
            decoder,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(catalog: BlockCatalog, cfg: &Config) -> Result<Self, JobError> {
        let settings = JobSettings::from_config(cfg)?;
        Ok(Self::new(
            catalog,
            settings,
            special::build_decoder(&cfg.decoder_command),
        ))
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Create a fresh destination under `destination_base` and start
    /// extracting from `root` on a background thread.
    ///
    /// Fails with [`JobError::AlreadyRunning`] while a previous run of this
    /// job has not sent its `Done` event.
    pub fn start(&self, root: &Path, destination_base: &Path) -> Result<JobHandle, JobError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(JobError::AlreadyRunning);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let destination =
            make_destination(destination_base).map_err(|source| JobError::Destination {
                path: destination_base.to_path_buf(),
                source,
            })?;
        debug!("created destination {}", destination.display());

        let cancel = CancelToken::new();
        let (tx, rx) = unbounded();
        let catalog = Arc::clone(&self.catalog);
        let settings = Arc::clone(&self.settings);
        let decoder = Arc::clone(&self.decoder);
        let token = cancel.clone();
        let root = root.to_path_buf();
        let dest = destination.clone();

        let worker = thread::Builder::new()
            .name("fwlocate-extract".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    let ctx = RunContext {
                        catalog: &catalog,
                        settings: &settings,
                        decoder: &*decoder,
                        cancel: token.flag(),
                        events: &tx,
                    };
                    run_extraction(&ctx, &root, &dest)
                }));
                drop(busy);
                match result {
                    Ok(report) => {
                        let _ = tx.send(JobEvent::Done(report.verdict));
                        Some(report)
                    }
                    Err(_) => {
                        error!("extraction worker panicked");
                        let _ = tx.send(JobEvent::Done(RunVerdict::Incomplete));
                        None
                    }
                }
            })
            .map_err(JobError::Spawn)?;

        Ok(JobHandle {
            cancel,
            events: rx,
            destination,
            worker,
        })
    }
}

/// Caller's side of a running extraction.
pub struct JobHandle {
    cancel: CancelToken,
    events: Receiver<JobEvent>,
    destination: PathBuf,
    worker: thread::JoinHandle<Option<RunReport>>,
}

impl JobHandle {
    /// Request cancellation. Safe to call from any thread, any number of
    /// times, including after the run finished.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Join the worker and return its report.
    pub fn wait(self) -> Result<RunReport, JobError> {
        self.worker.join().ok().flatten().ok_or(JobError::Worker)
    }

    /// Hand every progress line to `on_progress` until the run is done,
    /// then join the worker.
    pub fn wait_with(self, mut on_progress: impl FnMut(&str)) -> Result<RunReport, JobError> {
        for event in self.events.iter() {
            match event {
                JobEvent::Progress(line) => on_progress(&line),
                JobEvent::Done(_) => break,
            }
        }
        self.wait()
    }
}
