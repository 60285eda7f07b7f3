use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use fwlocate::catalog::{self, BlockCatalog, author};
use fwlocate::cli::{self, AuthorArgs, Command, ExtractArgs};
use fwlocate::pipeline::{ExtractionJob, RunVerdict};
use fwlocate::{config, logging};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    match cli_opts.command {
        Command::Extract(args) => run_extract(args),
        Command::Author(args) => run_author(args),
    }
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let loaded = config::load_config(args.config_path.as_deref())?;
    let cfg = loaded.config;

    let catalog_path = match args.catalog {
        Some(path) => path,
        None => catalog::locate(&cfg.catalog_name, &cfg.catalog_search_paths).with_context(
            || {
                format!(
                    "catalog {} not found in {}",
                    cfg.catalog_name,
                    cfg.catalog_search_paths.join(", ")
                )
            },
        )?,
    };
    let (catalog, warnings) = BlockCatalog::load(&catalog_path)?;
    if !warnings.is_empty() {
        warn!("{} catalog line(s) skipped", warnings.len());
    }

    info!(
        "starting extraction source={} output={} catalog={} entries={} config_hash={}",
        args.source.display(),
        args.output.display(),
        catalog_path.display(),
        catalog.len(),
        loaded.config_hash
    );

    let job = ExtractionJob::from_config(catalog, &cfg)?;
    let handle = job.start(&args.source, &args.output)?;
    let token = handle.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("installing Ctrl-C handler")?;

    let report = handle.wait_with(|line| println!("{line}"))?;
    info!(
        "extraction finished destination={} found={} missing={}",
        report.destination.display(),
        report.found.len(),
        report.missing.len()
    );
    match report.verdict {
        RunVerdict::Complete => Ok(()),
        RunVerdict::Cancelled => bail!("extraction cancelled"),
        RunVerdict::Incomplete => bail!(
            "{} target(s) not found: {}",
            report.missing.len(),
            report.missing.join(", ")
        ),
    }
}

fn run_author(args: AuthorArgs) -> Result<()> {
    let catalog = author::author_directory(&args.dir)
        .with_context(|| format!("reading blocks from {}", args.dir.display()))?;
    if catalog.is_empty() {
        warn!("no blocks found in {}", args.dir.display());
    }
    match args.out {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating catalog {}", path.display()))?;
            catalog.write_to(BufWriter::new(file))?;
            info!("wrote {} catalog entries to {}", catalog.len(), path.display());
        }
        None => catalog.write_to(std::io::stdout().lock())?,
    }
    Ok(())
}
