//! # animeko_source
//!
//! Aggregates third-party media source subscription feeds into merged,
//! deduplicated catalogs and keeps a README table of their links current.
//!
//! ## Usage
//!
//! ```sh
//! animeko_source --config sources.yaml
//! ```
//!
//! ## Architecture
//!
//! A run has two stages that both read the same config:
//! 1. **Merge**: fetch every feed (falling back to its cached copy), filter
//!    entries, deduplicate them by search domain per category and across
//!    the run, and write `dist/<tag>.json` plus `dist/all.json`
//! 2. **README**: rebuild the link tables between the generated-region
//!    markers in `README.md`
//!
//! The `combine` subcommand is separate: it concatenates hand-maintained
//! files from `custom/` into a single feed without filtering.

use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{error, info, warn};

mod cache;
mod cli;
mod config;
mod dedup;
mod fetcher;
mod filter;
mod logging;
mod models;
mod outputs;
mod pipeline;
mod utils;

use cli::{Cli, Command};
use config::Config;
use fetcher::HttpFetcher;
use outputs::readme;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    logging::init(&args.log_path())?;

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), command = ?args.command(), "Starting update");

    if let Err(e) = run(&args).await {
        error!(error = %e, "Update failed");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Update process completed."
    );
    Ok(())
}

async fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    let command = args.command();
    if let Command::Combine { dir, output } = &command {
        pipeline::combine_directory(&args.root.join(dir), &args.root.join(output)).await?;
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    if command.merges_sources() {
        let paths = args.paths();

        // Early check: fail before any download if outputs cannot be written
        if let Err(e) = ensure_writable_dir(&paths.dist_dir).await {
            error!(
                path = %paths.dist_dir.display(),
                error = %e,
                "Output directory is not writable"
            );
            return Err(e.into());
        }

        let fetcher = HttpFetcher::new(args.timeout())?;
        let summary =
            pipeline::process_sources(&config, &fetcher, &paths, args.pipeline_options()).await?;

        let skipped: usize = summary.categories.iter().map(|c| c.feeds_skipped).sum();
        if skipped > 0 {
            warn!(skipped, "Some feeds were skipped; see errors above");
        }
    }

    if command.updates_readme() {
        readme::update_readme(&args.readme_path(), &config, &args.publish_target()).await?;
    }

    Ok(())
}
