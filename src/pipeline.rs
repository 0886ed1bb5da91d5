//! Merge pipeline: fetch, filter, deduplicate, write.
//!
//! For each category, in config order, every feed is fetched (falling back to
//! its cached copy), its entries are run through the category and feed
//! filters, and survivors are deduplicated by domain twice: once within the
//! category and once across the whole run. Each category gets its own output
//! file, and the run-wide survivors go to `all.json`.
//!
//! # Failure Isolation
//!
//! A feed that cannot be fetched, parsed, or understood contributes nothing
//! and the run moves on. Only failing to create a directory or write an
//! output file aborts the run.
//!
//! # Ordering
//!
//! Categories, feeds and entries are visited in order and the first
//! occurrence of a domain wins. Later duplicates are dropped, never merged.

use crate::cache::FeedCache;
use crate::config::{Category, Config, Feed};
use crate::dedup::DedupTracker;
use crate::fetcher::{FetchError, FetchFeed};
use crate::filter::FilterSet;
use crate::models::{Envelope, MediaSourceEntry};
use crate::outputs::json::{AGGREGATE_STEM, write_catalog};
use crate::utils::{looks_truncated, truncate_for_log};
use serde::de::IgnoredAny;
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// Failures that abort the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write merged output '{stem}': {source}")]
    WriteOutput {
        stem: String,
        #[source]
        source: io::Error,
    },
}

/// Directories the pipeline reads from and writes to.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root of the raw feed cache; each category gets a subdirectory.
    pub source_dir: PathBuf,
    /// Where merged outputs are written.
    pub dist_dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Delete cached `.json` files that no configured feed produced.
    pub prune_cache: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { prune_cache: true }
    }
}

/// Where a feed body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    Network,
    Cache,
}

#[derive(Debug, Clone)]
pub struct FeedContent {
    pub body: String,
    pub origin: ContentOrigin,
}

/// Per-category counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub tag: String,
    /// Feeds whose body was obtained and parsed.
    pub feeds_loaded: usize,
    /// Feeds skipped for config, fetch or parse problems.
    pub feeds_skipped: usize,
    pub entries_seen: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub kept: usize,
    pub stale_removed: usize,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub categories: Vec<CategoryReport>,
    /// Entries written to the aggregate output.
    pub aggregate: usize,
}

/// Obtain a feed's body from the network, or from its cached copy.
///
/// A fresh download must be valid JSON before it replaces the cached copy.
/// Feeds without a URL read the cached copy directly. Returns `None` when
/// neither source has anything, after logging why.
#[instrument(level = "debug", skip_all, fields(file = %feed.file_name))]
pub async fn fetch_or_cache<F: FetchFeed>(
    fetcher: &F,
    cache: &FeedCache,
    feed: &Feed<'_>,
) -> Option<FeedContent> {
    let Some(url) = feed.url else {
        return match cache.read(feed.file_name).await {
            Ok(Some(body)) => {
                info!(file = %feed.file_name, "Using local file");
                Some(FeedContent {
                    body,
                    origin: ContentOrigin::Cache,
                })
            }
            Ok(None) => {
                error!(file = %feed.file_name, "No URL configured and local file does not exist");
                None
            }
            Err(e) => {
                error!(file = %feed.file_name, error = %e, "Failed to read local file");
                None
            }
        };
    };

    info!(%url, "Downloading");
    match download(fetcher, url).await {
        Ok(body) => {
            if let Err(e) = cache.write(feed.file_name, &body).await {
                error!(%url, file = %feed.file_name, error = %e, "Failed to update cached copy");
            }
            return Some(FeedContent {
                body,
                origin: ContentOrigin::Network,
            });
        }
        Err(e) => error!(%url, error = %e, "Download failed"),
    }

    match cache.read(feed.file_name).await {
        Ok(Some(body)) => {
            warn!(%url, file = %feed.file_name, "Using cached file");
            Some(FeedContent {
                body,
                origin: ContentOrigin::Cache,
            })
        }
        Ok(None) => {
            error!(%url, "No cache available, skipping");
            None
        }
        Err(e) => {
            error!(%url, error = %e, "Failed to read cached file, skipping");
            None
        }
    }
}

/// Fetch and check that the body is syntactically valid JSON.
async fn download<F: FetchFeed>(fetcher: &F, url: &str) -> Result<String, FetchError> {
    let body = fetcher.fetch(url).await?;
    serde_json::from_str::<IgnoredAny>(&body).map_err(|e| {
        FetchError::InvalidBody(format!("{e}; body: {}", truncate_for_log(&body, 80)))
    })?;
    Ok(body)
}

/// Accumulators for one category.
struct CategoryMerge {
    kept: Vec<MediaSourceEntry>,
    report: CategoryReport,
}

impl CategoryMerge {
    /// Filter and deduplicate one entry into the category and run-wide lists.
    fn offer(
        &mut self,
        entry: MediaSourceEntry,
        filters: &FilterSet<'_>,
        tracker: &mut DedupTracker,
        all: &mut Vec<MediaSourceEntry>,
    ) {
        self.report.entries_seen += 1;
        let domain = entry.domain();
        let name = entry.name().unwrap_or("-");
        let shown_domain = domain.as_deref().unwrap_or("-");

        if let Some((rejection, rule)) = filters.check(domain.as_deref()) {
            info!(
                entry = name,
                domain = shown_domain,
                %rejection,
                %rule,
                "[filter] Skipped entry"
            );
            self.report.filtered += 1;
            return;
        }

        let admission = tracker.admit(domain.as_deref());
        if !admission.category {
            info!(entry = name, domain = shown_domain, "Duplicate within category, skipped");
            self.report.duplicates += 1;
        }
        if !admission.global {
            debug!(entry = name, domain = shown_domain, "Duplicate across categories, left out of aggregate");
        }

        match (admission.category, admission.global) {
            (true, true) => {
                all.push(entry.clone());
                self.kept.push(entry);
            }
            (true, false) => self.kept.push(entry),
            (false, true) => all.push(entry),
            (false, false) => {}
        }
    }
}

/// Run the whole pipeline over `config`.
#[instrument(level = "info", skip_all, fields(categories = config.sources.len()))]
pub async fn process_sources<F: FetchFeed>(
    config: &Config,
    fetcher: &F,
    paths: &Paths,
    options: PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    info!("Starting update process...");
    create_dir(&paths.dist_dir).await?;

    let mut tracker = DedupTracker::new();
    let mut all = Vec::new();
    let mut summary = RunSummary::default();

    for category in &config.sources {
        let report = process_category(category, fetcher, paths, options, &mut tracker, &mut all).await?;
        summary.categories.push(report);
    }

    summary.aggregate = all.len();
    write_catalog(&paths.dist_dir, AGGREGATE_STEM, all)
        .await
        .map_err(|source| PipelineError::WriteOutput {
            stem: AGGREGATE_STEM.to_string(),
            source,
        })?;

    info!(
        aggregate = summary.aggregate,
        distinct_domains = tracker.global_len(),
        "Source processing completed"
    );
    Ok(summary)
}

#[instrument(level = "info", skip_all, fields(tag = %category.tag))]
async fn process_category<F: FetchFeed>(
    category: &Category,
    fetcher: &F,
    paths: &Paths,
    options: PipelineOptions,
    tracker: &mut DedupTracker,
    all: &mut Vec<MediaSourceEntry>,
) -> Result<CategoryReport, PipelineError> {
    info!("================================================================================");
    info!("Processing category: {} ({})", category.tag, category.name);
    info!("================================================================================");

    let cache = FeedCache::new(paths.source_dir.join(&category.tag));
    cache
        .ensure_dir()
        .await
        .map_err(|source| PipelineError::CreateDir {
            path: cache.dir().to_path_buf(),
            source,
        })?;
    tracker.begin_category();

    let mut merge = CategoryMerge {
        kept: Vec::new(),
        report: CategoryReport {
            tag: category.tag.clone(),
            ..Default::default()
        },
    };
    let mut configured: HashSet<String> = HashSet::new();

    for spec in &category.urls {
        let resolved = match spec.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "Skipping feed with invalid configuration");
                merge.report.feeds_skipped += 1;
                continue;
            }
        };
        let feed = resolved.feed();
        if !configured.insert(feed.file_name.to_string()) {
            warn!(
                file = %feed.file_name,
                "Another feed in this category uses the same cache file; it will be overwritten"
            );
        }

        let Some(content) = fetch_or_cache(fetcher, &cache, &feed).await else {
            merge.report.feeds_skipped += 1;
            continue;
        };

        let value: Value = match serde_json::from_str(&content.body) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    file = %feed.file_name,
                    error = %e,
                    truncated = looks_truncated(&e),
                    preview = %truncate_for_log(&content.body, 120),
                    "Error parsing JSON"
                );
                merge.report.feeds_skipped += 1;
                continue;
            }
        };
        merge.report.feeds_loaded += 1;

        let Some(entries) = Envelope::entries_from_value(value) else {
            warn!(file = %feed.file_name, "Feed is not a media source export; no entries taken");
            continue;
        };
        debug!(file = %feed.file_name, count = entries.len(), origin = ?content.origin, "Merging feed");

        let filters = FilterSet {
            category_include: category.filter.as_ref(),
            category_exclude: category.exclude_filter.as_ref(),
            feed_include: feed.filter,
            feed_exclude: feed.exclude_filter,
        };
        for entry in entries {
            merge.offer(entry, &filters, tracker, all);
        }
    }

    if options.prune_cache {
        match cache.prune(&configured).await {
            Ok(removed) => merge.report.stale_removed = removed.len(),
            Err(e) => error!(dir = %cache.dir().display(), error = %e, "Error cleaning up cache directory"),
        }
    }

    let CategoryMerge { kept, mut report } = merge;
    report.kept = kept.len();
    write_catalog(&paths.dist_dir, &category.tag, kept)
        .await
        .map_err(|source| PipelineError::WriteOutput {
            stem: category.tag.clone(),
            source,
        })?;

    info!(
        tag = %report.tag,
        loaded = report.feeds_loaded,
        skipped = report.feeds_skipped,
        seen = report.entries_seen,
        filtered = report.filtered,
        duplicates = report.duplicates,
        kept = report.kept,
        stale_removed = report.stale_removed,
        "Category merged"
    );
    Ok(report)
}

/// Concatenate the bare `mediaSources` arrays of every file in `dir` into one
/// envelope written to `output`.
///
/// Files are visited in name order. No filtering or deduplication is done. A
/// file that cannot be read or parsed is logged and skipped. Returns the
/// number of entries written.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), output = %output.display()))]
pub async fn combine_directory(dir: &Path, output: &Path) -> Result<usize, PipelineError> {
    let read_err = |source| PipelineError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    let mut listing = fs::read_dir(dir).await.map_err(read_err)?;
    while let Some(entry) = listing.next_entry().await.map_err(read_err)? {
        if entry.file_type().await.map_err(read_err)?.is_file() {
            names.push(entry.file_name());
        }
    }
    names.sort();

    let mut merged = Vec::new();
    for name in names {
        let path = dir.join(&name);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Error reading file");
                continue;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(mut root)) => match root.remove("mediaSources") {
                Some(Value::Array(sources)) => {
                    debug!(file = %path.display(), count = sources.len(), "Combining file");
                    merged.extend(sources.into_iter().map(MediaSourceEntry));
                }
                _ => warn!(file = %path.display(), "No mediaSources array; file ignored"),
            },
            Ok(_) => warn!(file = %path.display(), "Not a JSON object; file ignored"),
            Err(e) => error!(file = %path.display(), error = %e, "Error processing file"),
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent).await?;
    }
    let count = merged.len();
    let write_err = |source| PipelineError::WriteOutput {
        stem: output.display().to_string(),
        source,
    };
    let json = serde_json::to_string_pretty(&Envelope::new(merged))
        .map_err(|e| write_err(io::Error::from(e)))?;
    fs::write(output, json).await.map_err(write_err)?;
    info!(count, "Combined files");
    Ok(count)
}

async fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| PipelineError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}
