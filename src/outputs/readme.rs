//! README link tables.
//!
//! Two Markdown tables are built from the config alone, without looking at
//! the pipeline's output:
//!
//! - **Aggregate links**: one row for the combined `all.json`, then one row
//!   per category, each listing the raw output URL followed by every proxy
//!   mirror of it
//! - **Feeds**: one row per configured feed with its provenance link and URL
//!
//! The tables are placed between `<!-- AUTO_GENERATED_START -->` and
//! `<!-- AUTO_GENERATED_END -->`. Anything outside the markers is preserved.
//! Documents still using the older `PROXY_LINKS` markers are migrated, and a
//! README with no markers at all gets the block appended.

use crate::config::Config;
use crate::outputs::json::{AGGREGATE_STEM, output_file_name};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

pub const START_MARKER: &str = "<!-- AUTO_GENERATED_START -->";
pub const END_MARKER: &str = "<!-- AUTO_GENERATED_END -->";
const LEGACY_START_MARKER: &str = "<!-- PROXY_LINKS_START -->";
const LEGACY_END_MARKER: &str = "<!-- PROXY_LINKS_END -->";

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("static pattern compiles"));

/// Where published outputs live, used to build raw URLs.
#[derive(Debug, Clone)]
pub struct PublishTarget {
    /// `owner/name` of the hosting repository.
    pub repo: String,
    pub branch: String,
    /// Output directory relative to the repository root, e.g. `dist`.
    pub dist_path: String,
}

impl PublishTarget {
    /// Raw URL of an output file.
    pub fn raw_url(&self, file_name: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.repo,
            self.branch,
            self.dist_path.trim_matches('/'),
            file_name
        )
    }
}

/// The raw URL followed by each proxy mirror, separated by `<br><br>`.
pub fn mirror_links(raw_url: &str, proxies: &[String]) -> String {
    let bare = SCHEME.replace(raw_url, "");
    std::iter::once(raw_url.to_string())
        .chain(proxies.iter().map(|proxy| format!("{proxy}{bare}")))
        .join("<br><br>")
}

pub fn render_aggregate_table(config: &Config, target: &PublishTarget) -> String {
    let mut table = String::new();
    table.push_str("### 聚合三方订阅源 (已去重)\n\n");
    table.push_str("| 分 类 | 链 接 (除了第一个都是加速链接, 订阅其中一个即可)|\n");
    table.push_str("|---|---|\n");

    let rows = std::iter::once((config.readme.aggregate_name.as_str(), AGGREGATE_STEM)).chain(
        config
            .sources
            .iter()
            .map(|category| (category.name.as_str(), category.tag.as_str())),
    );
    for (label, stem) in rows {
        let raw = target.raw_url(&output_file_name(stem));
        writeln!(table, "| {} | {} |", label, mirror_links(&raw, &config.proxy)).unwrap();
    }
    table
}

pub fn render_feed_table(config: &Config) -> String {
    let mut table = String::new();
    table.push_str("### 三方订阅源 (散)\n\n");
    table.push_str("| 分 类 | 来 源 | 链 接 |\n|---|---|---|\n");

    for category in &config.sources {
        for feed in &category.urls {
            let provenance = feed
                .provenance()
                .map(|src| format!("[源]({src})"))
                .unwrap_or_default();
            writeln!(
                table,
                "| {} | {} | {} |",
                category.name,
                provenance,
                feed.url().unwrap_or_default()
            )
            .unwrap();
        }
    }
    table
}

/// The full generated region, markers included.
pub fn render_block(config: &Config, target: &PublishTarget) -> String {
    format!(
        "{START_MARKER}\n\n{}\n{}\n{END_MARKER}",
        render_aggregate_table(config, target),
        render_feed_table(config)
    )
}

/// Replace the first `start`..`end` region (markers included) with `block`.
///
/// `end` is searched for after `start`, so a document whose only end marker
/// precedes its start marker has no region and the caller falls through to
/// the next option, which may append a second block.
fn replace_region(doc: &str, start: &str, end: &str, block: &str) -> Option<String> {
    let from = doc.find(start)?;
    let to = from + doc[from..].find(end)? + end.len();
    let mut out = String::with_capacity(doc.len() + block.len());
    out.push_str(&doc[..from]);
    out.push_str(block);
    out.push_str(&doc[to..]);
    Some(out)
}

/// Put `block` into `doc`: over the current markers, over the legacy
/// markers, or appended at the end.
pub fn splice(doc: &str, block: &str) -> String {
    replace_region(doc, START_MARKER, END_MARKER, block)
        .or_else(|| replace_region(doc, LEGACY_START_MARKER, LEGACY_END_MARKER, block))
        .unwrap_or_else(|| format!("{doc}\n\n{block}"))
}

/// Regenerate the tables in the README at `path`. A missing README is
/// treated as empty and created.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn update_readme(path: &Path, config: &Config, target: &PublishTarget) -> io::Result<()> {
    let existing = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let updated = splice(&existing, &render_block(config, target));
    fs::write(path, updated).await?;
    info!("README.md updated");
    Ok(())
}
