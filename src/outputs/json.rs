//! JSON output generation for merged catalogs.
//!
//! Every output uses the same envelope as the input feeds and is written
//! pretty-printed with two-space indentation.
//!
//! # Output Structure
//!
//! ```text
//! dist_dir/
//! ├── online.json   # one file per category tag
//! ├── bt.json
//! └── all.json      # cross-category aggregate
//! ```

use crate::models::{Envelope, MediaSourceEntry};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// File stem of the cross-category aggregate.
pub const AGGREGATE_STEM: &str = "all";

/// Output file name for a category tag (or [`AGGREGATE_STEM`]).
pub fn output_file_name(stem: &str) -> String {
    format!("{stem}.json")
}

/// Serialize `entries` under the envelope and write them to
/// `{dist_dir}/{stem}.json`, replacing any previous file.
///
/// # Returns
///
/// The path written, or an error if serialization or the write fails.
#[instrument(level = "info", skip_all, fields(dist_dir = %dist_dir.display(), %stem, count = entries.len()))]
pub async fn write_catalog(
    dist_dir: &Path,
    stem: &str,
    entries: Vec<MediaSourceEntry>,
) -> io::Result<PathBuf> {
    let envelope = Envelope::new(entries);
    let json = serde_json::to_string_pretty(&envelope)?;

    let path = dist_dir.join(output_file_name(stem));
    if let Err(e) = fs::write(&path, json).await {
        error!(path = %path.display(), error = %e, "Failed to write merged file");
        return Err(e);
    }
    info!(path = %path.display(), "Saved merged file");
    Ok(path)
}
