//! On-disk cache of raw feed bodies.
//!
//! Each category owns a directory `<source_dir>/<tag>/` holding one file per
//! feed, named by the feed's destination file name. Bodies are stored exactly
//! as downloaded and survive across runs.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
}

impl FeedCache {
    /// Cache rooted at the category directory `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the category directory if it does not exist.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Read a cached body, `Ok(None)` when there is no such file.
    pub async fn read(&self, file_name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(file_name)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Overwrite the cached body for `file_name`.
    pub async fn write(&self, file_name: &str, body: &str) -> io::Result<()> {
        fs::write(self.path_for(file_name), body).await
    }

    /// Delete `.json` files that no configured feed produced this run.
    ///
    /// Returns the names removed. Other files are left alone.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn prune(&self, configured: &HashSet<String>) -> io::Result<Vec<String>> {
        let mut removed = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") || configured.contains(&name) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            fs::remove_file(entry.path()).await?;
            info!(file = %name, "Removed cache file with no configured feed");
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(tmp.path().join("online"));
        cache.ensure_dir().await.unwrap();
        assert_eq!(cache.read("nope.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(tmp.path().join("online"));
        cache.ensure_dir().await.unwrap();

        cache.write("a.json", "{\"v\":1}").await.unwrap();
        cache.write("a.json", "{\"v\":2}").await.unwrap();
        assert_eq!(cache.read("a.json").await.unwrap().as_deref(), Some("{\"v\":2}"));
    }

    #[tokio::test]
    async fn test_prune_removes_only_unconfigured_json() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(tmp.path().join("bt"));
        cache.ensure_dir().await.unwrap();

        for name in ["keep.json", "stale.json", "notes.txt"] {
            cache.write(name, "{}").await.unwrap();
        }

        let configured: HashSet<String> = ["keep.json".to_string()].into_iter().collect();
        let removed = cache.prune(&configured).await.unwrap();

        assert_eq!(removed, vec!["stale.json".to_string()]);
        assert!(cache.path_for("keep.json").exists());
        assert!(cache.path_for("notes.txt").exists());
        assert!(!cache.path_for("stale.json").exists());
    }

    #[tokio::test]
    async fn test_prune_missing_dir_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(tmp.path().join("never-created"));
        assert!(cache.prune(&HashSet::new()).await.unwrap().is_empty());
    }
}
