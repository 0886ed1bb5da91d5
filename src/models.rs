//! Data models for media source feeds and merged outputs.
//!
//! This module defines the wire shapes read from feeds and written back out:
//! - [`MediaSourceEntry`]: one opaque media source record
//! - [`Envelope`]: the `{ exportedMediaSourceDataList: { mediaSources: [...] } }`
//!   wrapper shared by input feeds and every output file
//!
//! Entries are kept as raw JSON values so fields this tool does not inspect are
//! passed through untouched, in their original key order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// A single media source record taken from a feed.
///
/// Only `arguments.searchConfig.searchUrl` and `arguments.name` are ever
/// looked at; everything else is carried verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MediaSourceEntry(pub Value);

impl MediaSourceEntry {
    /// The nested search URL, if present and a string.
    pub fn search_url(&self) -> Option<&str> {
        self.0
            .get("arguments")?
            .get("searchConfig")?
            .get("searchUrl")?
            .as_str()
    }

    /// Display name used in log lines.
    pub fn name(&self) -> Option<&str> {
        self.0.get("arguments")?.get("name")?.as_str()
    }

    /// Host of the search URL. This is the dedup and filter key.
    ///
    /// Any failure along the way (missing field, unparseable URL, empty host)
    /// yields `None`.
    pub fn domain(&self) -> Option<String> {
        let url = Url::parse(self.search_url()?).ok()?;
        url.host_str()
            .filter(|host| !host.is_empty())
            .map(str::to_string)
    }
}

/// Inner list of the envelope.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MediaSourceList {
    pub mediaSources: Vec<MediaSourceEntry>,
}

/// The fixed wrapper used for input feeds and all output files.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    pub exportedMediaSourceDataList: MediaSourceList,
}

impl Envelope {
    pub fn new(entries: Vec<MediaSourceEntry>) -> Self {
        Self {
            exportedMediaSourceDataList: MediaSourceList {
                mediaSources: entries,
            },
        }
    }

    /// Pull the entry list out of a parsed feed body.
    ///
    /// Returns `None` when the body does not have the envelope shape. Extra
    /// fields around the envelope are ignored.
    pub fn entries_from_value(value: Value) -> Option<Vec<MediaSourceEntry>> {
        let Value::Object(mut root) = value else {
            return None;
        };
        let Value::Object(mut list) = root.remove("exportedMediaSourceDataList")? else {
            return None;
        };
        let Value::Array(sources) = list.remove("mediaSources")? else {
            return None;
        };
        Some(sources.into_iter().map(MediaSourceEntry).collect())
    }
}
