//! Category and feed configuration.
//!
//! The config is a YAML document loaded once per run. When no file is given
//! the built-in [`Config::default`] is used. Feeds may be written either as
//! objects with an explicit destination `file`, or as bare URL strings whose
//! file name is derived from the URL path.

use crate::filter::{FilterRule, deserialize_rule};
use crate::outputs::json::AGGREGATE_STEM;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Duplicate category tag: {0}")]
    DuplicateTag(String),

    #[error("Category tag must not be empty")]
    EmptyTag,

    #[error("Category tag '{0}' is reserved for the aggregate output")]
    ReservedTag(String),

    #[error("Feed entry is missing the '{field}' field: {feed}")]
    MissingField { field: &'static str, feed: String },

    #[error("Feed URL could not be parsed: {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Mirror prefixes prepended to raw output URLs in the README.
    #[serde(default)]
    pub proxy: Vec<String>,

    #[serde(default)]
    pub readme: ReadmeLabels,

    pub sources: Vec<Category>,
}

/// Labels used when rendering the README tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadmeLabels {
    /// Row label for the combined `all.json` output.
    pub aggregate_name: String,
}

impl Default for ReadmeLabels {
    fn default() -> Self {
        Self {
            aggregate_name: "在线+BT".to_string(),
        }
    }
}

/// A named group of feeds that share filters and one merged output file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Display name.
    pub name: String,
    /// Unique identifier, also the output file stem and cache directory name.
    pub tag: String,
    #[serde(default, deserialize_with = "deserialize_rule")]
    pub filter: Option<FilterRule>,
    #[serde(default, deserialize_with = "deserialize_rule")]
    pub exclude_filter: Option<FilterRule>,
    #[serde(default)]
    pub urls: Vec<FeedSpec>,
}

/// A feed as written in the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedSpec {
    /// A bare URL; the destination file name is derived from its path.
    Url(String),
    Detailed(FeedDetails),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDetails {
    /// Destination file name in the category cache directory.
    pub file: Option<String>,
    /// Download URL. Absent means the cached file is used as-is.
    pub url: Option<String>,
    /// Provenance link shown in the README.
    pub src: Option<String>,
    #[serde(default, deserialize_with = "deserialize_rule")]
    pub filter: Option<FilterRule>,
    #[serde(default, deserialize_with = "deserialize_rule")]
    pub exclude_filter: Option<FilterRule>,
}

/// A feed after its destination file name has been settled.
#[derive(Debug, Clone, Copy)]
pub struct Feed<'a> {
    pub file_name: &'a str,
    pub url: Option<&'a str>,
    pub filter: Option<&'a FilterRule>,
    pub exclude_filter: Option<&'a FilterRule>,
}

/// A config feed paired with its settled file name.
#[derive(Debug, Clone)]
pub struct ResolvedFeed<'a> {
    file_name: String,
    spec: &'a FeedSpec,
}

impl<'a> ResolvedFeed<'a> {
    pub fn feed(&self) -> Feed<'_> {
        match self.spec {
            FeedSpec::Url(url) => Feed {
                file_name: &self.file_name,
                url: Some(url),
                filter: None,
                exclude_filter: None,
            },
            FeedSpec::Detailed(d) => Feed {
                file_name: &self.file_name,
                url: d.url.as_deref(),
                filter: d.filter.as_ref(),
                exclude_filter: d.exclude_filter.as_ref(),
            },
        }
    }
}

impl FeedSpec {
    /// Settle the destination file name.
    ///
    /// Object-form feeds must name their `file`; URL strings derive one.
    pub fn resolve(&self) -> Result<ResolvedFeed<'_>, ConfigError> {
        let file_name = match self {
            FeedSpec::Url(url) => file_name_from_url(url)?,
            FeedSpec::Detailed(d) => match d.file.as_deref().filter(|f| !f.is_empty()) {
                Some(file) => file.to_string(),
                None => {
                    return Err(ConfigError::MissingField {
                        field: "file",
                        feed: self.describe(),
                    });
                }
            },
        };
        Ok(ResolvedFeed {
            file_name,
            spec: self,
        })
    }

    /// The download URL, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            FeedSpec::Url(url) => Some(url),
            FeedSpec::Detailed(d) => d.url.as_deref(),
        }
    }

    /// The provenance link, if any.
    pub fn provenance(&self) -> Option<&str> {
        match self {
            FeedSpec::Url(_) => None,
            FeedSpec::Detailed(d) => d.src.as_deref(),
        }
    }

    /// Short human description for log lines.
    pub fn describe(&self) -> String {
        match self {
            FeedSpec::Url(url) => url.clone(),
            FeedSpec::Detailed(d) => format!(
                "{{ file: {}, url: {} }}",
                d.file.as_deref().unwrap_or("-"),
                d.url.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Derive a cache file name from a feed URL.
///
/// Takes the last non-empty path segment, falls back to `index`, and makes
/// sure the result ends in `.json`.
pub fn file_name_from_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    let last = url
        .path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    let mut name = if last.is_empty() || last == "." {
        "index".to_string()
    } else {
        last.to_string()
    };
    if !name.ends_with(".json") {
        name.push_str(".json");
    }
    Ok(name)
}

impl Config {
    /// Load a config from `path`, or the built-in default when `path` is `None`.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        info!(
            categories = config.sources.len(),
            proxies = config.proxy.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Tags must be non-empty, unique, and distinct from the aggregate stem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for category in &self.sources {
            if category.tag.is_empty() {
                return Err(ConfigError::EmptyTag);
            }
            if category.tag == AGGREGATE_STEM {
                return Err(ConfigError::ReservedTag(category.tag.clone()));
            }
            if !seen.insert(category.tag.as_str()) {
                return Err(ConfigError::DuplicateTag(category.tag.clone()));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let detailed = |file: &str, src: Option<&str>, url: &str| FeedDetails {
            file: Some(file.to_string()),
            url: Some(url.to_string()),
            src: src.map(str::to_string),
            ..Default::default()
        };

        let mut online_h = detailed(
            "H.json",
            Some("https://gitee.com/wan0ge/extract-pure-links"),
            "https://gitee.com/wan0ge/extract-pure-links/raw/Ani_Pages/H.json",
        );
        online_h.exclude_filter = Some(FilterRule::parse("sukebei.nyaa.si"));

        let mut bt_h = online_h.clone();
        bt_h.exclude_filter = None;
        bt_h.filter = Some(FilterRule::parse("sukebei.nyaa.si"));

        Self {
            proxy: vec![
                "https://ghfast.top/".to_string(),
                "https://gh-proxy.com/".to_string(),
            ],
            readme: ReadmeLabels::default(),
            sources: vec![
                Category {
                    name: "在线".to_string(),
                    tag: "online".to_string(),
                    filter: None,
                    exclude_filter: None,
                    urls: vec![
                        FeedSpec::Detailed(detailed(
                            "ani-yuan.json",
                            Some("https://github.com/cxay666/ani-yuan"),
                            "https://raw.githubusercontent.com/cxay666/ani-yuan/main/ani-yuan.json",
                        )),
                        FeedSpec::Detailed(detailed(
                            "css.json",
                            Some("https://github.com/Nier4ever/ani-sub"),
                            "https://raw.githubusercontent.com/Nier4ever/ani-sub/main/css.json",
                        )),
                        FeedSpec::Detailed(online_h),
                    ],
                },
                Category {
                    name: "BT".to_string(),
                    tag: "bt".to_string(),
                    filter: None,
                    exclude_filter: None,
                    urls: vec![
                        FeedSpec::Detailed(detailed(
                            "anibt.json",
                            None,
                            "https://masofod.github.io/anibt.json",
                        )),
                        FeedSpec::Detailed(bt_h),
                    ],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;

    const SAMPLE: &str = r#"
proxy:
  - https://ghfast.top/
sources:
  - name: Online
    tag: online
    filter: "/(baidu|google)/i"
    excludeFilter: ad
    urls:
      - file: a.json
        url: https://example.com/feeds/a.json
        src: https://example.com/repo
        excludeFilter: test
      - https://example.com/raw/b
  - name: Local
    tag: local
    urls:
      - file: kept.json
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].tag, "online");
        assert_eq!(config.readme.aggregate_name, "在线+BT");
    }

    #[test]
    fn test_parse_yaml_config() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.proxy, vec!["https://ghfast.top/"]);
        assert_eq!(config.readme.aggregate_name, "在线+BT");

        let online = &config.sources[0];
        assert_eq!(online.name, "Online");
        assert!(matches!(online.filter, Some(FilterRule::Regex { .. })));
        assert!(matches!(online.exclude_filter, Some(FilterRule::Literal(_))));

        let first = online.urls[0].resolve().unwrap();
        let feed = first.feed();
        assert_eq!(feed.file_name, "a.json");
        assert_eq!(feed.url, Some("https://example.com/feeds/a.json"));
        assert_eq!(online.urls[0].provenance(), Some("https://example.com/repo"));
        assert_eq!(feed.exclude_filter.map(|r| r.as_str()), Some("test"));

        let second = online.urls[1].resolve().unwrap();
        assert_eq!(second.feed().file_name, "b.json");
        assert!(second.feed().filter.is_none());

        let local = config.sources[1].urls[0].resolve().unwrap();
        assert_eq!(local.feed().url, None);
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let yaml = r#"
sources:
  - { name: A, tag: same }
  - { name: B, tag: same }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTag(t)) if t == "same"));
    }

    #[test]
    fn test_aggregate_tag_rejected() {
        let yaml = r#"
sources:
  - { name: Everything, tag: all }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ReservedTag(t)) if t == "all"));
    }

    #[test]
    fn test_empty_filter_strings_are_absent() {
        let yaml = r#"
sources:
  - name: Online
    tag: online
    filter: ""
    excludeFilter: ""
    urls:
      - file: a.json
        url: https://example.com/a.json
        filter: ""
        excludeFilter: ""
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let online = &config.sources[0];
        assert!(online.filter.is_none());
        assert!(online.exclude_filter.is_none());

        let resolved = online.urls[0].resolve().unwrap();
        let feed = resolved.feed();
        assert!(feed.filter.is_none());
        assert!(feed.exclude_filter.is_none());

        let set = FilterSet {
            category_include: online.filter.as_ref(),
            category_exclude: online.exclude_filter.as_ref(),
            feed_include: feed.filter,
            feed_exclude: feed.exclude_filter,
        };
        assert!(set.check(Some("www.baidu.com")).is_none());
        assert!(set.check(None).is_none());
    }

    #[test]
    fn test_missing_file_field() {
        let spec = FeedSpec::Detailed(FeedDetails {
            url: Some("https://example.com/a.json".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            spec.resolve(),
            Err(ConfigError::MissingField { field: "file", .. })
        ));
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://x.com/a/b.json").unwrap(), "b.json");
        assert_eq!(file_name_from_url("https://x.com/a/feed").unwrap(), "feed.json");
        assert_eq!(file_name_from_url("https://x.com/").unwrap(), "index.json");
        assert_eq!(file_name_from_url("https://x.com").unwrap(), "index.json");
        assert_eq!(file_name_from_url("https://x.com/dir/").unwrap(), "dir.json");
        assert!(matches!(
            file_name_from_url("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
