//! Include/exclude rules evaluated against entry domains.
//!
//! A rule is written in the config as a plain string. When the string has the
//! shape `/pattern/flags` (flags drawn from `g`, `i`, `m`) it is compiled as a
//! regular expression, otherwise it is a literal substring match:
//!
//! ```text
//! "baidu"              matches "www.baidu.com"
//! "/^baidu\.com$/i"    matches "BAIDU.COM" but not "www.baidu.com"
//! ```
//!
//! Rules are parsed once when the config is loaded. A regex that fails to
//! compile becomes [`FilterRule::Invalid`] and never matches. Patterns use the
//! `regex` crate syntax, not ECMAScript: lookaround such as `(?!ads)` and
//! backreferences are rejected.
//!
//! An empty rule string is the same as no rule.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, error};

static DELIMITED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(.*?)/([gim]*)$").expect("static pattern compiles"));

/// A parsed include or exclude rule.
#[derive(Debug, Clone)]
pub enum FilterRule {
    /// Substring containment.
    Literal(String),
    /// Compiled `/pattern/flags` rule. `source` keeps the config text for logs.
    Regex { source: String, regex: Regex },
    /// A `/pattern/flags` rule whose pattern did not compile.
    Invalid { source: String, reason: String },
}

impl FilterRule {
    /// Parse a rule from its config text.
    pub fn parse(raw: &str) -> Self {
        let Some(caps) = DELIMITED_PATTERN.captures(raw) else {
            return FilterRule::Literal(raw.to_string());
        };
        let body = caps.get(1).map_or("", |m| m.as_str());
        let flags = caps.get(2).map_or("", |m| m.as_str());

        let mut builder = RegexBuilder::new(body);
        builder
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'));

        match builder.build() {
            Ok(regex) => FilterRule::Regex {
                source: raw.to_string(),
                regex,
            },
            Err(e) => {
                error!(rule = %raw, error = %e, "Invalid regex filter; rule will never match");
                FilterRule::Invalid {
                    source: raw.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Test a value against this rule.
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            FilterRule::Literal(needle) => value.contains(needle.as_str()),
            FilterRule::Regex { regex, .. } => regex.is_match(value),
            FilterRule::Invalid { source, reason } => {
                debug!(rule = %source, %reason, "Skipping invalid regex filter");
                false
            }
        }
    }

    /// The rule as written in the config.
    pub fn as_str(&self) -> &str {
        match self {
            FilterRule::Literal(s) => s,
            FilterRule::Regex { source, .. } | FilterRule::Invalid { source, .. } => source,
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize an optional rule field, treating `""` like an absent rule.
///
/// Use with `#[serde(default, deserialize_with = "...")]`.
pub fn deserialize_rule<'de, D>(deserializer: D) -> Result<Option<FilterRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(|s| FilterRule::parse(&s)))
}

/// Evaluate an optional rule against an optional value.
///
/// An absent rule places no constraint. A present rule never matches an
/// absent value.
pub fn matches(value: Option<&str>, rule: Option<&FilterRule>) -> bool {
    match (rule, value) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(rule), Some(value)) => rule.is_match(value),
    }
}

/// Which of the four checks rejected an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    CategoryInclude,
    FeedInclude,
    CategoryExclude,
    FeedExclude,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::CategoryInclude => "category include filter",
            Rejection::FeedInclude => "feed include filter",
            Rejection::CategoryExclude => "category exclude filter",
            Rejection::FeedExclude => "feed exclude filter",
        };
        f.write_str(s)
    }
}

/// The include/exclude rules in force for one feed: the category's and the
/// feed's own, applied together.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterSet<'a> {
    pub category_include: Option<&'a FilterRule>,
    pub category_exclude: Option<&'a FilterRule>,
    pub feed_include: Option<&'a FilterRule>,
    pub feed_exclude: Option<&'a FilterRule>,
}

impl<'a> FilterSet<'a> {
    /// Run the four checks in order and return the first rejection with the
    /// rule responsible, or `None` when the domain passes all of them.
    pub fn check(&self, domain: Option<&str>) -> Option<(Rejection, &'a FilterRule)> {
        if let Some(rule) = self.category_include {
            if !matches(domain, Some(rule)) {
                return Some((Rejection::CategoryInclude, rule));
            }
        }
        if let Some(rule) = self.feed_include {
            if !matches(domain, Some(rule)) {
                return Some((Rejection::FeedInclude, rule));
            }
        }
        if let Some(rule) = self.category_exclude {
            if matches(domain, Some(rule)) {
                return Some((Rejection::CategoryExclude, rule));
            }
        }
        if let Some(rule) = self.feed_exclude {
            if matches(domain, Some(rule)) {
                return Some((Rejection::FeedExclude, rule));
            }
        }
        None
    }
}
