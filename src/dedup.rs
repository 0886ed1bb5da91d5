//! Domain-based deduplication state for one run.
//!
//! Two independent sets are tracked: one reset at the start of every category
//! and one that lives for the whole run. The first entry seen for a domain
//! wins in each scope. Entries without a domain are always admitted.

use std::collections::HashSet;

/// Outcome of offering one entry to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Keep the entry in the current category's output.
    pub category: bool,
    /// Keep the entry in the aggregate output.
    pub global: bool,
}

#[derive(Debug, Default)]
pub struct DedupTracker {
    category: HashSet<String>,
    global: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the current category's domains. The run-wide set is kept.
    pub fn begin_category(&mut self) {
        self.category.clear();
    }

    /// Record `domain` in both scopes and report where the entry may be kept.
    pub fn admit(&mut self, domain: Option<&str>) -> Admission {
        match domain {
            None => Admission {
                category: true,
                global: true,
            },
            Some(domain) => Admission {
                category: insert_new(&mut self.category, domain),
                global: insert_new(&mut self.global, domain),
            },
        }
    }

    /// Number of distinct domains seen across the run.
    pub fn global_len(&self) -> usize {
        self.global.len()
    }
}

fn insert_new(set: &mut HashSet<String>, domain: &str) -> bool {
    if set.contains(domain) {
        false
    } else {
        set.insert(domain.to_string())
    }
}
