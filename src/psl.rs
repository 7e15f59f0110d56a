//! Public suffix lookup used to find the registrable domain of a name.
//!
//! The resolution engine only needs "given a hostname, which domain would an
//! owner have registered", so the list is kept as three plain rule sets
//! (normal, wildcard, exception) following the publicsuffix.org matching
//! algorithm.

use std::collections::HashSet;

use tracing::info;

/// Registrable-domain function consumed by authority and NS derivation
pub trait PublicSuffix: Send + Sync {
    /// The registrable domain (eTLD+1) of `host`, or `None` when `host` is
    /// itself a public suffix or empty.
    fn registrable_domain(&self, host: &str) -> Option<String>;
}

/// Public Suffix List backed by hash sets of rules
#[derive(Debug, Default, Clone)]
pub struct SuffixList {
    rules: HashSet<String>,
    /// Parents of `*.` rules, e.g. `ck` for `*.ck`
    wildcards: HashSet<String>,
    exceptions: HashSet<String>,
}

impl SuffixList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rules in publicsuffix.org format
    pub fn from_rules(content: &str) -> Self {
        let mut list = Self::new();
        let count = list.load_from_string(content);
        info!("Loaded {} public suffix rules", count);
        list
    }

    /// Load the suffixes bundled with the binary
    pub fn bundled() -> Self {
        Self::from_rules(include_str!("../assets/common_suffixes.txt"))
    }

    /// Add rules from `content`; returns how many were added
    pub fn load_from_string(&mut self, content: &str) -> usize {
        let mut count = 0;
        for line in content.lines() {
            // Rules end at the first whitespace
            let Some(rule) = line.split_whitespace().next() else {
                continue;
            };
            if rule.starts_with("//") {
                continue;
            }
            let rule = rule.to_ascii_lowercase();
            if let Some(exception) = rule.strip_prefix('!') {
                self.exceptions.insert(exception.to_string());
            } else if let Some(parent) = rule.strip_prefix("*.") {
                self.wildcards.insert(parent.to_string());
            } else {
                self.rules.insert(rule);
            }
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.rules.len() + self.wildcards.len() + self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of labels in the public suffix of `labels`
    fn suffix_len(&self, labels: &[&str]) -> usize {
        let n = labels.len();
        for i in 0..n {
            let candidate = labels[i..].join(".");
            // Exception rules cut one label off the matched name
            if self.exceptions.contains(&candidate) {
                return n - i - 1;
            }
            if self.rules.contains(&candidate) {
                return n - i;
            }
            if i + 1 < n && self.wildcards.contains(&labels[i + 1..].join(".")) {
                return n - i;
            }
        }
        // Implicit "*" rule: the last label is a public suffix
        1
    }
}

impl PublicSuffix for SuffixList {
    fn registrable_domain(&self, host: &str) -> Option<String> {
        let host = host.trim_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        let labels: Vec<&str> = host.split('.').collect();
        if labels.iter().any(|l| l.is_empty()) {
            return None;
        }

        let suffix_len = self.suffix_len(&labels);
        if labels.len() <= suffix_len {
            return None;
        }
        Some(labels[labels.len() - suffix_len - 1..].join("."))
    }
}
