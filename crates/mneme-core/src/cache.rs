//! Change detection per source URL: `url -> content hash`.
//! A page is re-embedded only when its hash differs from the stored one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the page text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Persisted as `webpage_cache.json`. Sorted keys keep the file diff-friendly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentCache {
    entries: BTreeMap<String, String>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `url` was already embedded with exactly this `hash`.
    pub fn is_unchanged(&self, url: &str, hash: &str) -> bool {
        self.entries.get(url).is_some_and(|h| h == hash)
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn record(&mut self, url: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(url.into(), hash.into());
    }

    /// Drops the hash for `url`, so its next add re-embeds.
    pub fn forget(&mut self, url: &str) -> Option<String> {
        self.entries.remove(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
