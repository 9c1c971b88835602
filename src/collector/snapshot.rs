//! Cached filter snapshot — the last-applied category map and the listing
//! URL it produced.
//!
//! Reusable only if the category mapping is equivalent to the current
//! configuration: same names, same value set per name. Otherwise the
//! collector re-derives the URL by re-driving the facet UI.

use crate::config::CategoryFilter;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Persisted snapshot of a successful facet application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub categories: Vec<CategoryFilter>,
    pub listing_url: String,
}

impl FilterSnapshot {
    /// Load a snapshot if one exists and parses. A corrupt snapshot is
    /// treated as absent (the fast path is an optimization only).
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&raw) {
            Ok(snapshot) if !snapshot.listing_url.is_empty() => Some(snapshot),
            Ok(_) => None,
            Err(e) => {
                debug!("ignoring unreadable snapshot: {e}");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(self)?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }

    /// Equivalence rule: same category names, same value set per name.
    /// Value order within a category does not matter; a missing or extra
    /// category does.
    pub fn matches(&self, current: &[CategoryFilter]) -> bool {
        if self.categories.len() != current.len() {
            return false;
        }

        let mut cached_names: Vec<&str> =
            self.categories.iter().map(|c| c.name.as_str()).collect();
        let mut current_names: Vec<&str> = current.iter().map(|c| c.name.as_str()).collect();
        cached_names.sort_unstable();
        current_names.sort_unstable();
        if cached_names != current_names {
            return false;
        }

        for cat in current {
            let Some(cached) = self.categories.iter().find(|c| c.name == cat.name) else {
                return false;
            };
            let mut a: Vec<&str> = cached.values.iter().map(String::as_str).collect();
            let mut b: Vec<&str> = cat.values.iter().map(String::as_str).collect();
            a.sort_unstable();
            b.sort_unstable();
            if a != b {
                return false;
            }
        }

        true
    }
}
