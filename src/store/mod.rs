//! Persistent stores for the pipeline.
//!
//! Both stores are flat tables keyed by `link`, read whole on open and
//! rewritten whole on every mutation. Single-writer access is assumed by
//! the surrounding operational model; no locking is provided here.

pub mod processed;
pub mod raw;

pub use processed::{ProcessedRecord, ProcessedStore};
pub use raw::{ProcessedTag, RawRecord, RawStore};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Read a JSON table file into records. Missing file → empty table.
pub(crate) fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read store {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse store {}", path.display()))
}

/// Rewrite a JSON table file in full.
pub(crate) fn write_table<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_vec_pretty(records).context("store serialization failed")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write store {}", path.display()))
}
