//! Processed store — durable table of enriched, user-interactable records.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// An enriched record. Identity is `link`; upserts are last-write-wins.
/// After creation only `favorited` and `show` are mutated, by positional
/// row identity within the loaded table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    pub link: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub subjects: Vec<String>,
    #[serde(default = "na_string")]
    pub total_compensation: String,
    #[serde(default)]
    pub other_funding: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub length_in_years: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_rating: f64,
    #[serde(default, deserialize_with = "lenient_flag_zero")]
    pub favorited: i64,
    #[serde(default = "one", deserialize_with = "lenient_flag_one")]
    pub show: i64,
    #[serde(default = "announced_no")]
    pub announced: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub links: Vec<String>,
}

fn na_string() -> String {
    "N/A".to_string()
}

fn announced_no() -> String {
    "no".to_string()
}

fn one() -> i64 {
    1
}

// Persisted data may carry malformed values from earlier runs; loads coerce
// rather than fail so downstream comparisons never see a wrong type.

fn lenient_f64<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(coerce_f64(&value).unwrap_or(0.0))
}

fn lenient_u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(coerce_f64(&value).map(|f| f.max(0.0) as u32).unwrap_or(0))
}

fn lenient_flag_zero<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(coerce_f64(&value).map(|f| f as i64).unwrap_or(0))
}

fn lenient_flag_one<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(coerce_f64(&value).map(|f| f as i64).unwrap_or(1))
}

fn lenient_string_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    match value {
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        // A bare comma-separated string is split, matching the old format
        serde_json::Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// The processed store handle: load-on-open, rewrite-on-mutate.
pub struct ProcessedStore {
    path: PathBuf,
    records: Vec<ProcessedRecord>,
}

impl ProcessedStore {
    /// Open the store, loading persisted records (empty if absent).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = super::read_table(&path)?;
        Ok(Self { path, records })
    }

    /// Whether a persisted table exists on disk.
    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }

    /// Insert or replace by `link` — last write wins.
    pub fn upsert(&mut self, record: ProcessedRecord) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.link == record.link) {
            *existing = record;
        } else {
            self.records.push(record);
        }
    }

    pub fn records(&self) -> &[ProcessedRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&ProcessedRecord> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ProcessedRecord> {
        self.records.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite the table in full.
    pub fn save(&self) -> Result<()> {
        super::write_table(&self.path, &self.records)
    }
}
