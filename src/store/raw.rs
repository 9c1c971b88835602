//! Raw store — append-only ledger of scraped-but-not-yet-enriched records.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Processing checkpoint for a raw record.
///
/// `Pending` records are the refiner's work queue; `Done` and `Error`
/// records are never re-submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedTag {
    #[default]
    Pending,
    Done,
    Error,
}

/// A scraped candidate record. `link` is the invariant identity; records
/// are never deleted and only the `processed` tag is ever mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
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
    #[serde(default)]
    pub processed: ProcessedTag,
}

/// The raw store handle: load-on-open, rewrite-on-mutate.
pub struct RawStore {
    path: PathBuf,
    records: Vec<RawRecord>,
}

impl RawStore {
    /// Open the store, loading persisted records (empty if absent).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = super::read_table(&path)?;
        Ok(Self { path, records })
    }

    /// All known links.
    pub fn links(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.link.as_str()).collect()
    }

    pub fn contains_link(&self, link: &str) -> bool {
        self.records.iter().any(|r| r.link == link)
    }

    /// Append a new record. The caller is responsible for dedup by link.
    pub fn append(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    /// Indices of records still pending enrichment.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.processed == ProcessedTag::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&RawRecord> {
        self.records.get(index)
    }

    /// Transition a record's processing tag.
    pub fn set_processed(&mut self, index: usize, tag: ProcessedTag) {
        if let Some(record) = self.records.get_mut(index) {
            record.processed = tag;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Rewrite the ledger in full.
    pub fn save(&self) -> Result<()> {
        super::write_table(&self.path, &self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(link: &str) -> RawRecord {
        RawRecord {
            title: "Test Fellowship".into(),
            location: Some("Berlin".into()),
            continent: Some("Europe".into()),
            deadline: Some("August".into()),
            link: link.into(),
            description: Some("A test fellowship.".into()),
            processed: ProcessedTag::Pending,
        }
    }

    #[test]
    fn test_open_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path().join("raw.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_roundtrip_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");

        let mut store = RawStore::open(&path).unwrap();
        store.append(make_record("https://a.example/1"));
        store.append(make_record("https://a.example/2"));
        store.set_processed(0, ProcessedTag::Done);
        store.save().unwrap();

        let loaded = RawStore::open(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.pending_indices(), vec![1]);
        assert!(loaded.contains_link("https://a.example/1"));
        assert!(!loaded.contains_link("https://a.example/3"));
    }

    #[test]
    fn test_processed_tag_serialized_lowercase() {
        let record = make_record("https://a.example/1");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"processed\":\"pending\""));
    }
}
