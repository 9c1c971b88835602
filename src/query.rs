//! Query engine over the processed store — filter, sort, paginate, and
//! mutate the two user-facing flags (`favorited`, `show`).
//!
//! Hits carry their positional row id within the loaded table; that id is
//! the handle for flag updates, so sorting never changes a record's
//! identity between a query and the follow-up mutation.

use crate::store::{ProcessedRecord, ProcessedStore, ProcessedTag, RawStore};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// One query's filter, sort, and page parameters.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Minimum interest rating. Only gates when above 1.0, so the default
    /// rating of unrated records does not hide them.
    pub min_rating: f64,
    /// Stable-sort favorites ahead of the rest.
    pub favorites_first: bool,
    /// Include records whose `show` flag was cleared.
    pub show_removed: bool,
    /// Relevance keywords. When non-empty, only matching records are
    /// returned, ordered by match count; this ordering supersedes
    /// `favorites_first`.
    pub keywords: Vec<String>,
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            min_rating: 0.0,
            favorites_first: false,
            show_removed: false,
            keywords: Vec::new(),
            page: 1,
            per_page: 20,
        }
    }
}

/// A matching record plus its positional row id.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: usize,
    pub record: ProcessedRecord,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub hits: Vec<QueryHit>,
    pub total_matches: usize,
    pub page: usize,
    pub per_page: usize,
    pub has_more: bool,
}

/// Pipeline stage counts for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub raw_total: usize,
    pub raw_pending: usize,
    pub raw_done: usize,
    pub raw_error: usize,
    pub processed_total: usize,
    pub data_available: bool,
}

/// Aggregate stage counts across both stores.
pub fn pipeline_status(raw: &RawStore, processed: &ProcessedStore) -> StatusReport {
    let mut report = StatusReport {
        raw_total: raw.len(),
        raw_pending: 0,
        raw_done: 0,
        raw_error: 0,
        processed_total: processed.len(),
        data_available: processed.file_exists() && !processed.is_empty(),
    };
    for record in raw.records() {
        match record.processed {
            ProcessedTag::Pending => report.raw_pending += 1,
            ProcessedTag::Done => report.raw_done += 1,
            ProcessedTag::Error => report.raw_error += 1,
        }
    }
    report
}

/// Read/mutate handle over the processed table.
pub struct QueryEngine {
    store: ProcessedStore,
    path: PathBuf,
}

impl QueryEngine {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = ProcessedStore::open(&path)?;
        Ok(Self { store, path })
    }

    /// Whether there is any enriched data to query.
    pub fn data_available(&self) -> bool {
        self.store.file_exists() && !self.store.is_empty()
    }

    /// Re-read the table from disk when the engine is empty but the file
    /// has content, e.g. after a refine run in another process.
    pub fn refresh_if_needed(&mut self) -> Result<()> {
        if self.store.is_empty() && self.path.exists() {
            debug!("reloading processed table from disk");
            self.store = ProcessedStore::open(&self.path)?;
        }
        Ok(())
    }

    /// Run a filtered, sorted, paginated query.
    pub fn query(&self, options: &QueryOptions) -> QueryPage {
        let mut hits: Vec<(usize, &ProcessedRecord, usize)> = self
            .store
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| options.show_removed || r.show != 0)
            .filter(|(_, r)| options.min_rating <= 1.0 || r.interest_rating >= options.min_rating)
            .map(|(id, r)| (id, r, keyword_matches(r, &options.keywords)))
            .collect();

        if !options.keywords.is_empty() {
            hits.retain(|(_, _, matches)| *matches > 0);
            // Stable: equal match counts keep table order
            hits.sort_by(|a, b| b.2.cmp(&a.2));
        } else if options.favorites_first {
            hits.sort_by(|a, b| b.1.favorited.cmp(&a.1.favorited));
        }

        let total_matches = hits.len();
        let page = options.page.max(1);
        let per_page = options.per_page.max(1);
        let start = (page - 1).saturating_mul(per_page);
        let page_hits: Vec<QueryHit> = hits
            .into_iter()
            .skip(start)
            .take(per_page)
            .map(|(id, record, _)| QueryHit {
                id,
                record: record.clone(),
            })
            .collect();

        QueryPage {
            has_more: start + page_hits.len() < total_matches,
            hits: page_hits,
            total_matches,
            page,
            per_page,
        }
    }

    /// Set the `favorited` flag by row id. Returns false for an unknown id.
    pub fn set_favorited(&mut self, id: usize, value: bool) -> Result<bool> {
        self.update(id, |r| r.favorited = value as i64)
    }

    /// Set the `show` flag by row id. Returns false for an unknown id.
    pub fn set_show(&mut self, id: usize, value: bool) -> Result<bool> {
        self.update(id, |r| r.show = value as i64)
    }

    fn update(&mut self, id: usize, apply: impl FnOnce(&mut ProcessedRecord)) -> Result<bool> {
        match self.store.get_mut(id) {
            Some(record) => {
                apply(record);
                self.store.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn record(&self, id: usize) -> Option<&ProcessedRecord> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Count how many keywords appear in the record's searchable text.
fn keyword_matches(record: &ProcessedRecord, keywords: &[String]) -> usize {
    if keywords.is_empty() {
        return 0;
    }
    let haystack = format!(
        "{} {} {}",
        record.title,
        record.description.as_deref().unwrap_or(""),
        record.subjects.join(" ")
    )
    .to_lowercase();
    keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count()
}
