//! Intake — merge collector output into the raw store.
//!
//! Dedup is exact and order-independent on `link`, so re-running intake
//! with an unchanged candidate set adds nothing. The keyword gate runs
//! before any write: rejected candidates never enter the ledger.

use crate::collector::Candidate;
use crate::config::KeywordRule;
use crate::store::{ProcessedTag, RawRecord, RawStore};
use anyhow::Result;
use serde::Serialize;
use tracing::info;

/// Counts emitted by an intake run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeSummary {
    /// Records already in the store before this run.
    pub existing: usize,
    /// New records appended.
    pub added: usize,
    /// Candidates skipped because their link was already known.
    pub skipped_duplicate: usize,
    /// Candidates rejected by the keyword gate.
    pub skipped_keyword: usize,
}

/// Merge candidates into the raw store and persist it in full.
pub fn intake_candidates(
    store: &mut RawStore,
    candidates: &[Candidate],
    keywords: &KeywordRule,
) -> Result<IntakeSummary> {
    let mut summary = IntakeSummary {
        existing: store.len(),
        ..Default::default()
    };

    let mut known: std::collections::HashSet<String> =
        store.links().iter().map(|l| l.to_string()).collect();

    for candidate in candidates {
        if known.contains(&candidate.link) {
            summary.skipped_duplicate += 1;
            continue;
        }

        let haystack = format!(
            "{} {}",
            candidate.title,
            candidate.description.as_deref().unwrap_or("")
        );
        if !keywords.matches(&haystack) {
            summary.skipped_keyword += 1;
            continue;
        }

        known.insert(candidate.link.clone());
        store.append(RawRecord {
            title: candidate.title.clone(),
            location: candidate.location.clone(),
            continent: candidate.continent.clone(),
            deadline: candidate.deadline.clone(),
            link: candidate.link.clone(),
            description: candidate.description.clone(),
            processed: ProcessedTag::Pending,
        });
        summary.added += 1;
    }

    store.save()?;
    info!(
        existing = summary.existing,
        added = summary.added,
        skipped_duplicate = summary.skipped_duplicate,
        skipped_keyword = summary.skipped_keyword,
        "intake complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordMode;

    fn make_candidate(link: &str, title: &str, description: &str) -> Candidate {
        Candidate {
            title: title.into(),
            location: None,
            continent: None,
            deadline: None,
            link: link.into(),
            description: Some(description.into()),
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> RawStore {
        RawStore::open(dir.path().join("raw.json")).unwrap()
    }

    #[test]
    fn test_intake_appends_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);

        let candidates = vec![make_candidate("https://a.example/1", "Robotics PhD", "lab")];
        let summary =
            intake_candidates(&mut store, &candidates, &KeywordRule::default()).unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(store.pending_indices(), vec![0]);
    }

    #[test]
    fn test_intake_idempotent_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);

        let candidates = vec![
            make_candidate("https://a.example/1", "A", "x"),
            make_candidate("https://a.example/2", "B", "y"),
        ];
        intake_candidates(&mut store, &candidates, &KeywordRule::default()).unwrap();
        assert_eq!(store.len(), 2);

        // Re-run with the same set, in a different order
        let reordered = vec![candidates[1].clone(), candidates[0].clone()];
        let summary =
            intake_candidates(&mut store, &reordered, &KeywordRule::default()).unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.skipped_duplicate, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_keyword_gate_rejects_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);

        let rule = KeywordRule {
            mode: KeywordMode::And,
            words: vec!["robotics".into(), "funded".into()],
        };
        let candidates = vec![
            make_candidate("https://a.example/1", "Funded Robotics Fellowship", ""),
            make_candidate("https://a.example/2", "Arts Fellowship", "fully funded"),
        ];
        let summary = intake_candidates(&mut store, &candidates, &rule).unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped_keyword, 1);
        assert!(store.contains_link("https://a.example/1"));
        assert!(!store.contains_link("https://a.example/2"));
    }

    #[test]
    fn test_duplicate_within_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);

        let candidates = vec![
            make_candidate("https://a.example/1", "A", ""),
            make_candidate("https://a.example/1", "A again", ""),
        ];
        let summary =
            intake_candidates(&mut store, &candidates, &KeywordRule::default()).unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped_duplicate, 1);
    }
}
