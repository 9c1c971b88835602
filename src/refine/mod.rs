//! Refinement stage — enrich pending raw records through an inference
//! backend, validate the replies, and upsert them into the processed store.
//!
//! Per-record failures never abort the run: fatal failures mark the record
//! `error`, exhausted rate limits defer it (left `pending` for the next
//! run), and both stores are saved after every record so an interrupted
//! run resumes from its checkpoint.

pub mod gemini;
pub mod search;
pub mod validate;

use crate::error::{classify_inference_error, PipelineError};
use crate::store::{ProcessedRecord, ProcessedStore, ProcessedTag, RawRecord, RawStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// A backend reply: the generated text plus any source links the backend
/// surfaced alongside it (empty for backends without grounding).
#[derive(Debug, Clone, Default)]
pub struct BackendReply {
    pub text: String,
    pub links: Vec<String>,
}

/// An inference backend that turns a prompt into structured enrichment text.
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<BackendReply>;
}

const SYSTEM_INSTRUCTIONS: &str = "\
You are a research assistant evaluating fellowship listings on behalf of \
an applicant. For the fellowship below, respond with a single JSON object \
containing exactly these fields:
  \"total_compensation\": total funding as a currency string, or \"N/A\";
  \"other_funding\": extra benefits (travel, housing) as a short string;
  \"subjects\": a list of subject-area strings;
  \"length_in_years\": the program length as a number;
  \"interest_rating\": 0-5 fit score against the applicant preferences;
  \"deadline\": the application deadline, \"YYYY-MM\" or a month name;
  \"description\": a one-paragraph factual summary.
Respond with the JSON object only.";

/// Render the per-record prompt. `bias` is the user's free-text rating
/// preference from the filter configuration, appended when non-empty.
pub fn build_prompt(record: &RawRecord, bias: &str) -> String {
    let mut prompt = format!(
        "{SYSTEM_INSTRUCTIONS}\n\n\
         Fellowship: {title}\n\
         Location: {location}\n\
         Deadline as listed: {deadline}\n\
         Link: {link}\n\
         Listing text: {description}",
        title = record.title,
        location = record.location.as_deref().unwrap_or("unknown"),
        deadline = record.deadline.as_deref().unwrap_or("not listed"),
        link = record.link,
        description = record.description.as_deref().unwrap_or(""),
    );
    if !bias.trim().is_empty() {
        prompt.push_str("\nApplicant preferences: ");
        prompt.push_str(bias.trim());
    }
    prompt
}

/// Decode a backend reply into a JSON object, tolerating a Markdown
/// ```json code fence anywhere in the reply — models often wrap the fence
/// in prose. `None` means the reply is not a JSON object in any accepted
/// shape.
pub fn parse_reply(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    let body = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + "```json".len()..];
        after.split("```").next().unwrap_or(after)
    } else if let Some(stripped) = trimmed.strip_prefix("```") {
        stripped.strip_suffix("```").unwrap_or(stripped)
    } else {
        trimmed
    };
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    value.is_object().then_some(value)
}

/// Minimum spacing between backend calls, keyed off the model name.
/// Flash-tier models allow ten requests a minute, pro-tier five.
pub struct RateLimiter {
    interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn for_model(model: &str) -> Self {
        let interval = if model.contains("flash") {
            Duration::from_secs(6)
        } else if model.contains("pro") {
            Duration::from_secs(12)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last_call: None,
        }
    }

    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Counts emitted by a refinement run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefineSummary {
    /// Records enriched and marked `done`.
    pub refined: usize,
    /// Records marked `error` (fatal failure or undecodable reply).
    pub errored: usize,
    /// Records left `pending` after retry exhaustion.
    pub deferred: usize,
}

enum CallOutcome {
    Reply(BackendReply),
    Deferred,
    Fatal(String),
}

/// Drives the refinement loop over a raw store's pending records.
pub struct Refiner {
    backend: Box<dyn EnrichmentBackend>,
    limiter: RateLimiter,
    bias: String,
    max_attempts: u32,
}

impl Refiner {
    pub fn new(backend: Box<dyn EnrichmentBackend>) -> Self {
        let limiter = RateLimiter::for_model(backend.model_name());
        Self {
            backend,
            limiter,
            bias: String::new(),
            max_attempts: 5,
        }
    }

    /// Attach the user's rating-preference text to every prompt.
    pub fn with_bias(mut self, bias: impl Into<String>) -> Self {
        self.bias = bias.into();
        self
    }

    /// Enrich every pending record, checkpointing both stores after each.
    pub async fn refine_pending(
        &mut self,
        raw: &mut RawStore,
        processed: &mut ProcessedStore,
    ) -> Result<RefineSummary> {
        let today = chrono::Local::now().date_naive();
        self.refine_pending_at(raw, processed, today).await
    }

    /// As [`refine_pending`](Self::refine_pending), with an injected date
    /// for deadline normalization.
    pub async fn refine_pending_at(
        &mut self,
        raw: &mut RawStore,
        processed: &mut ProcessedStore,
        today: NaiveDate,
    ) -> Result<RefineSummary> {
        let pending = raw.pending_indices();
        let mut summary = RefineSummary::default();
        if pending.is_empty() {
            info!("no pending records to refine");
            return Ok(summary);
        }

        info!(
            pending = pending.len(),
            model = self.backend.model_name(),
            "starting refinement"
        );
        let bar = ProgressBar::new(pending.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for index in pending {
            let Some(record) = raw.get(index).cloned() else {
                continue;
            };
            bar.set_message(record.title.clone());

            self.limiter.acquire().await;
            let prompt = build_prompt(&record, &self.bias);

            match self.call_with_retry(&prompt).await {
                CallOutcome::Reply(reply) => match parse_reply(&reply.text) {
                    Some(payload) => {
                        let enriched = merge(&record, &payload, &reply.links, today);
                        processed.upsert(enriched);
                        raw.set_processed(index, ProcessedTag::Done);
                        summary.refined += 1;
                    }
                    None => {
                        let err = PipelineError::SchemaParse(truncate(&reply.text, 200));
                        warn!(link = record.link, %err, "marking record as errored");
                        raw.set_processed(index, ProcessedTag::Error);
                        summary.errored += 1;
                    }
                },
                CallOutcome::Deferred => {
                    warn!(link = record.link, "retries exhausted, deferring record");
                    summary.deferred += 1;
                }
                CallOutcome::Fatal(message) => {
                    warn!(link = record.link, message, "marking record as errored");
                    raw.set_processed(index, ProcessedTag::Error);
                    summary.errored += 1;
                }
            }

            // Checkpoint after every record so an interrupt loses nothing.
            raw.save()?;
            processed.save()?;
            bar.inc(1);
        }

        bar.finish_and_clear();
        info!(
            refined = summary.refined,
            errored = summary.errored,
            deferred = summary.deferred,
            "refinement complete"
        );
        Ok(summary)
    }

    async fn call_with_retry(&self, prompt: &str) -> CallOutcome {
        for attempt in 0..self.max_attempts {
            match self.backend.generate(prompt).await {
                Ok(reply) => return CallOutcome::Reply(reply),
                Err(err) => {
                    let transient = match err.downcast_ref::<PipelineError>() {
                        Some(p) => p.is_transient(),
                        None => classify_inference_error(&err.to_string()).is_transient(),
                    };
                    if !transient {
                        return CallOutcome::Fatal(err.to_string());
                    }
                    if attempt + 1 < self.max_attempts {
                        let backoff = Duration::from_secs(1 << attempt);
                        warn!(
                            attempt = attempt + 1,
                            backoff_secs = backoff.as_secs(),
                            "rate limited, backing off"
                        );
                        sleep(backoff).await;
                    }
                }
            }
        }
        CallOutcome::Deferred
    }
}

/// Merge a validated enrichment payload with the scraped record. Scraped
/// identity fields win; enrichment fills the analytical fields, with the
/// scraped description kept when the backend did not rewrite it.
fn merge(
    record: &RawRecord,
    payload: &serde_json::Value,
    backend_links: &[String],
    today: NaiveDate,
) -> ProcessedRecord {
    let enrichment = validate::clean_and_validate(payload, today);

    let mut links: BTreeSet<String> = enrichment.links.into_iter().collect();
    links.extend(backend_links.iter().cloned());

    ProcessedRecord {
        title: record.title.clone(),
        location: record.location.clone(),
        continent: record.continent.clone(),
        deadline: Some(enrichment.deadline),
        link: record.link.clone(),
        description: enrichment.description.or_else(|| record.description.clone()),
        subjects: enrichment.subjects,
        total_compensation: enrichment.total_compensation,
        other_funding: enrichment.other_funding,
        length_in_years: enrichment.length_in_years,
        interest_rating: enrichment.interest_rating,
        favorited: enrichment.favorited,
        show: enrichment.show,
        announced: "no".to_string(),
        links: links.into_iter().collect(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// Backend that replays a scripted sequence of results.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<BackendReply>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<BackendReply>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn text(json: &str) -> Result<BackendReply> {
            Ok(BackendReply {
                text: json.to_string(),
                links: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl EnrichmentBackend for ScriptedBackend {
        fn model_name(&self) -> &str {
            // No built-in rate interval, so tests run without sleeps.
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<BackendReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| ScriptedBackend::text("{}"))
        }
    }

    fn pending_record(link: &str) -> RawRecord {
        RawRecord {
            title: "Robotics Fellowship".into(),
            location: Some("Zurich".into()),
            continent: Some("Europe".into()),
            deadline: Some("August".into()),
            link: link.into(),
            description: Some("A robotics research program.".into()),
            processed: ProcessedTag::Pending,
        }
    }

    fn stores(dir: &tempfile::TempDir) -> (RawStore, ProcessedStore) {
        let raw = RawStore::open(dir.path().join("raw.json")).unwrap();
        let processed = ProcessedStore::open(dir.path().join("processed.json")).unwrap();
        (raw, processed)
    }

    const GOOD_REPLY: &str = r#"{
        "total_compensation": "$75,000",
        "other_funding": "travel",
        "subjects": ["robotics"],
        "length_in_years": 3,
        "interest_rating": 4.5,
        "deadline": "2027-01",
        "description": "Rewritten."
    }"#;

    #[test]
    fn test_parse_reply_strips_fences() {
        let fenced = format!("```json\n{GOOD_REPLY}\n```");
        assert!(parse_reply(&fenced).is_some());
        assert!(parse_reply(GOOD_REPLY).is_some());
        assert!(parse_reply("not json at all").is_none());
        assert!(parse_reply("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_parse_reply_recovers_fence_inside_prose() {
        let chatty = format!(
            "Here is the requested enrichment:\n```json\n{GOOD_REPLY}\n```\nLet me know if you need anything else."
        );
        let payload = parse_reply(&chatty).unwrap();
        assert_eq!(payload["interest_rating"], serde_json::json!(4.5));
    }

    #[test]
    fn test_build_prompt_appends_bias() {
        let record = pending_record("https://a.example/1");
        let plain = build_prompt(&record, "");
        assert!(!plain.contains("Applicant preferences"));
        let biased = build_prompt(&record, "prefer fully funded programs");
        assert!(biased.contains("Applicant preferences: prefer fully funded programs"));
    }

    #[test]
    fn test_prompt_profile_comes_only_from_bias() {
        // The template itself names no field of study; the configured
        // bias text is the only profile source in the prompt.
        let record = RawRecord {
            title: "History Fellowship".into(),
            location: Some("Rome".into()),
            continent: Some("Europe".into()),
            deadline: None,
            link: "https://a.example/history".into(),
            description: Some("An archival research program.".into()),
            processed: ProcessedTag::Pending,
        };
        let prompt = build_prompt(&record, "I am a humanities student who prefers arts programs");
        assert!(!prompt.to_lowercase().contains("robotics"));
        assert!(prompt.contains("I am a humanities student who prefers arts programs"));
    }

    #[test]
    fn test_rate_limiter_intervals() {
        assert_eq!(
            RateLimiter::for_model("gemini-2.5-flash-lite").interval,
            Duration::from_secs(6)
        );
        assert_eq!(
            RateLimiter::for_model("gemini-2.5-pro").interval,
            Duration::from_secs(12)
        );
        assert_eq!(RateLimiter::for_model("scripted").interval, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_refine_marks_done_and_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        raw.append(pending_record("https://a.example/1"));

        let backend = ScriptedBackend::new(vec![ScriptedBackend::text(GOOD_REPLY)]);
        let mut refiner = Refiner::new(Box::new(backend));
        let summary = refiner
            .refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24))
            .await
            .unwrap();

        assert_eq!(summary.refined, 1);
        assert!(raw.pending_indices().is_empty());
        let rec = &processed.records()[0];
        assert_eq!(rec.total_compensation, "$75,000");
        assert_eq!(rec.deadline.as_deref(), Some("2027-01"));
        assert_eq!(rec.description.as_deref(), Some("Rewritten."));
        assert_eq!(rec.announced, "no");
    }

    #[tokio::test]
    async fn test_unparseable_reply_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        raw.append(pending_record("https://a.example/1"));

        let backend = ScriptedBackend::new(vec![ScriptedBackend::text("sorry, I cannot")]);
        let mut refiner = Refiner::new(Box::new(backend));
        let summary = refiner
            .refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24))
            .await
            .unwrap();

        assert_eq!(summary.errored, 1);
        assert_eq!(raw.get(0).unwrap().processed, ProcessedTag::Error);
        assert!(processed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        raw.append(pending_record("https://a.example/1"));

        let backend = ScriptedBackend::new(vec![
            Err(PipelineError::InferenceTransient("HTTP 429".into()).into()),
            ScriptedBackend::text(GOOD_REPLY),
        ]);
        let mut refiner = Refiner::new(Box::new(backend));
        let summary = tokio::time::timeout(
            Duration::from_secs(30),
            refiner.refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(summary.refined, 1);
        assert_eq!(raw.get(0).unwrap().processed, ProcessedTag::Done);
    }

    #[tokio::test]
    async fn test_fatal_failure_does_not_retry() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        raw.append(pending_record("https://a.example/1"));

        let backend = ScriptedBackend::new(vec![Err(PipelineError::InferenceFatal(
            "invalid API key".into(),
        )
        .into())]);
        let calls = backend.calls.clone();
        let mut refiner = Refiner::new(Box::new(backend));
        let summary = refiner
            .refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24))
            .await
            .unwrap();

        assert_eq!(summary.errored, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(raw.get(0).unwrap().processed, ProcessedTag::Error);
    }

    #[tokio::test]
    async fn test_done_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        let mut done = pending_record("https://a.example/done");
        done.processed = ProcessedTag::Done;
        raw.append(done);
        raw.append(pending_record("https://a.example/pending"));

        let backend = ScriptedBackend::new(vec![ScriptedBackend::text(GOOD_REPLY)]);
        let mut refiner = Refiner::new(Box::new(backend));
        let summary = refiner
            .refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24))
            .await
            .unwrap();

        assert_eq!(summary.refined, 1);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed.records()[0].link, "https://a.example/pending");
    }

    #[tokio::test]
    async fn test_backend_links_merged_into_record() {
        let dir = tempfile::tempdir().unwrap();
        let (mut raw, mut processed) = stores(&dir);
        raw.append(pending_record("https://a.example/1"));

        let backend = ScriptedBackend::new(vec![Ok(BackendReply {
            text: GOOD_REPLY.to_string(),
            links: vec!["https://source.example/page".into()],
        })]);
        let mut refiner = Refiner::new(Box::new(backend));
        refiner
            .refine_pending_at(&mut raw, &mut processed, day(2026, 8, 24))
            .await
            .unwrap();

        assert_eq!(
            processed.records()[0].links,
            vec!["https://source.example/page"]
        );
    }
}
