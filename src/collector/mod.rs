//! Collector — drives a browser session through the site's facet-filtered
//! listing UI and extracts raw candidate records.
//!
//! Protocol: authenticate → snapshot fast path or facet application →
//! snapshot persist → load-more pagination → element extraction. All DOM
//! waits are bounded; per-element failures are skipped, and the browser
//! session is released on every exit path.

pub mod facets;
pub mod snapshot;

use crate::browser::{wait_for_js, BrowserSession};
use crate::config::{CategoryFilter, Credentials, DataPaths, FilterConfig};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;
use snapshot::FilterSnapshot;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOGIN_URL: &str = "https://www.profellow.com/log-in/";
/// Login success is a URL-contains check against this fragment.
const LOGIN_REDIRECT_FRAGMENT: &str = "fellowship";

const EMAIL_FIELD_ID: &str = "wpforms-106652-field_1";
const PASSWORD_FIELD_ID: &str = "wpforms-106652-field_2";
const SUBMIT_BUTTON_ID: &str = "wpforms-submit-106652";

/// A raw candidate element pulled from the listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
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
}

/// Bounded-wait windows for the collector's DOM interactions.
#[derive(Debug, Clone)]
pub struct CollectorTimings {
    pub navigate_ms: u64,
    pub login_ms: u64,
    pub panel_ms: u64,
    pub load_more_ms: u64,
    pub scroll_settle_ms: u64,
    pub facet_open_settle_ms: u64,
}

impl Default for CollectorTimings {
    fn default() -> Self {
        Self {
            navigate_ms: 30_000,
            login_ms: 10_000,
            panel_ms: 10_000,
            load_more_ms: 2_000,
            scroll_settle_ms: 2_000,
            facet_open_settle_ms: 1_500,
        }
    }
}

/// Collector for one pipeline run.
pub struct Collector {
    config: FilterConfig,
    credentials: Credentials,
    snapshot_path: std::path::PathBuf,
    timings: CollectorTimings,
    /// Ignore any cached snapshot and re-drive the facet UI.
    fresh: bool,
}

impl Collector {
    pub fn new(config: FilterConfig, credentials: Credentials, paths: &DataPaths) -> Self {
        Self {
            config,
            credentials,
            snapshot_path: paths.snapshot_file(),
            timings: CollectorTimings::default(),
            fresh: false,
        }
    }

    pub fn with_timings(mut self, timings: CollectorTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Run the full collection protocol.
    ///
    /// The session is closed on every exit path — success, timeout, or any
    /// run-level error — before the result is returned.
    pub async fn run(&self, mut session: Box<dyn BrowserSession>) -> Result<Vec<Candidate>> {
        let result = self.drive(session.as_mut()).await;
        if let Err(e) = session.close().await {
            warn!("failed to release browser session: {e}");
        }
        result
    }

    async fn drive(&self, session: &mut dyn BrowserSession) -> Result<Vec<Candidate>> {
        self.login(session).await?;

        let cached = if self.fresh {
            None
        } else {
            FilterSnapshot::load(&self.snapshot_path)
                .filter(|s| s.matches(&self.config.categories))
        };

        match cached {
            Some(snapshot) => {
                info!("snapshot matches current categories, using cached listing URL");
                session
                    .navigate(&snapshot.listing_url, self.timings.navigate_ms)
                    .await
                    .context("failed to navigate to cached listing URL")?;
            }
            None => {
                info!("no reusable snapshot, applying facet filters");
                self.open_facet_panel(session).await?;
                self.apply_categories(session).await?;
                self.confirm_selection(session).await;
                self.persist_snapshot(session).await?;
            }
        }

        self.load_all_pages(session).await;
        self.extract(session).await
    }

    // ── Step 1: authenticate ──

    async fn login(&self, session: &mut dyn BrowserSession) -> Result<()> {
        session
            .navigate(LOGIN_URL, self.timings.navigate_ms)
            .await
            .context("failed to reach login page")?;

        wait_for_js(
            session,
            &format!("!!document.getElementById('{EMAIL_FIELD_ID}')"),
            self.timings.login_ms,
        )
        .await
        .context("login form did not appear")?;

        self.fill_field(session, EMAIL_FIELD_ID, &self.credentials.email)
            .await?;
        self.fill_field(session, PASSWORD_FIELD_ID, &self.credentials.password)
            .await?;

        // Human-like pause before submitting
        jitter(400, 1300).await;

        session
            .execute_js(&format!(
                "(() => {{ const b = document.getElementById('{SUBMIT_BUTTON_ID}'); if (!b) return false; b.click(); return true; }})()"
            ))
            .await
            .context("failed to click login button")?;

        // Success is signaled by a redirect whose URL contains the listing
        // fragment, within a bounded window.
        let deadline = std::time::Instant::now() + Duration::from_millis(self.timings.login_ms);
        loop {
            let url = session.current_url().await.unwrap_or_default();
            if url.contains(LOGIN_REDIRECT_FRAGMENT) {
                info!("login successful");
                jitter(1000, 2000).await;
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(PipelineError::AuthTimeout(self.timings.login_ms).into());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn fill_field(
        &self,
        session: &mut dyn BrowserSession,
        field_id: &str,
        value: &str,
    ) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.getElementById('{field_id}'); if (!el) return false; \
             el.value = {value}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); \
             return true; }})()",
            value = serde_json::to_string(value)?,
        );
        let ok = session.execute_js(&script).await?;
        if ok != serde_json::Value::Bool(true) {
            anyhow::bail!("login field '{field_id}' not found");
        }
        jitter(50, 200).await;
        Ok(())
    }

    // ── Steps 3-4: facet panel and category application ──

    async fn open_facet_panel(&self, session: &mut dyn BrowserSession) -> Result<()> {
        wait_for_js(
            session,
            "(() => { const b = document.querySelector('.filter-button'); if (!b) return false; b.click(); return true; })()",
            self.timings.panel_ms,
        )
        .await
        .context("filter button not clickable")?;

        wait_for_js(
            session,
            "document.querySelectorAll('.filter-block').length > 0",
            self.timings.panel_ms,
        )
        .await
        .context("no filter blocks appeared")?;

        Ok(())
    }

    async fn apply_categories(&self, session: &mut dyn BrowserSession) -> Result<()> {
        let block_count = session
            .execute_js("document.querySelectorAll('.filter-block').length")
            .await?
            .as_u64()
            .unwrap_or(0) as usize;
        info!(block_count, "found facet blocks");

        if self.config.categories.len() > block_count {
            warn!(
                configured = self.config.categories.len(),
                block_count, "more configured categories than facet blocks; tail is skipped"
            );
        }

        // Positional pairing: category order vs. DOM block order.
        for (index, category) in facets::pairing_plan(&self.config.categories, block_count) {
            if category.values.is_empty() {
                debug!(category = %category.name, "no values configured, skipping block");
                continue;
            }
            if let Err(e) = self.apply_category(session, index, &category).await {
                // Recovered per category; the run continues.
                let err = PipelineError::FacetInteraction(category.name.clone(), e.to_string());
                warn!("{err}");
            }
        }

        Ok(())
    }

    async fn apply_category(
        &self,
        session: &mut dyn BrowserSession,
        block_index: usize,
        category: &CategoryFilter,
    ) -> Result<()> {
        info!(block = block_index, category = %category.name, "processing facet block");

        // Open the block if its checkboxes are not already visible.
        let visible = session
            .execute_js(&format!(
                "document.querySelectorAll('.filter-block')[{block_index}]\
                 .querySelectorAll('.facetwp-checkbox').length > 0"
            ))
            .await?;
        if visible != serde_json::Value::Bool(true) {
            session
                .execute_js(&format!(
                    "(() => {{ const blk = document.querySelectorAll('.filter-block')[{block_index}]; \
                     if (!blk) return false; \
                     const t = blk.querySelector('.facetwp-toggle'); \
                     (t || blk).click(); return true; }})()"
                ))
                .await?;
            tokio::time::sleep(Duration::from_millis(self.timings.facet_open_settle_ms)).await;
        }

        // Stale-safe inner loop: re-fetch the checkbox list fresh each pass,
        // track progress by full label text, stop when a pass adds nothing.
        let mut handled: HashSet<String> = HashSet::new();
        loop {
            let labels = self.fetch_checkbox_labels(session, block_index).await?;
            if labels.is_empty() {
                break;
            }

            let mut clicked = false;
            for (checkbox_index, full_label) in labels.iter().enumerate() {
                if handled.contains(full_label) {
                    continue;
                }
                let normalized = facets::normalize_label(full_label);
                if !facets::is_target_value(category, &normalized) {
                    continue;
                }

                debug!(label = %normalized, "clicking facet checkbox");
                session
                    .execute_js(&format!(
                        "(() => {{ const cbs = document.querySelectorAll('.filter-block')[{block_index}]\
                         .querySelectorAll('.facetwp-checkbox'); \
                         if (!cbs[{checkbox_index}]) return false; \
                         cbs[{checkbox_index}].click(); return true; }})()"
                    ))
                    .await?;

                // Settle wait scaled by the listed result count, for the
                // async facet re-render.
                tokio::time::sleep(facets::settle_wait(full_label)).await;
                handled.insert(full_label.clone());
                clicked = true;
                break; // re-fetch the list fresh
            }

            if !clicked {
                break;
            }
        }

        Ok(())
    }

    async fn fetch_checkbox_labels(
        &self,
        session: &mut dyn BrowserSession,
        block_index: usize,
    ) -> Result<Vec<String>> {
        let value = session
            .execute_js(&format!(
                "(() => {{ const blk = document.querySelectorAll('.filter-block')[{block_index}]; \
                 if (!blk) return []; \
                 return Array.from(blk.querySelectorAll('.facetwp-checkbox'))\
                 .map(cb => cb.textContent.trim()); }})()"
            ))
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn confirm_selection(&self, session: &mut dyn BrowserSession) {
        let done = wait_for_js(
            session,
            "(() => { const b = Array.from(document.querySelectorAll('button')).find(b => b.textContent.includes('Done')); if (!b) return false; b.click(); return true; })()",
            self.timings.panel_ms,
        )
        .await;
        if done.is_err() {
            warn!("'Done' button not found or not clickable");
        }
    }

    // ── Step 5: persist snapshot ──

    async fn persist_snapshot(&self, session: &mut dyn BrowserSession) -> Result<()> {
        let listing_url = session.current_url().await?;
        let snapshot = FilterSnapshot {
            categories: self.config.categories.clone(),
            listing_url,
        };
        snapshot.save(&self.snapshot_path)?;
        info!("saved filter snapshot");
        Ok(())
    }

    // ── Step 6: pagination ──

    /// Click "load more" until the control disappears. Termination is the
    /// absence of a clickable control, not a fixed page count.
    async fn load_all_pages(&self, session: &mut dyn BrowserSession) {
        info!("loading all result pages");
        loop {
            let _ = session
                .execute_js("window.scrollTo(0, document.body.scrollHeight); true")
                .await;
            tokio::time::sleep(Duration::from_millis(self.timings.scroll_settle_ms)).await;

            // Bring the load-more control back into view
            let _ = session.execute_js("window.scrollBy(0, -750); true").await;
            tokio::time::sleep(Duration::from_millis(self.timings.scroll_settle_ms / 2)).await;

            let clicked = wait_for_js(
                session,
                "(() => { const b = document.querySelector('.facetwp-load-more'); \
                 if (!b || b.disabled) return false; b.click(); return true; })()",
                self.timings.load_more_ms,
            )
            .await;

            match clicked {
                Ok(_) => {
                    debug!("clicked load-more, waiting for content growth");
                    tokio::time::sleep(Duration::from_millis(self.timings.scroll_settle_ms)).await;
                }
                Err(_) => {
                    info!("no more load-more control, all results loaded");
                    break;
                }
            }
        }

        let _ = session.execute_js("window.scrollTo(0, 0); true").await;
    }

    // ── Step 7: extraction ──

    async fn extract(&self, session: &mut dyn BrowserSession) -> Result<Vec<Candidate>> {
        let value = session
            .execute_js(EXTRACTION_SCRIPT)
            .await
            .context("listing extraction failed")?;

        let (candidates, skipped) = parse_candidates(&value);
        info!(
            extracted = candidates.len(),
            skipped, "extracted listing elements"
        );
        Ok(candidates)
    }
}

/// Collect every listing element's fields in one in-page pass. Sub-field
/// lookups are independently tolerant of absence; a thrown error is
/// reported per element, never for the batch.
const EXTRACTION_SCRIPT: &str = r#"
Array.from(document.querySelectorAll('.fellowship')).map(el => {
  try {
    const header = el.querySelector('.fellowship-content__header');
    const a = header ? header.querySelector('a') : null;
    const h2 = header ? header.querySelector('h2') : null;
    const text = sel => { const n = el.querySelector(sel); return n ? n.textContent.trim() : null; };
    const p = el.querySelector('p');
    return {
      title: h2 ? h2.textContent.trim() : null,
      link: a ? a.href : null,
      location: text('.fellowship-meta--organization'),
      continent: text('.fellowship-meta--region'),
      deadline: text('.fellowship-meta--deadline'),
      description: p ? p.textContent.trim() : null
    };
  } catch (e) {
    return { error: String(e) };
  }
})
"#;

/// Decode the extraction result, skipping unreadable elements.
///
/// Returns the candidates plus the number of skipped elements. Title and
/// link are required per element; their absence is a per-element failure.
pub fn parse_candidates(value: &serde_json::Value) -> (Vec<Candidate>, usize) {
    let Some(items) = value.as_array() else {
        return (Vec::new(), 0);
    };

    let mut candidates = Vec::new();
    let mut skipped = 0usize;

    for item in items {
        if let Some(err) = item.get("error").and_then(|e| e.as_str()) {
            warn!(
                "{}",
                PipelineError::ElementExtraction(err.to_string())
            );
            skipped += 1;
            continue;
        }
        match serde_json::from_value::<Candidate>(item.clone()) {
            Ok(candidate) if !candidate.title.is_empty() && !candidate.link.is_empty() => {
                candidates.push(candidate);
            }
            Ok(_) | Err(_) => {
                warn!(
                    "{}",
                    PipelineError::ElementExtraction("missing title or link".to_string())
                );
                skipped += 1;
            }
        }
    }

    (candidates, skipped)
}

/// Sleep a random duration in the given millisecond range.
async fn jitter(min_ms: u64, max_ms: u64) {
    let wait = rand::thread_rng().gen_range(min_ms..=max_ms);
    tokio::time::sleep(Duration::from_millis(wait)).await;
}
