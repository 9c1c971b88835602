//! `collect` — drive the browser, then intake candidates into the raw store.

use crate::browser::chromium::ChromiumSession;
use crate::collector::Collector;
use crate::config::{Credentials, DataPaths, FilterConfig};
use crate::intake::intake_candidates;
use crate::store::RawStore;
use anyhow::{Context, Result};
use tracing::info;

pub async fn run(paths: &DataPaths, fresh: bool, json: bool) -> Result<()> {
    let config = FilterConfig::load(&paths.filters_file())
        .context("filter configuration is required for collection")?;
    let credentials = Credentials::load(&paths.login_file())
        .context("login credentials are required for collection")?;

    let session = Box::new(ChromiumSession::launch().await?);
    let collector = Collector::new(config.clone(), credentials, paths).fresh(fresh);
    let candidates = collector.run(session).await?;
    info!(candidates = candidates.len(), "collection finished");

    let mut store = RawStore::open(paths.raw_store_file())?;
    let summary = intake_candidates(&mut store, &candidates, &config.keywords)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "collected {} candidates: {} added, {} duplicate, {} rejected by keywords ({} already stored)",
            candidates.len(),
            summary.added,
            summary.skipped_duplicate,
            summary.skipped_keyword,
            summary.existing,
        );
    }
    Ok(())
}
