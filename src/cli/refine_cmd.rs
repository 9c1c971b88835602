//! `refine` — enrich pending raw records through the configured backend.

use crate::config::{ApiKey, BackendKind, DataPaths, FilterConfig};
use crate::refine::gemini::GeminiBackend;
use crate::refine::search::SearchGroundedBackend;
use crate::refine::{EnrichmentBackend, Refiner};
use crate::store::{ProcessedStore, RawStore};
use anyhow::{Context, Result};

pub async fn run(
    paths: &DataPaths,
    backend_override: Option<BackendKind>,
    model_override: Option<String>,
    json: bool,
) -> Result<()> {
    let config = FilterConfig::load(&paths.filters_file()).unwrap_or_default();
    let api_key = ApiKey::load(&paths.api_key_file())
        .context("an API key is required for refinement")?;

    let backend_kind = backend_override.unwrap_or(config.backend);
    let model = model_override.unwrap_or_else(|| config.model.clone());
    let backend: Box<dyn EnrichmentBackend> = match backend_kind {
        BackendKind::Generative => Box::new(GeminiBackend::new(api_key.gemini_api_key, model)),
        BackendKind::Search => {
            Box::new(SearchGroundedBackend::new(api_key.gemini_api_key, model))
        }
    };

    let mut raw = RawStore::open(paths.raw_store_file())?;
    let mut processed = ProcessedStore::open(paths.processed_store_file())?;

    let mut refiner = Refiner::new(backend).with_bias(config.system_instructions);
    let summary = refiner.refine_pending(&mut raw, &mut processed).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "refined {}, errored {}, deferred {}",
            summary.refined, summary.errored, summary.deferred
        );
    }
    Ok(())
}
