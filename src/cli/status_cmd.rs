//! `status` — stage counts across both stores.

use crate::config::DataPaths;
use crate::query::pipeline_status;
use crate::store::{ProcessedStore, RawStore};
use anyhow::Result;

pub fn run(paths: &DataPaths, json: bool) -> Result<()> {
    let raw = RawStore::open(paths.raw_store_file())?;
    let processed = ProcessedStore::open(paths.processed_store_file())?;
    let report = pipeline_status(&raw, &processed);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "raw: {} total ({} pending, {} done, {} error)",
            report.raw_total, report.raw_pending, report.raw_done, report.raw_error
        );
        println!("processed: {} total", report.processed_total);
        if !report.data_available {
            println!("no enriched data available yet");
        }
    }
    Ok(())
}
