//! `query` — print a filtered page of enriched records.

use crate::config::DataPaths;
use crate::query::{QueryEngine, QueryOptions};
use anyhow::Result;

pub fn run(paths: &DataPaths, options: &QueryOptions, json: bool) -> Result<()> {
    let engine = QueryEngine::open(paths.processed_store_file())?;
    if !engine.data_available() {
        println!("no enriched data yet — run `fellowscout refine` first");
        return Ok(());
    }

    let page = engine.query(options);
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for hit in &page.hits {
        let r = &hit.record;
        println!(
            "[{id:>4}] {rating:>3} {fav} {title}",
            id = hit.id,
            rating = r.interest_rating,
            fav = if r.favorited != 0 { "*" } else { " " },
            title = r.title,
        );
        println!(
            "       {} | {} | {}",
            r.deadline.as_deref().unwrap_or("NA"),
            r.total_compensation,
            r.link
        );
    }
    println!(
        "page {}/{} — {} matching record(s){}",
        page.page,
        page.total_matches.div_ceil(page.per_page).max(1),
        page.total_matches,
        if page.has_more { ", more available" } else { "" }
    );
    Ok(())
}
