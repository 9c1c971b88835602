//! Pure helpers for facet-block interaction.

use crate::config::CategoryFilter;
use std::time::Duration;

/// Normalize a checkbox's visible label by stripping the trailing result
/// count and parentheses: `"Europe (123)"` → `"europe"`.
pub fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim_matches(|c| c == '(' || c == ')' || c == ' ' || c == '\n')
        .to_lowercase()
}

/// Settle wait after clicking a checkbox, derived from its listed result
/// count — larger count, longer facet re-render. No count → 1s.
pub fn settle_wait(raw_label: &str) -> Duration {
    let digits: String = raw_label.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(count) => Duration::from_millis(count * 10),
        Err(_) => Duration::from_secs(1),
    }
}

/// Pair configured categories with facet blocks by ordinal position.
///
/// Positional, not name-based: if the site reorders its facet blocks the
/// selections silently land on the wrong category. Site order has been
/// stable so far; callers log the block titles so a mismatch is visible.
pub fn pairing_plan(
    categories: &[CategoryFilter],
    block_count: usize,
) -> Vec<(usize, CategoryFilter)> {
    categories
        .iter()
        .take(block_count)
        .enumerate()
        .map(|(i, c)| (i, c.clone()))
        .collect()
}

/// Whether a normalized label is one of the category's configured values.
pub fn is_target_value(category: &CategoryFilter, normalized_label: &str) -> bool {
    category
        .values
        .iter()
        .any(|v| v.to_lowercase() == normalized_label)
}
