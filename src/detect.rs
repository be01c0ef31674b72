//! Change detection between the listed inbox page and the cache.
//!
//! Deliberately a staleness heuristic, not a diff: only an id we have
//! never cached forces a re-scrape. Rows that disappeared, or rows whose
//! fields changed under an unchanged id, are not detected.

use std::collections::HashSet;

/// Decide whether the freshly listed page warrants a full re-scrape.
///
/// An empty cache always does. Otherwise the listed ids are scanned in
/// page order and the first unknown id short-circuits the scan.
pub fn refresh_needed(listed_ids: &[String], cached_ids: &HashSet<String>) -> bool {
    if cached_ids.is_empty() {
        tracing::debug!("Cache empty, every listed order is new");
        return true;
    }

    let new_id = listed_ids.iter().find(|id| !cached_ids.contains(*id));
    match new_id {
        Some(id) => {
            tracing::info!("New order listed: {id}");
            true
        }
        None => {
            tracing::debug!("No new orders listed, cache is current");
            false
        }
    }
}
