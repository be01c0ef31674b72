//! Comment enrichment: the secondary per-order detail fetch.
//!
//! Each order in a scrape batch gets one visit to its detail page to read
//! the (disabled) comment textarea. Fetches are fanned out over a small
//! bounded pool; the collect is the synchronization barrier, so a batch
//! is only committed once every dispatched fetch has landed. A single
//! failed fetch keeps its fallback value and never aborts the batch.
//!
//! Workers share one browser handle, so each task serializes its
//! navigation sequence through the session's navigation lock; pool
//! concurrency is therefore bounded by handle contention, not fetch
//! throughput.

use futures_util::stream::{self, StreamExt};

use crate::config::{self, ENRICH_WORKERS};
use crate::models::Order;
use crate::session::{classify, PortalError, SessionManager};

/// Stand-in when an order has no comment or the fetch failed.
pub const COMMENT_FALLBACK: &str = "No comment";

/// Fetch and apply the comment for every order in the batch.
pub async fn fill_comments(session: &SessionManager, orders: &mut [Order]) {
    if orders.is_empty() {
        return;
    }
    tracing::info!("Fetching comments for {} orders", orders.len());

    let jobs: Vec<(usize, String)> = orders
        .iter()
        .enumerate()
        .map(|(index, order)| (index, order.external_id.clone()))
        .collect();

    let results: Vec<(usize, String)> = stream::iter(jobs)
        .map(|(index, external_id)| async move {
            let comment = fetch_comment(session, &external_id).await;
            tracing::debug!("Comment ready for {external_id}");
            (index, comment)
        })
        .buffer_unordered(ENRICH_WORKERS)
        .collect()
        .await;

    // Barrier passed: every order now carries a comment or the fallback.
    for (index, comment) in results {
        orders[index].comment = Some(comment);
    }
}

/// Never fails; empty and unretrievable comments become the fallback.
async fn fetch_comment(session: &SessionManager, external_id: &str) -> String {
    match try_fetch_comment(session, external_id).await {
        Ok(comment) if !comment.trim().is_empty() => comment.trim().to_string(),
        Ok(_) => COMMENT_FALLBACK.to_string(),
        Err(err) => {
            tracing::warn!("Comment fetch failed for {external_id}: {err}");
            COMMENT_FALLBACK.to_string()
        }
    }
}

async fn try_fetch_comment(
    session: &SessionManager,
    external_id: &str,
) -> Result<String, PortalError> {
    let driver = session
        .driver()
        .await
        .ok_or_else(|| PortalError::Connectivity("no browser handle".to_string()))?;

    // One worker on the shared handle at a time.
    let _nav = session.nav().await;

    let url = session.config().detail_url(external_id);
    driver.navigate(&url).await.map_err(classify)?;
    driver
        .wait_for_url("/inbox/detail/", config::WAIT_MEDIUM)
        .await
        .map_err(classify)?;
    driver
        .wait_for_element(config::COMMENT_TEXTAREA_CSS, config::WAIT_MEDIUM)
        .await
        .map_err(classify)?;

    // The live value property carries the comment; the text node is only
    // populated on server-rendered pages.
    let value = driver
        .element_attr(config::COMMENT_TEXTAREA_CSS, "value")
        .await
        .map_err(classify)?;
    match value {
        Some(comment) if !comment.trim().is_empty() => Ok(comment),
        _ => driver
            .element_text(config::COMMENT_TEXTAREA_CSS)
            .await
            .map_err(classify),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
