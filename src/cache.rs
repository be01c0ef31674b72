//! Bounded, ordered order cache.
//!
//! Holds the most recent scrape as ground truth: `refresh` is a full
//! replace (dedupe by external id, sort by reception date, trim to the
//! retained window), never an incremental patch. Callers only ever see
//! the first [`MAX_VISIBLE_ORDERS`] entries; the wider retained window
//! exists so change detection still recognizes ids that slid out of the
//! visible slice.
//!
//! The struct itself is not synchronized; the owning service wraps it in
//! a lock and is the only writer (refresh pipeline and explicit clear).

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::{MAX_VISIBLE_ORDERS, RETAINED_ORDERS};
use crate::models::Order;

/// Bounded "last N" view of scraped orders.
pub struct OrderCache {
    /// Sorted descending by reception date, missing dates last.
    orders: Vec<Order>,
    last_fetch: Option<DateTime<Utc>>,
}

impl OrderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            last_fetch: None,
        }
    }

    // ── Mutation (refresh pipeline + explicit clear only) ──

    /// Replace the entire contents with a freshly scraped batch.
    ///
    /// Orders without an external id are rejected; duplicate ids keep the
    /// last occurrence. The result is sorted by reception date descending
    /// (missing dates last) and trimmed to the retained window.
    pub fn refresh(&mut self, batch: Vec<Order>) {
        self.orders.clear();
        for order in batch {
            if order.external_id.is_empty() {
                tracing::warn!("Rejecting order without external id");
                continue;
            }
            // Last write wins on duplicate ids.
            if let Some(existing) = self
                .orders
                .iter_mut()
                .find(|cached| cached.external_id == order.external_id)
            {
                *existing = order;
            } else {
                self.orders.push(order);
            }
        }

        self.orders.sort_by(|a, b| match (&a.received_on, &b.received_on) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        self.orders.truncate(RETAINED_ORDERS);
        self.last_fetch = Some(Utc::now());
        tracing::info!("Cache refreshed with {} orders", self.orders.len());
    }

    /// Empty the cache and reset the fetch timestamp. Used on logout and
    /// explicit cache-reset requests.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.last_fetch = None;
    }

    // ── Reads ───────────────────────────────────────────────

    /// Independent copies of the visible slice (at most
    /// [`MAX_VISIBLE_ORDERS`]); later cache mutations are not observable
    /// through a returned vector.
    pub fn recent(&self) -> Vec<Order> {
        self.orders
            .iter()
            .take(MAX_VISIBLE_ORDERS)
            .cloned()
            .collect()
    }

    /// Linear lookup over the retained window.
    pub fn find(&self, external_id: &str) -> Option<Order> {
        self.orders
            .iter()
            .find(|order| order.external_id == external_id)
            .cloned()
    }

    /// Mutable lookup for field-level updates on a cached order (comment,
    /// prescription merge). Not a structural mutation; ordering and
    /// membership are unaffected.
    pub fn find_mut(&mut self, external_id: &str) -> Option<&mut Order> {
        self.orders
            .iter_mut()
            .find(|order| order.external_id == external_id)
    }

    /// Every retained external id, for change detection.
    pub fn external_ids(&self) -> HashSet<String> {
        self.orders
            .iter()
            .map(|order| order.external_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
