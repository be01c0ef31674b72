//! MeditLink portal service: the refresh pipeline and its cache.
//!
//! [`DentalPlatform`] is the seam for "which dental portal"; MeditLink is
//! the one implementation today. A refresh cycle runs detect → scrape →
//! enrich → cache-replace, and every read operation degrades to the
//! cached view instead of failing while any cached data exists.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::cache::OrderCache;
use crate::config::{self, PortalConfig, RETAINED_ORDERS};
use crate::detect;
use crate::driver::{Driver, DriverFactory};
use crate::enrich;
use crate::models::{Order, PrescriptionUpdate};
use crate::session::{classify, LoginOutcome, PortalError, SessionManager};

// ═══════════════════════════════════════════════════════════
// Capability trait
// ═══════════════════════════════════════════════════════════

/// What every supported dental portal integration exposes.
#[async_trait]
pub trait DentalPlatform: Send + Sync {
    async fn login(&self) -> Result<LoginOutcome, PortalError>;

    /// Run the refresh pipeline and return the bounded recent view.
    /// Serves cached data on any failure; never errors.
    async fn fetch_orders(&self) -> Vec<Order>;

    async fn logout(&self);

    async fn is_logged_in(&self) -> bool;
}

/// Connection and cache snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PortalStatus {
    pub connected: bool,
    pub cache_size: usize,
    pub last_fetch: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════
// MeditLink
// ═══════════════════════════════════════════════════════════

/// MeditLink integration: one session, one cache.
pub struct MeditLink {
    session: SessionManager,
    cache: RwLock<OrderCache>,
}

impl MeditLink {
    pub fn new(factory: Arc<dyn DriverFactory>, config: PortalConfig) -> Self {
        Self {
            session: SessionManager::new(factory, config),
            cache: RwLock::new(OrderCache::new()),
        }
    }

    // ── Cache reads ─────────────────────────────────────────
    // Poisoned locks degrade to empty reads; data operations must not
    // hard-fail while any cached data exists.

    /// Up to the six most recent cached orders.
    pub fn recent_cached(&self) -> Vec<Order> {
        self.cache.read().map(|cache| cache.recent()).unwrap_or_default()
    }

    pub fn order_by_external_id(&self, external_id: &str) -> Option<Order> {
        self.cache.read().ok().and_then(|cache| cache.find(external_id))
    }

    pub fn cache_size(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.cache.read().ok().and_then(|cache| cache.last_fetch())
    }

    pub async fn status(&self) -> PortalStatus {
        PortalStatus {
            connected: self.session.is_logged_in().await,
            cache_size: self.cache_size(),
            last_fetch: self.last_fetch(),
        }
    }

    // ── Cache mutation ──────────────────────────────────────

    /// Explicit cache reset; the session stays up.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
        tracing::info!("Cache cleared");
    }

    /// Merge incoming prescription data into a cached order. Supplied
    /// fields overwrite, absent fields stay. Returns false when the id is
    /// not cached.
    pub fn apply_prescription_update(
        &self,
        external_id: &str,
        update: PrescriptionUpdate,
    ) -> bool {
        let Ok(mut cache) = self.cache.write() else {
            return false;
        };
        match cache.find_mut(external_id) {
            Some(order) => {
                order.apply_prescription_update(update);
                tracing::info!("Prescription data merged into {external_id}");
                true
            }
            None => false,
        }
    }

    // ── Download trigger ────────────────────────────────────

    /// Open the order's work page and start the 3D scan download.
    ///
    /// Only starts the transfer; completion is watched by the download
    /// folder poller, not here.
    pub async fn download_scan(&self, external_id: &str) -> bool {
        tracing::info!("Starting 3D scan download for {external_id}");
        if !self.session.ensure_connection().await {
            tracing::error!("Cannot connect for download");
            return false;
        }
        match self.trigger_download(external_id).await {
            Ok(()) => {
                tracing::info!("Download started for {external_id}");
                true
            }
            Err(err) => {
                tracing::error!("Download failed for {external_id}: {err}");
                self.session.handle_error(&err).await;
                false
            }
        }
    }

    async fn trigger_download(&self, external_id: &str) -> Result<(), PortalError> {
        let driver = self.current_driver().await?;
        let _nav = self.session.nav().await;

        driver
            .navigate(&self.session.config().workbox_url(external_id))
            .await
            .map_err(classify)?;
        driver
            .wait_for_url("/workbox/detail/", config::WAIT_MEDIUM)
            .await
            .map_err(classify)?;
        driver
            .click(config::DOWNLOAD_BUTTON_CSS, config::WAIT_MEDIUM)
            .await
            .map_err(classify)?;

        // Let Chrome start the transfer before anything navigates away.
        tokio::time::sleep(config::DOWNLOAD_GRACE).await;
        Ok(())
    }

    // ── Refresh pipeline ────────────────────────────────────

    async fn refresh_if_stale(&self) -> Result<(), PortalError> {
        let driver = self.current_driver().await?;

        let batch = {
            let _nav = self.session.nav().await;

            driver
                .navigate(&self.session.config().inbox_url())
                .await
                .map_err(classify)?;
            driver
                .wait_for_element(config::INBOX_ROW_CSS, config::WAIT_MEDIUM)
                .await
                .map_err(classify)?;
            let row_count = driver
                .count_elements(config::INBOX_ROW_CSS)
                .await
                .map_err(classify)?;
            tracing::info!("{row_count} rows listed in the inbox");

            let listed_ids = listed_ids(&driver, row_count).await;
            let cached_ids = self
                .cache
                .read()
                .map(|cache| cache.external_ids())
                .unwrap_or_default();
            if !detect::refresh_needed(&listed_ids, &cached_ids) {
                tracing::info!("Cache is current, skipping scrape");
                return Ok(());
            }

            tracing::info!("New orders detected, extracting");
            extract_rows(&driver, row_count).await
            // Listing navigation done; release the handle for the workers.
        };

        let mut batch = batch;
        enrich::fill_comments(&self.session, &mut batch).await;

        if let Ok(mut cache) = self.cache.write() {
            cache.refresh(batch);
        }
        Ok(())
    }

    async fn current_driver(&self) -> Result<Arc<dyn Driver>, PortalError> {
        self.session
            .driver()
            .await
            .ok_or_else(|| PortalError::Connectivity("no browser handle".to_string()))
    }
}

#[async_trait]
impl DentalPlatform for MeditLink {
    async fn login(&self) -> Result<LoginOutcome, PortalError> {
        self.session.login().await
    }

    async fn fetch_orders(&self) -> Vec<Order> {
        tracing::info!("Fetching latest orders");
        if !self.session.ensure_connection().await {
            tracing::warn!("Cannot connect, serving cached orders");
            return self.recent_cached();
        }

        if let Err(err) = self.refresh_if_stale().await {
            tracing::error!("Refresh failed, serving cached orders: {err}");
            self.session.handle_error(&err).await;
        }

        self.recent_cached()
    }

    async fn logout(&self) {
        self.session.logout().await;
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
        tracing::info!("Logged out, cache cleared");
    }

    async fn is_logged_in(&self) -> bool {
        self.session.is_logged_in().await
    }
}

// ═══════════════════════════════════════════════════════════
// Row extraction
// ═══════════════════════════════════════════════════════════

/// Selector for one cell of the listing table. Rows are 1-indexed.
fn row_cell_selector(row: usize, cell: usize) -> String {
    format!(
        "{}:nth-child({row}) td:nth-child({cell}) span",
        config::INBOX_ROW_CSS
    )
}

/// Text of one cell, empty when missing (missing cells are a per-row
/// extraction failure, handled by the caller).
async fn cell_text(driver: &Arc<dyn Driver>, row: usize, cell: usize) -> String {
    driver
        .element_text(&row_cell_selector(row, cell))
        .await
        .unwrap_or_default()
}

/// External ids in page order, for change detection. Unreadable rows are
/// skipped.
async fn listed_ids(driver: &Arc<dyn Driver>, row_count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(row_count);
    for row in 1..=row_count {
        let id = cell_text(driver, row, 7).await;
        if !id.is_empty() {
            ids.push(id);
        }
    }
    ids
}

/// Extract the listed orders, bounded to the retained window.
async fn extract_rows(driver: &Arc<dyn Driver>, row_count: usize) -> Vec<Order> {
    let limit = row_count.min(RETAINED_ORDERS);
    let mut orders = Vec::with_capacity(limit);
    for row in 1..=limit {
        match extract_row(driver, row).await {
            Some(order) => orders.push(order),
            None => tracing::debug!("Row {row} skipped"),
        }
    }
    tracing::info!("{} orders extracted", orders.len());
    orders
}

/// One listing row -> one order. Rows missing the patient reference or
/// the external id are rejected.
async fn extract_row(driver: &Arc<dyn Driver>, row: usize) -> Option<Order> {
    let patient_ref = cell_text(driver, row, 3).await;
    let external_id = cell_text(driver, row, 7).await;
    if patient_ref.is_empty() || external_id.is_empty() {
        tracing::debug!("Row {row} missing patient or id");
        return None;
    }

    let mut order = Order::new(external_id, patient_ref);
    let clinic = cell_text(driver, row, 6).await;
    if !clinic.is_empty() {
        order.clinic = Some(clinic);
    }

    let received_raw = cell_text(driver, row, 4).await;
    order.received_on = Some(
        parse_listing_date(&received_raw).unwrap_or_else(|| Utc::now().date_naive()),
    );
    order.due_on = parse_listing_date(&cell_text(driver, row, 5).await);

    Some(order)
}

fn parse_listing_date(raw: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(raw.trim(), config::LISTING_DATE_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_VISIBLE_ORDERS;
    use crate::driver::mock::{MockDriver, MockFactory};
    use std::path::PathBuf;

    fn test_config() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".to_string(),
            email: "lab@test".to_string(),
            password: "pw".to_string(),
            download_dir: PathBuf::from("/tmp/dl"),
            headless: true,
        }
    }

    fn script_login(driver: &MockDriver, config: &PortalConfig) {
        let login = config.login_url();
        driver.set_texts(&login, config::LOGIN_INPUT_CSS, &[""]);
        driver.set_texts(&login, config::PASSWORD_INPUT_CSS, &[""]);
        driver.set_texts(&login, config::LOGIN_BUTTON_CSS, &["Log in"]);
        driver.redirect_click(config::LOGIN_BUTTON_CSS, &config.inbox_url());
    }

    /// Rows are `(patient, received, id)`; the row index is 1-based.
    fn script_inbox(driver: &MockDriver, config: &PortalConfig, rows: &[(&str, &str, &str)]) {
        let inbox = config.inbox_url();
        let markers: Vec<&str> = rows.iter().map(|_| "").collect();
        driver.set_texts(&inbox, config::INBOX_ROW_CSS, &markers);
        for (index, (patient, received, id)) in rows.iter().enumerate() {
            let row = index + 1;
            if !patient.is_empty() {
                driver.set_texts(&inbox, &row_cell_selector(row, 3), &[patient]);
            }
            driver.set_texts(&inbox, &row_cell_selector(row, 4), &[received]);
            driver.set_texts(&inbox, &row_cell_selector(row, 6), &["Smile Space"]);
            if !id.is_empty() {
                driver.set_texts(&inbox, &row_cell_selector(row, 7), &[id]);
            }
            // Detail page for the enricher.
            let detail = config.detail_url(id);
            driver.set_texts(&detail, config::COMMENT_TEXTAREA_CSS, &[""]);
            driver.set_attr(
                &detail,
                config::COMMENT_TEXTAREA_CSS,
                "value",
                &format!("note for {id}"),
            );
        }
    }

    fn portal_with(driver: Arc<MockDriver>) -> MeditLink {
        let factory = MockFactory::new();
        factory.push(driver);
        MeditLink::new(factory, test_config())
    }

    fn eight_rows() -> Vec<(String, String, String)> {
        (1..=8)
            .map(|d| {
                (
                    format!("Patient {d}"),
                    format!("2024-03-{d:02} 10:00"),
                    format!("CM-{d}"),
                )
            })
            .collect()
    }

    fn as_refs(rows: &[(String, String, String)]) -> Vec<(&str, &str, &str)> {
        rows.iter()
            .map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_refresh_caps_sorts_and_enriches() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver);

        let orders = portal.fetch_orders().await;

        assert_eq!(orders.len(), MAX_VISIBLE_ORDERS);
        // Newest reception date first: CM-8 down to CM-3.
        let ids: Vec<_> = orders.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["CM-8", "CM-7", "CM-6", "CM-5", "CM-4", "CM-3"]);
        // All eight retained internally for diffing.
        assert_eq!(portal.cache_size(), 8);
        assert!(portal.order_by_external_id("CM-1").is_some());
        // Enriched before publication.
        assert_eq!(orders[0].comment.as_deref(), Some("note for CM-8"));
        assert!(portal.last_fetch().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_listing_skips_scrape_and_enrichment() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver.clone());

        let first = portal.fetch_orders().await;
        let detail_navs = driver.navigations_to("/inbox/detail/");
        assert_eq!(detail_navs, 8);

        let second = portal.fetch_orders().await;
        assert_eq!(
            driver.navigations_to("/inbox/detail/"),
            detail_navs,
            "no enrichment dispatched when the cache is current"
        );
        assert_eq!(
            first.iter().map(|o| &o.external_id).collect::<Vec<_>>(),
            second.iter().map(|o| &o.external_id).collect::<Vec<_>>(),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_listed_id_triggers_full_rescrape() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver.clone());

        portal.fetch_orders().await;
        let detail_navs = driver.navigations_to("/inbox/detail/");

        // A ninth order appears at the top of the inbox.
        let mut updated = vec![(
            "Patient 9".to_string(),
            "2024-03-09 10:00".to_string(),
            "CM-9".to_string(),
        )];
        updated.extend(rows);
        script_inbox(&driver, &config, &as_refs(&updated));

        let orders = portal.fetch_orders().await;
        assert!(driver.navigations_to("/inbox/detail/") > detail_navs);
        assert_eq!(orders[0].external_id, "CM-9");
        assert_eq!(portal.cache_size(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_rows_are_skipped() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        script_inbox(
            &driver,
            &config,
            &[
                ("Patient 1", "2024-03-01 10:00", "CM-1"),
                ("", "2024-03-02 10:00", "CM-2"),
                ("Patient 3", "2024-03-03 10:00", ""),
                ("Patient 4", "2024-03-04 10:00", "CM-4"),
            ],
        );
        let portal = portal_with(driver);

        let orders = portal.fetch_orders().await;
        let ids: Vec<_> = orders.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["CM-4", "CM-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_reception_date_defaults_to_today() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        script_inbox(&driver, &config, &[("Patient 1", "soon", "CM-1")]);
        let portal = portal_with(driver);

        let orders = portal.fetch_orders().await;
        assert_eq!(orders[0].received_on, Some(Utc::now().date_naive()));
        assert!(orders[0].due_on.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_serves_cache_when_connection_is_gone() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver.clone());

        let first = portal.fetch_orders().await;
        assert_eq!(first.len(), MAX_VISIBLE_ORDERS);

        // Browser dies and the factory has nothing left to vend.
        driver.kill();
        let cached = portal.fetch_orders().await;
        assert_eq!(cached.len(), MAX_VISIBLE_ORDERS, "cached view survives");
        assert_eq!(cached[0].external_id, "CM-8");
    }

    #[tokio::test(start_paused = true)]
    async fn logout_clears_session_and_cache() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver);

        portal.fetch_orders().await;
        assert!(portal.cache_size() > 0);

        portal.logout().await;
        let status = portal.status().await;
        assert!(!status.connected);
        assert_eq!(status.cache_size, 0);
        assert!(status.last_fetch.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn download_scan_clicks_and_reports_success() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let workbox = config.workbox_url("CM-1");
        driver.set_texts(&workbox, config::DOWNLOAD_BUTTON_CSS, &["Download"]);
        let portal = portal_with(driver.clone());
        assert!(portal.login().await.is_ok());

        assert!(portal.download_scan("CM-1").await);
        assert_eq!(driver.clicks().last().unwrap(), config::DOWNLOAD_BUTTON_CSS);
    }

    #[tokio::test(start_paused = true)]
    async fn download_scan_returns_false_when_button_missing() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        // Workbox page exists but has no download control.
        let portal = portal_with(driver);
        assert!(portal.login().await.is_ok());

        assert!(!portal.download_scan("CM-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn prescription_update_merges_into_cached_order() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let rows = eight_rows();
        script_inbox(&driver, &config, &as_refs(&rows));
        let portal = portal_with(driver);
        portal.fetch_orders().await;

        let applied = portal.apply_prescription_update(
            "CM-5",
            PrescriptionUpdate {
                phone: Some("+32 2 555 0110".to_string()),
                ..Default::default()
            },
        );
        assert!(applied);
        let order = portal.order_by_external_id("CM-5").unwrap();
        assert_eq!(order.phone.as_deref(), Some("+32 2 555 0110"));
        assert_eq!(order.patient_ref, "Patient 5", "other fields untouched");

        assert!(!portal.apply_prescription_update("CM-99", PrescriptionUpdate::default()));
    }

    #[test]
    fn listing_date_parsing() {
        assert_eq!(
            parse_listing_date("2024-03-18 09:41"),
            NaiveDate::from_ymd_opt(2024, 3, 18)
        );
        assert_eq!(parse_listing_date("2024-03-18"), None);
        assert_eq!(parse_listing_date(""), None);
    }
}
