//! Browser automation capability seam.
//!
//! The scraping core only ever needs four things from a browser: navigate,
//! wait for a condition (element present, URL fragment) with a timeout,
//! read an element's text or attribute, and perform a UI action (click,
//! fill). [`Driver`] captures exactly that surface; [`DriverFactory`]
//! launches handles. Production uses the CDP implementation in
//! [`cdp`](crate::driver::cdp); tests script a [`mock`] driver.
//!
//! The session state machine is the only component allowed to create or
//! destroy a handle — everyone else borrows it through the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod cdp;

/// Errors from browser automation operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Browser launch error: {0}")]
    Launch(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// One live automated browser window.
///
/// All methods take `&self`; callers that need exclusive use of the
/// page (every multi-step navigation sequence does) serialize through the
/// session's navigation lock rather than through the driver itself.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load a URL and wait for the navigation to commit.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// The page's current URL.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Wait until the current URL contains `fragment`.
    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until at least one element matches `selector`.
    async fn wait_for_element(&self, selector: &str, timeout: Duration)
        -> Result<(), DriverError>;

    /// Trimmed text content of the first element matching `selector`.
    async fn element_text(&self, selector: &str) -> Result<String, DriverError>;

    /// Property (preferred) or attribute value of the first match.
    async fn element_attr(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Number of elements matching `selector`.
    async fn count_elements(&self, selector: &str) -> Result<usize, DriverError>;

    /// Wait for `selector` then click it.
    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait for `selector` then replace its value with `text`.
    async fn fill(&self, selector: &str, text: &str, timeout: Duration)
        -> Result<(), DriverError>;

    /// Cheap liveness probe; false once the browser process is gone.
    async fn is_alive(&self) -> bool;

    /// Tear the browser down. Idempotent, never fails.
    async fn close(&self);
}

/// Launches [`Driver`] handles.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Driver>, DriverError>;
}

// ═══════════════════════════════════════════════════════════
// Scripted mock (shared by session/enrich/portal/api tests)
// ═══════════════════════════════════════════════════════════
