//! Service constants and runtime configuration.
//!
//! Fixed values (portal URLs, CSS selectors, cache bounds, timeouts) live
//! here as constants; anything deployment-specific (credentials, bind
//! address, download directory) comes from the environment via
//! [`PortalConfig::from_env`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Dentalink";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default `RUST_LOG` filter when the env var is unset.
pub fn default_log_filter() -> String {
    "dentalink=info,chromiumoxide=warn".to_string()
}

// ═══════════════════════════════════════════════════════════
// Portal constants
// ═══════════════════════════════════════════════════════════

/// MeditLink portal root.
pub const DEFAULT_BASE_URL: &str = "https://www.meditlink.com";

/// Listing date cells look like `2024-03-18 09:41`.
pub const LISTING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

// CSS selectors, as rendered by the portal's Vue frontend.
pub const LOGIN_INPUT_CSS: &str = "input#input-login-id.text-box-input";
pub const PASSWORD_INPUT_CSS: &str = "input#input-login-password.text-box-input";
pub const LOGIN_BUTTON_CSS: &str = "button#btn-login";
pub const POPUP_CLOSE_CSS: &str = "div.icon-wrapper.md-icon.xxs[rounded='false']";
pub const INBOX_ROW_CSS: &str = "tr.main-body-tr";
pub const COMMENT_TEXTAREA_CSS: &str =
    "textarea[data-v-8a2006a2][data-v-2adbe6cd-s].show-scrollbar[disabled]";
pub const DOWNLOAD_BUTTON_CSS: &str = "div.bg-button";

// ═══════════════════════════════════════════════════════════
// Bounds and timing
// ═══════════════════════════════════════════════════════════

/// How many orders callers ever see.
pub const MAX_VISIBLE_ORDERS: usize = 6;

/// Internal retention window; wider than the visible slice so change
/// detection still recognizes ids that dropped out of the top six.
pub const RETAINED_ORDERS: usize = MAX_VISIBLE_ORDERS * 2;

/// Comment-fetch worker pool size.
pub const ENRICH_WORKERS: usize = 3;

/// Short explicit wait (interstitial dismissal, session verification).
pub const WAIT_SHORT: Duration = Duration::from_secs(5);
/// Standard explicit wait (login redirect, listing table, detail pages).
pub const WAIT_MEDIUM: Duration = Duration::from_secs(10);
/// Upper bound on a single CDP request (page loads included).
pub const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);
/// Polling step for explicit element/URL waits.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Fixed pause before a reconnection attempt; gives a wedged browser a
/// moment to recover instead of hammering it.
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(1500);
/// Grace period after clicking a download control so Chrome can start
/// the transfer before we navigate away.
pub const DOWNLOAD_GRACE: Duration = Duration::from_secs(5);

/// Default REST bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8420";

// ═══════════════════════════════════════════════════════════
// PortalConfig
// ═══════════════════════════════════════════════════════════

/// Deployment-specific settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal root, without a trailing slash.
    pub base_url: String,
    /// Portal account email (`MEDITLINK_EMAIL`).
    pub email: String,
    /// Portal account password (`MEDITLINK_PASSWORD`).
    pub password: String,
    /// Where Chrome drops triggered downloads.
    pub download_dir: PathBuf,
    /// Run Chrome headless. `MEDITLINK_HEADLESS=false` for a visible window.
    pub headless: bool,
}

impl PortalConfig {
    /// Read configuration from the environment.
    ///
    /// Missing credentials are left empty rather than treated as a startup
    /// error; the login attempt will fail and report through the normal
    /// connectivity path.
    pub fn from_env() -> Self {
        let base_url = std::env::var("MEDITLINK_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: std::env::var("MEDITLINK_EMAIL").unwrap_or_default(),
            password: std::env::var("MEDITLINK_PASSWORD").unwrap_or_default(),
            download_dir: default_download_dir(),
            headless: std::env::var("MEDITLINK_HEADLESS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.base_url)
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.base_url)
    }

    pub fn inbox_url(&self) -> String {
        format!("{}/inbox", self.base_url)
    }

    /// Per-order detail page (comment textarea lives here).
    pub fn detail_url(&self, external_id: &str) -> String {
        format!("{}/inbox/detail/{}", self.base_url, external_id)
    }

    /// Per-order work page (download control lives here).
    pub fn workbox_url(&self, external_id: &str) -> String {
        format!("{}/workbox/detail/{}", self.base_url, external_id)
    }
}

/// REST bind address (`DENTALINK_BIND`), defaulting to localhost.
pub fn bind_addr() -> SocketAddr {
    std::env::var("DENTALINK_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().expect("default bind addr parses"))
}

/// The user's download directory, or `./downloads` when the platform
/// doesn't report one.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads"))
}
