//! Portal session state machine.
//!
//! `Disconnected → Connecting → Connected`, falling back to
//! `Disconnected` on login or verification failure. The manager is the
//! only component that creates or destroys the browser handle; every
//! scraping phase borrows the handle and serializes its navigation
//! sequences through [`SessionManager::nav`].
//!
//! Recovery policy: a fixed backoff, a fresh handle, one login attempt,
//! then a verification probe as the authoritative signal. Callers that
//! fail to reconnect serve cached data instead of erroring.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::config::{self, PortalConfig};
use crate::driver::{Driver, DriverError, DriverFactory};

/// Browser-level error fragments that mean the handle itself is unusable
/// and must be discarded before any retry.
const FATAL_MARKERS: [&str; 5] = [
    "invalid session id",
    "no such session",
    "browser has closed",
    "disconnected",
    "not reachable",
];

// ═══════════════════════════════════════════════════════════
// Error taxonomy
// ═══════════════════════════════════════════════════════════

/// Failure classes of the scraping core.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// Login/verification failed or the session was invalidated;
    /// recoverable through the reconnect cycle.
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// An expected field or row was missing; the row is skipped or a
    /// default substituted, never propagated to callers.
    #[error("Extraction failure: {0}")]
    Extraction(String),

    /// The browser handle is gone; it must be torn down before retrying.
    #[error("Fatal browser failure: {0}")]
    Fatal(String),
}

/// Sort a driver error into the portal taxonomy.
pub fn classify(err: DriverError) -> PortalError {
    let message = err.to_string();
    if FATAL_MARKERS.iter().any(|marker| message.contains(marker)) {
        PortalError::Fatal(message)
    } else {
        PortalError::Connectivity(message)
    }
}

// ═══════════════════════════════════════════════════════════
// States and outcomes
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Successful results of [`SessionManager::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Live session verified; no login navigation performed.
    AlreadyConnected,
    LoggedIn,
}

impl LoginOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyConnected => "Already connected.",
            Self::LoggedIn => "Login successful.",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// SessionManager
// ═══════════════════════════════════════════════════════════

struct SessionInner {
    state: SessionState,
    driver: Option<Arc<dyn Driver>>,
}

/// Owns the portal session and its browser handle.
pub struct SessionManager {
    factory: Arc<dyn DriverFactory>,
    config: PortalConfig,
    inner: Mutex<SessionInner>,
    /// Serializes multi-step navigation sequences on the shared handle.
    /// Enrichment workers submit tasks concurrently but each acquires
    /// this lock, so effective browser concurrency is one.
    nav: Mutex<()>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn DriverFactory>, config: PortalConfig) -> Self {
        Self {
            factory,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                driver: None,
            }),
            nav: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Connected flag plus a live handle. Cheap; no navigation.
    pub async fn is_logged_in(&self) -> bool {
        let driver = {
            let inner = self.inner.lock().await;
            if inner.state != SessionState::Connected {
                return false;
            }
            inner.driver.clone()
        };
        match driver {
            Some(driver) => driver.is_alive().await,
            None => false,
        }
    }

    /// Current handle, if any. Does not launch.
    pub async fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.inner.lock().await.driver.clone()
    }

    /// Exclusive navigation token for the shared handle.
    pub async fn nav(&self) -> MutexGuard<'_, ()> {
        self.nav.lock().await
    }

    // ── State machine transitions ───────────────────────────

    /// Log in to the portal.
    ///
    /// Fast path: already `Connected` and the session verifies — returns
    /// [`LoginOutcome::AlreadyConnected`] without touching the login page.
    /// Otherwise runs the credential flow and transitions to `Connected`,
    /// or to `Disconnected` on any failure.
    pub async fn login(&self) -> Result<LoginOutcome, PortalError> {
        tracing::info!("Portal login starting");
        let _nav = self.nav.lock().await;

        let driver = match self.acquire_driver().await {
            Ok(driver) => driver,
            Err(err) => {
                let err = classify(err);
                self.handle_error(&err).await;
                return Err(err);
            }
        };

        if self.state().await == SessionState::Connected && self.verify_with(&driver).await {
            tracing::info!("Already connected, verification passed");
            return Ok(LoginOutcome::AlreadyConnected);
        }

        self.set_state(SessionState::Connecting).await;
        match self.run_login_flow(&driver).await {
            Ok(()) => {
                self.set_state(SessionState::Connected).await;
                tracing::info!("Login successful");
                Ok(LoginOutcome::LoggedIn)
            }
            Err(err) => {
                let err = classify(err);
                self.handle_error(&err).await;
                Err(err)
            }
        }
    }

    /// Lightweight probe: open a protected page and wait for its URL.
    pub async fn verify_logged_in(&self) -> bool {
        let Some(driver) = self.driver().await else {
            tracing::debug!("No browser handle to verify");
            return false;
        };
        let _nav = self.nav.lock().await;
        self.verify_with(&driver).await
    }

    /// Resilience entry point used by every scraping operation.
    ///
    /// Verified-connected sessions pass straight through. Anything else:
    /// fixed backoff, fresh handle, login, then a final verification as
    /// the authoritative answer. `false` means callers should serve
    /// cached data.
    pub async fn ensure_connection(&self) -> bool {
        if self.state().await == SessionState::Connected {
            if self.verify_logged_in().await {
                return true;
            }
            tracing::warn!("Session expired, reconnecting");
            self.set_state(SessionState::Disconnected).await;
        }

        // Give a possibly-recovering browser a moment before recycling it.
        tokio::time::sleep(config::RECONNECT_BACKOFF).await;
        self.teardown_handle().await;

        match self.login().await {
            Ok(_) => {}
            Err(err) => {
                tracing::error!("Reconnection failed: {err}");
                return false;
            }
        }

        self.verify_logged_in().await
    }

    /// Record a browser error against the session: the connected flag is
    /// always cleared; fatal errors additionally recycle the handle.
    pub async fn handle_error(&self, error: &PortalError) {
        tracing::error!("Browser error: {error}");
        self.set_state(SessionState::Disconnected).await;
        if matches!(error, PortalError::Fatal(_)) {
            tracing::warn!("Recycling browser handle after fatal error");
            self.teardown_handle().await;
        }
    }

    /// Tear down the session: close the handle, reset the flag.
    pub async fn logout(&self) {
        tracing::info!("Logging out");
        self.teardown_handle().await;
    }

    // ── Internal ────────────────────────────────────────────

    /// Reuse the live handle or launch a fresh one.
    async fn acquire_driver(&self) -> Result<Arc<dyn Driver>, DriverError> {
        let existing = {
            let inner = self.inner.lock().await;
            inner.driver.clone()
        };
        if let Some(driver) = existing {
            if driver.is_alive().await {
                tracing::debug!("Reusing existing browser handle");
                return Ok(driver);
            }
            driver.close().await;
        }

        tracing::info!("Launching browser");
        let driver = self.factory.launch().await?;
        let mut inner = self.inner.lock().await;
        inner.driver = Some(driver.clone());
        Ok(driver)
    }

    /// Credential flow. The interstitial after first login is optional;
    /// not finding it is normal.
    async fn run_login_flow(&self, driver: &Arc<dyn Driver>) -> Result<(), DriverError> {
        driver.navigate(&self.config.login_url()).await?;
        tracing::info!("Login page loaded");

        driver
            .fill(config::LOGIN_INPUT_CSS, &self.config.email, config::WAIT_MEDIUM)
            .await?;
        driver
            .fill(
                config::PASSWORD_INPUT_CSS,
                &self.config.password,
                config::WAIT_MEDIUM,
            )
            .await?;
        driver
            .click(config::LOGIN_BUTTON_CSS, config::WAIT_MEDIUM)
            .await?;
        driver.wait_for_url("inbox", config::WAIT_MEDIUM).await?;
        tracing::info!("Redirected to inbox");

        if driver
            .click(config::POPUP_CLOSE_CSS, config::WAIT_SHORT)
            .await
            .is_ok()
        {
            tracing::info!("Interstitial dismissed");
        } else {
            tracing::debug!("No interstitial shown");
        }

        Ok(())
    }

    async fn verify_with(&self, driver: &Arc<dyn Driver>) -> bool {
        if driver.navigate(&self.config.dashboard_url()).await.is_err() {
            tracing::debug!("Verification navigation failed");
            return false;
        }
        match driver.wait_for_url("dashboard", config::WAIT_SHORT).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!("Verification failed: {err}");
                false
            }
        }
    }

    async fn set_state(&self, state: SessionState) {
        self.inner.lock().await.state = state;
    }

    async fn teardown_handle(&self) {
        let driver = {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Disconnected;
            inner.driver.take()
        };
        if let Some(driver) = driver {
            driver.close().await;
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
