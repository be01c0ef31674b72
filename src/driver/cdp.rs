//! Chrome DevTools Protocol implementation of [`Driver`].
//!
//! DOM access goes through `Runtime.evaluate` rather than element handles:
//! reads return JSON values, clicks run `el.click()` in page context (the
//! portal's buttons sit behind overlay divs that swallow synthetic mouse
//! events), and fills set the value then dispatch `input`/`change` so the
//! Vue frontend notices. Explicit waits poll at a fixed interval up to the
//! caller's timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::config::{self, PortalConfig};
use crate::driver::{Driver, DriverError, DriverFactory};

/// Quote a string as a JS string literal (JSON is a JS subset, so this
/// handles quotes in CSS attribute selectors).
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

// ═══════════════════════════════════════════════════════════
// CdpFactory
// ═══════════════════════════════════════════════════════════

/// Launches headless Chrome windows configured for the portal.
pub struct CdpFactory {
    config: PortalConfig,
}

impl CdpFactory {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for CdpFactory {
    async fn launch(&self) -> Result<Arc<dyn Driver>, DriverError> {
        std::fs::create_dir_all(&self.config.download_dir)
            .map_err(|e| DriverError::Launch(format!("download dir: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .no_sandbox()
            .args(vec![
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--disable-extensions",
                "--disable-popup-blocking",
                "--disable-background-timer-throttling",
            ])
            .request_timeout(config::PAGE_LOAD_TIMEOUT);
        if !self.config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The handler stream must be pumped for the whole browser lifetime.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // Route triggered downloads into the configured directory.
        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(self.config.download_dir.display().to_string())
            .build()
            .map_err(DriverError::Launch)?;
        page.execute(download_params)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        tracing::info!("Browser ready, downloads -> {}", self.config.download_dir.display());

        Ok(Arc::new(CdpDriver {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler_task,
        }))
    }
}

// ═══════════════════════════════════════════════════════════
// CdpDriver
// ═══════════════════════════════════════════════════════════

pub struct CdpDriver {
    /// Closing needs `&mut Browser`; everything else goes through `page`.
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpDriver {
    async fn eval(&self, script: String) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn element_present(&self, selector: &str) -> Result<bool, DriverError> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    /// Poll `probe` until it reports true or `timeout` elapses.
    async fn poll_until<F, Fut>(
        &self,
        timeout: Duration,
        describe: &str,
        probe: F,
    ) -> Result<(), DriverError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<bool, DriverError>>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if probe().await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::Timeout(describe.to_string()));
            }
            tokio::time::sleep(config::WAIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation(e.to_string()))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        match self.page.url().await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Err(DriverError::Navigation("page not loaded".to_string())),
            Err(e) => Err(DriverError::Browser(e.to_string())),
        }
    }

    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<(), DriverError> {
        self.poll_until(timeout, &format!("url containing '{fragment}'"), || async move {
            Ok(self
                .current_url()
                .await
                .map(|url| url.contains(fragment))
                .unwrap_or(false))
        })
        .await
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        self.poll_until(timeout, &format!("element '{selector}'"), || async move {
            self.element_present(selector).await
        })
        .await
    }

    async fn element_text(&self, selector: &str) -> Result<String, DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({q}); \
             return el ? el.textContent : null; }})()",
            q = js_string(selector)
        );
        match self.eval(script).await? {
            serde_json::Value::String(text) => Ok(text.trim().to_string()),
            _ => Err(DriverError::NotFound(selector.to_string())),
        }
    }

    async fn element_attr(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>, DriverError> {
        // Prefer the live DOM property (textarea values never reach the
        // attribute), fall back to getAttribute.
        let script = format!(
            "(() => {{ const el = document.querySelector({q}); \
             if (!el) return {{ found: false, value: null }}; \
             let v = el[{a}]; \
             if (v === undefined || v === null || typeof v === 'object' || typeof v === 'function') \
               v = el.getAttribute({a}); \
             return {{ found: true, value: v === null || v === undefined ? null : String(v) }}; }})()",
            q = js_string(selector),
            a = js_string(attr)
        );
        let value = self.eval(script).await?;
        if !value
            .get("found")
            .and_then(|f| f.as_bool())
            .unwrap_or(false)
        {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        Ok(value
            .get("value")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string()))
    }

    async fn count_elements(&self, selector: &str) -> Result<usize, DriverError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        Ok(self.eval(script).await?.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        self.wait_for_element(selector, timeout).await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({q}); \
             if (!el) return false; el.click(); return true; }})()",
            q = js_string(selector)
        );
        if self.eval(script).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(DriverError::NotFound(selector.to_string()))
        }
    }

    async fn fill(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        self.wait_for_element(selector, timeout).await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({q}); \
             if (!el) return false; \
             el.focus(); el.value = {v}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()",
            q = js_string(selector),
            v = js_string(text)
        );
        if self.eval(script).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(DriverError::NotFound(selector.to_string()))
        }
    }

    async fn is_alive(&self) -> bool {
        self.page.url().await.is_ok()
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::debug!("Browser close: {e}");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser wait: {e}");
        }
        self.handler_task.abort();
        tracing::info!("Browser closed");
    }
}
