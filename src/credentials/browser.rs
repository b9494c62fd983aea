/*!
 * Headless browser integration for cookie harvesting.
 *
 * Only a narrow surface is needed: navigate to one page and read the
 * cookies the origin set. The `CookieBrowser` trait captures that
 * contract; the chromiumoxide implementation below is the production
 * one, tests substitute doubles.
 */

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use log::{debug, warn};
use std::time::Duration;

/// One cookie as harvested from the browser context
#[derive(Debug, Clone)]
pub struct HarvestedCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Unix expiry timestamp; None for session cookies
    pub expires: Option<f64>,
}

/// Minimal browser contract: visit a page, return its cookies
#[async_trait]
pub trait CookieBrowser: Send + Sync {
    /// Navigate to `url`, wait up to `dom_ready_timeout` for the page
    /// to load (a timeout is non-fatal), wait `settle_delay` for late
    /// cookies, and return everything in the cookie jar.
    async fn harvest(
        &self,
        url: &str,
        dom_ready_timeout: Duration,
        settle_delay: Duration,
    ) -> Result<Vec<HarvestedCookie>>;
}

/// Headless Chromium launched per harvest.
///
/// Harvests are rare (only on cache miss or expiry), so a short-lived
/// browser is simpler than keeping one alive across the process.
pub struct ChromiumBrowser;

impl ChromiumBrowser {
    /// Create a new launcher
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChromiumBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CookieBrowser for ChromiumBrowser {
    async fn harvest(
        &self,
        url: &str,
        dom_ready_timeout: Duration,
        settle_delay: Duration,
    ) -> Result<Vec<HarvestedCookie>> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 720)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch headless browser")?;

        // The handler must be polled for the browser connection to
        // make progress.
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let result = async {
            let page = browser
                .new_page(url)
                .await
                .with_context(|| format!("Failed to open page: {}", url))?;

            match tokio::time::timeout(dom_ready_timeout, page.wait_for_navigation()).await {
                Ok(Ok(_)) => debug!("Landing page loaded"),
                Ok(Err(e)) => warn!("Navigation reported an error, continuing: {}", e),
                Err(_) => warn!("Timeout waiting for page load, continuing anyway"),
            }

            // Give late-setting scripts a moment before harvesting.
            tokio::time::sleep(settle_delay).await;

            let cookies = page
                .get_cookies()
                .await
                .context("Failed to read cookies from page")?;

            Ok::<_, anyhow::Error>(
                cookies
                    .into_iter()
                    .map(|c| HarvestedCookie {
                        name: c.name,
                        value: c.value,
                        // CDP reports -1 for session cookies
                        expires: if c.expires > 0.0 { Some(c.expires) } else { None },
                    })
                    .collect::<Vec<_>>(),
            )
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        handler_task.abort();

        result
    }
}
