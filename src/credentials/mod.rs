/*!
 * Session credential acquisition and caching.
 *
 * The origin gates its API behind session cookies issued to browsers.
 * This module owns acquiring those cookies through a headless browser,
 * persisting them to a single on-disk cache file, and reusing them
 * until any entry expires.
 *
 * The cache is exposed through the `CredentialSource` trait so callers
 * depend on an explicit get/refresh interface rather than hidden
 * file-backed process state, and tests can inject doubles.
 */

pub mod browser;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use browser::CookieBrowser;

/// Cookie name -> value map handed to HTTP clients
pub type CookieMap = HashMap<String, String>;

/// Source of origin session credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return usable cookies, acquiring fresh ones if the cache is
    /// missing or expired. None means no cache exists and acquisition
    /// failed.
    async fn get(&self) -> Result<Option<CookieMap>>;

    /// Force a fresh acquisition, bypassing the expiry check
    async fn refresh(&self) -> Result<Option<CookieMap>>;
}

/// One persisted cookie with its optional expiry timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCookie {
    /// Cookie value
    pub value: String,
    /// Unix expiry timestamp; absent means the cookie never expires
    #[serde(default)]
    pub expires: Option<f64>,
}

/// Check whether any cookie in the cache has expired.
///
/// A single expired entry stales the whole set, since the origin
/// validates them together.
pub fn cookies_expired(cookies: &HashMap<String, CachedCookie>) -> bool {
    let now = Utc::now().timestamp() as f64;
    cookies
        .values()
        .any(|c| matches!(c.expires, Some(exp) if exp < now))
}

fn cookie_values(cookies: &HashMap<String, CachedCookie>) -> CookieMap {
    cookies
        .iter()
        .map(|(name, c)| (name.clone(), c.value.clone()))
        .collect()
}

/// Process-wide credential cache: one JSON file on disk, lazily
/// refreshed through a headless browser.
///
/// Expiry is evaluated on every read; there is no explicit
/// invalidation call.
pub struct BrowserCredentialCache {
    /// Headless browser used to acquire fresh cookies
    browser: Arc<dyn CookieBrowser>,
    /// Origin landing page to navigate to
    landing_url: String,
    /// Bound on waiting for DOM-ready; hitting it is non-fatal
    dom_ready_timeout: Duration,
    /// Settle delay before harvesting, so late cookies land
    settle_delay: Duration,
    /// Path of the on-disk cache file
    cache_path: PathBuf,
    /// Guards read-check-write cycles on the cache file
    file_lock: Mutex<()>,
}

impl BrowserCredentialCache {
    /// Create a new cache backed by the given browser and cache file
    pub fn new(
        browser: Arc<dyn CookieBrowser>,
        landing_url: impl Into<String>,
        dom_ready_timeout: Duration,
        settle_delay: Duration,
        cache_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            browser,
            landing_url: landing_url.into(),
            dom_ready_timeout,
            settle_delay,
            cache_path: cache_path.as_ref().to_path_buf(),
            file_lock: Mutex::new(()),
        }
    }

    fn load_cache(&self) -> Option<HashMap<String, CachedCookie>> {
        let _guard = self.file_lock.lock();
        let data = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&data) {
            Ok(cookies) => Some(cookies),
            Err(e) => {
                warn!("Discarding unreadable cookie cache: {}", e);
                None
            }
        }
    }

    fn save_cache(&self, cookies: &HashMap<String, CachedCookie>) -> Result<()> {
        let _guard = self.file_lock.lock();
        let data = serde_json::to_string(cookies).context("Failed to serialize cookie cache")?;
        std::fs::write(&self.cache_path, data)
            .with_context(|| format!("Failed to write cookie cache: {:?}", self.cache_path))?;
        Ok(())
    }

    async fn acquire(&self) -> Result<HashMap<String, CachedCookie>> {
        info!("Acquiring fresh session cookies from {}", self.landing_url);

        let harvested = self
            .browser
            .harvest(&self.landing_url, self.dom_ready_timeout, self.settle_delay)
            .await?;

        let cookies: HashMap<String, CachedCookie> = harvested
            .into_iter()
            .map(|c| {
                (
                    c.name,
                    CachedCookie {
                        value: c.value,
                        expires: c.expires,
                    },
                )
            })
            .collect();

        debug!("Harvested {} cookies", cookies.len());
        Ok(cookies)
    }
}

#[async_trait]
impl CredentialSource for BrowserCredentialCache {
    async fn get(&self) -> Result<Option<CookieMap>> {
        if let Some(cached) = self.load_cache() {
            if !cookies_expired(&cached) {
                debug!("Using persisted session cookies");
                return Ok(Some(cookie_values(&cached)));
            }
            debug!("Persisted session cookies expired");
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<Option<CookieMap>> {
        match self.acquire().await {
            Ok(cookies) => {
                if let Err(e) = self.save_cache(&cookies) {
                    // Cookies are still usable this run even if the
                    // cache file could not be written.
                    warn!("Failed to persist cookie cache: {}", e);
                }
                Ok(Some(cookie_values(&cookies)))
            }
            Err(e) => {
                warn!("Cookie acquisition failed: {}", e);
                // Fall back to the last persisted cookies even if
                // expired; a stale session sometimes still passes.
                if let Some(cached) = self.load_cache() {
                    info!("Falling back to persisted cookies");
                    return Ok(Some(cookie_values(&cached)));
                }
                Ok(None)
            }
        }
    }
}
