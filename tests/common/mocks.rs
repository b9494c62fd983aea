/*!
 * Test doubles: scripted credential sources, browsers and resolvers.
 *
 * All doubles record their calls so tests can assert that no external
 * traffic would have happened.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use pahedl::bulk::{EpisodeLinkResolver, EpisodeResolveRequest};
use pahedl::credentials::browser::{CookieBrowser, HarvestedCookie};
use pahedl::credentials::{CookieMap, CredentialSource};
use pahedl::database::models::ResolvedLinkRecord;
use pahedl::errors::{ResolveStage, ServiceError, ServiceResult};

/// Credential source returning a fixed cookie set without any browser
pub struct StaticCredentials {
    cookies: CookieMap,
}

impl StaticCredentials {
    pub fn new() -> Self {
        let mut cookies = HashMap::new();
        cookies.insert("__ddg2_".to_string(), "test-session".to_string());
        Self { cookies }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn get(&self) -> Result<Option<CookieMap>> {
        Ok(Some(self.cookies.clone()))
    }

    async fn refresh(&self) -> Result<Option<CookieMap>> {
        Ok(Some(self.cookies.clone()))
    }
}

/// Browser double serving scripted cookies, optionally failing
pub struct ScriptedBrowser {
    cookies: Vec<HarvestedCookie>,
    fail: bool,
    pub harvest_count: Mutex<usize>,
}

impl ScriptedBrowser {
    pub fn with_cookies(cookies: Vec<(&str, &str, Option<f64>)>) -> Self {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(name, value, expires)| HarvestedCookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    expires,
                })
                .collect(),
            fail: false,
            harvest_count: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            cookies: Vec::new(),
            fail: true,
            harvest_count: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CookieBrowser for ScriptedBrowser {
    async fn harvest(
        &self,
        _url: &str,
        _dom_ready_timeout: Duration,
        _settle_delay: Duration,
    ) -> Result<Vec<HarvestedCookie>> {
        *self.harvest_count.lock() += 1;
        if self.fail {
            return Err(anyhow!("scripted browser failure"));
        }
        Ok(self.cookies.clone())
    }
}

/// Resolver double returning canned links, failing scripted episodes
pub struct ScriptedResolver {
    failing: Vec<i64>,
    pub requests: Mutex<Vec<EpisodeResolveRequest>>,
}

impl ScriptedResolver {
    pub fn new(failing: Vec<i64>) -> Self {
        Self {
            failing,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl EpisodeLinkResolver for ScriptedResolver {
    async fn resolve_episode(
        &self,
        request: &EpisodeResolveRequest,
    ) -> ServiceResult<ResolvedLinkRecord> {
        self.requests.lock().push(request.clone());

        if self.failing.contains(&request.episode) {
            return Err(ServiceError::stage(
                ResolveStage::EmbedLookup,
                "scripted failure",
            ));
        }

        Ok(ResolvedLinkRecord {
            internal_id: request.internal_id.clone(),
            episode: request.episode,
            direct_link: format!("http://127.0.0.1:9/ep{}.mp4", request.episode),
            size: Some("100 MB".to_string()),
            snapshot: None,
        })
    }
}
