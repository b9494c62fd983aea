/*!
 * Origin site API client.
 *
 * Thin typed client over the origin's JSON API (search, release probe,
 * release pages) and its play pages. Session cookies come from the
 * injected `CredentialSource` and are sent explicitly per request, so
 * one client instance serves the whole process.
 */

use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::credentials::CookieMap;

/// Browser-like User-Agent; the origin rejects obvious bots
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/131 Safari/537.36";

/// One search hit from the origin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Origin-assigned anime session identifier (our external_id)
    pub session: String,
    /// Anime title
    pub title: String,
    /// Episode count as reported by search; 0 while airing
    #[serde(default)]
    pub episodes: i64,
    /// Airing status
    #[serde(default)]
    pub status: Option<String>,
    /// Release year
    #[serde(default)]
    pub year: Option<i64>,
    /// Poster image URL
    #[serde(default)]
    pub poster: Option<String>,
    /// Community score
    #[serde(default)]
    pub score: Option<f64>,
}

/// Search response envelope
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

/// Release probe response: page count and episode total
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseProbe {
    /// Total number of episodes
    #[serde(default)]
    pub total: Option<i64>,
    /// Number of catalog pages
    #[serde(default)]
    pub last_page: Option<i64>,
}

/// One catalog entry from a release page
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Opaque token addressing this episode's embed page
    pub session: String,
    /// Episode number as listed
    #[serde(default)]
    pub episode: Option<i64>,
    /// Thumbnail URL
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// Release page response envelope
#[derive(Debug, Deserialize)]
struct ReleasePage {
    #[serde(default)]
    data: Vec<CatalogEntry>,
}

/// Client for the origin site's API and play pages
#[derive(Clone)]
pub struct OriginClient {
    /// Base URL of the origin site
    base_url: String,
    /// HTTP client for API requests
    client: Client,
}

impl OriginClient {
    /// Create a new client for the given origin
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .context("Failed to build origin HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Origin base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn cookie_header(cookies: &CookieMap) -> String {
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Search the origin catalog by name
    pub async fn search(&self, query: &str, cookies: &CookieMap) -> Result<Vec<SearchHit>> {
        let url = format!(
            "{}/api?m=search&q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        debug!("Searching origin for '{}'", query);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Origin search returned {}", response.status()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Origin search returned a non-JSON body")?;
        Ok(body.data)
    }

    /// Probe a release: page count and episode total for one anime
    pub async fn release_probe(
        &self,
        external_id: &str,
        cookies: &CookieMap,
    ) -> Result<ReleaseProbe> {
        let url = format!("{}/api?m=release&id={}", self.base_url, external_id);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Release probe returned {}", response.status()));
        }

        response
            .json()
            .await
            .context("Release probe returned a non-JSON body")
    }

    /// Fetch one catalog page, explicitly sorted ascending so page
    /// order matches episode order.
    pub async fn release_page(
        &self,
        external_id: &str,
        page: i64,
        cookies: &CookieMap,
    ) -> Result<Vec<CatalogEntry>> {
        let url = format!(
            "{}/api?m=release&id={}&sort=episode_asc&page={}",
            self.base_url, external_id, page
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Release page {} returned {}",
                page,
                response.status()
            ));
        }

        let body: ReleasePage = response
            .json()
            .await
            .with_context(|| format!("Release page {} returned a non-JSON body", page))?;
        Ok(body.data)
    }

    /// Fetch the play page HTML for one episode
    pub async fn play_page(
        &self,
        external_id: &str,
        episode_session: &str,
        cookies: &CookieMap,
    ) -> Result<String> {
        let url = format!(
            "{}/play/{}/{}",
            self.base_url, external_id, episode_session
        );
        debug!("Fetching play page {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Play page returned {}", response.status()));
        }

        response.text().await.context("Failed to read play page body")
    }
}
