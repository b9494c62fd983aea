/*!
 * Token extraction from the player page.
 *
 * The player page sets a session cookie on the response and embeds the
 * redirect token in a packed inline script. This stage fetches the
 * page with browser-like headers, records the cookie, picks the packed
 * script, and deobfuscates it to recover the token and reported size.
 */

use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;

use super::deobfuscate::{deobfuscate, extract_fields};

/// Session cookie name the player sets on its response
const PLAYER_SESSION_COOKIE: &str = "kwik_session";

/// Offset of the packed script, counted from the end of the page
const PACKED_SCRIPT_FROM_END: usize = 3;

/// Everything the redirect stage needs from the player page
#[derive(Debug, Clone)]
pub struct TokenBundle {
    /// Redirect token recovered from the packed script
    pub token: String,
    /// Player session cookie value
    pub session_cookie: String,
    /// Media size as reported by the player, if present
    pub size: Option<String>,
}

/// Fetches player pages and recovers their token bundles
pub struct TokenExtractor {
    client: Client,
}

impl TokenExtractor {
    /// Build an extractor with browser-like request headers
    pub fn new(origin_base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::origin::USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            REFERER,
            HeaderValue::from_str(origin_base_url).context("Origin base URL is not a valid header")?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build player HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch one player page and recover its token bundle.
    pub async fn extract(&self, player_url: &str) -> Result<TokenBundle> {
        let response = self
            .client
            .get(player_url)
            .send()
            .await
            .context("Player page request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Player page returned {}", response.status()));
        }

        let session_cookie = response
            .cookies()
            .find(|c| c.name() == PLAYER_SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| anyhow!("Player page set no session cookie"))?;

        let html = response
            .text()
            .await
            .context("Failed to read player page body")?;

        // HTML parsing and the packed decode are CPU work on a large
        // page; keep them off the async threads.
        let fields = tokio::task::spawn_blocking(move || {
            let packed = select_packed_script(&html)?;
            let plaintext = deobfuscate(&packed)?;
            extract_fields(&plaintext)
        })
        .await
        .context("Token extraction task panicked")??;

        debug!("Recovered player token (size: {:?})", fields.size);

        Ok(TokenBundle {
            token: fields.token,
            session_cookie,
            size: fields.size,
        })
    }
}

/// Pick the packed script out of a player page.
///
/// The page carries the packed payload at a fixed position, third from
/// the end of its inline scripts. That positional contract is the only
/// thing this function knows; keeping it isolated here means a page
/// layout change is a one-line fix.
pub fn select_packed_script(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| anyhow!("Script selector failed to parse: {:?}", e))?;

    let scripts: Vec<String> = document
        .select(&selector)
        .map(|s| s.text().collect::<String>())
        .collect();

    if scripts.len() < PACKED_SCRIPT_FROM_END {
        return Err(anyhow!(
            "Player page has {} scripts, expected at least {}",
            scripts.len(),
            PACKED_SCRIPT_FROM_END
        ));
    }

    Ok(scripts[scripts.len() - PACKED_SCRIPT_FROM_END].clone())
}
