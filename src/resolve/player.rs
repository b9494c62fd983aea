/*!
 * Player URL extraction from embed page HTML.
 *
 * The embed page references the player host inside an inline script.
 * Extraction scans script bodies for the first URL on the configured
 * player host.
 */

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use scraper::{Html, Selector};

/// Finds player-host URLs inside embed page scripts
#[derive(Clone)]
pub struct PlayerUrlExtractor {
    pattern: Regex,
}

impl PlayerUrlExtractor {
    /// Build an extractor for the given player host
    pub fn new(player_host: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r#"https?://(?:www\.)?{}[^\s"');]+"#,
            regex::escape(player_host)
        ))
        .context("Failed to build player URL pattern")?;

        Ok(Self { pattern })
    }

    /// Extract the first player URL from an embed page.
    pub fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let script_selector = Selector::parse("script").ok()?;

        for script in document.select(&script_selector) {
            let body = script.text().collect::<String>();
            if let Some(found) = self.pattern.find(&body) {
                debug!("Found player URL in embed script");
                return Some(found.as_str().to_string());
            }
        }

        None
    }
}
