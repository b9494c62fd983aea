/*!
 * The four-stage link resolution pipeline.
 *
 * play page -> embed URL -> player URL -> token bundle -> direct URL.
 * Stages run strictly in sequence; the first stage that produces
 * nothing short-circuits the chain with a stage-tagged error, and no
 * partial result is ever cached.
 */

use anyhow::Context;
use log::{debug, info};
use reqwest::Client;
use std::time::Duration;

use crate::app_config::ResolveConfig;
use crate::credentials::CookieMap;
use crate::database::models::ResolvedLinkRecord;
use crate::errors::{ResolveStage, ServiceError, ServiceResult};
use crate::origin::{CatalogEntry, OriginClient};

use super::embed::select_embed_url;
use super::player::PlayerUrlExtractor;
use super::redirect::RedirectResolver;
use super::token::TokenExtractor;

/// Runs the resolution chain for one episode
pub struct LinkResolutionPipeline {
    origin: OriginClient,
    /// Client for embed pages, which live on a different host
    embed_client: Client,
    player: PlayerUrlExtractor,
    token: TokenExtractor,
    redirect: RedirectResolver,
    preferred_quality: String,
    excluded_audio: String,
}

impl LinkResolutionPipeline {
    /// Assemble the pipeline from its configuration
    pub fn new(origin: OriginClient, config: &ResolveConfig) -> anyhow::Result<Self> {
        let stage_timeout = Duration::from_secs(config.stage_timeout_secs);

        let embed_client = Client::builder()
            .timeout(stage_timeout)
            .user_agent(crate::origin::USER_AGENT)
            .build()
            .context("Failed to build embed page client")?;

        let player = PlayerUrlExtractor::new(&config.player_host)?;
        let token = TokenExtractor::new(origin.base_url(), stage_timeout)?;
        let redirect = RedirectResolver::new(&config.resolver_endpoint, stage_timeout)?;

        Ok(Self {
            origin,
            embed_client,
            player,
            token,
            redirect,
            preferred_quality: config.preferred_quality.clone(),
            excluded_audio: config.excluded_audio.clone(),
        })
    }

    /// Resolve one episode's direct media URL.
    ///
    /// The returned record is ready for caching; this method itself
    /// never touches the cache.
    pub async fn resolve(
        &self,
        internal_id: &str,
        external_id: &str,
        episode: i64,
        entry: &CatalogEntry,
        cookies: &CookieMap,
    ) -> ServiceResult<ResolvedLinkRecord> {
        info!("Resolving episode {} of {}", episode, internal_id);

        // Stage 1: pick the embed link off the play page.
        let play_html = self
            .origin
            .play_page(external_id, &entry.session, cookies)
            .await?;

        let quality = self.preferred_quality.clone();
        let excluded = self.excluded_audio.clone();
        let embed_url = tokio::task::spawn_blocking(move || {
            select_embed_url(&play_html, &quality, &excluded)
        })
        .await
        .context("Embed selection task panicked")?
        .ok_or_else(|| {
            ServiceError::stage(
                ResolveStage::EmbedLookup,
                format!("No download variant offered for episode {}", episode),
            )
        })?;
        debug!("Stage 1 complete: embed URL found");

        // Stage 2: find the player URL inside the embed page.
        let embed_html = self.fetch_embed_page(&embed_url).await?;

        let extractor = self.player.clone();
        let player_url = tokio::task::spawn_blocking(move || extractor.extract(&embed_html))
            .await
            .context("Player extraction task panicked")?
            .ok_or_else(|| {
                ServiceError::stage(
                    ResolveStage::PlayerExtraction,
                    format!("No player URL in embed page for episode {}", episode),
                )
            })?;
        debug!("Stage 2 complete: player URL found");

        // Stage 3: recover the token bundle from the player page.
        let bundle = self.token.extract(&player_url).await.map_err(|e| {
            ServiceError::stage(ResolveStage::TokenExtraction, e.to_string())
        })?;
        debug!("Stage 3 complete: token recovered");

        // Stage 4: exchange it all for the direct media URL.
        let direct_link = self
            .redirect
            .resolve(&player_url, &bundle.token, &bundle.session_cookie)
            .await?;
        info!("Resolved episode {} of {}", episode, internal_id);

        Ok(ResolvedLinkRecord {
            internal_id: internal_id.to_string(),
            episode,
            direct_link,
            size: bundle.size,
            snapshot: entry.snapshot.clone(),
        })
    }

    async fn fetch_embed_page(&self, embed_url: &str) -> ServiceResult<String> {
        let response = self.embed_client.get(embed_url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ServiceError::UpstreamUnavailable(format!("Embed host unreachable: {}", e))
            } else {
                ServiceError::stage(
                    ResolveStage::PlayerExtraction,
                    format!("Embed page request failed: {}", e),
                )
            }
        })?;

        if !response.status().is_success() {
            return Err(ServiceError::stage(
                ResolveStage::PlayerExtraction,
                format!("Embed page returned {}", response.status()),
            ));
        }

        response.text().await.map_err(|e| {
            ServiceError::stage(
                ResolveStage::PlayerExtraction,
                format!("Failed to read embed page body: {}", e),
            )
        })
    }
}
