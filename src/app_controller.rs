/*!
 * Application controller.
 *
 * Composes the credential cache, origin client, catalog resolver,
 * link cache, pipeline, bulk orchestrator and archive assembler into
 * the operations the outer surface exposes: search, single-episode
 * resolution, range resolution and archive assembly.
 *
 * All input validation happens here, before any network traffic.
 */

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::app_config::Config;
use crate::bulk::{
    ArchiveAssembler, ArchiveStrategy, ArchiveStream, BulkDownloadOrchestrator,
    BulkResolveOutcome, CachedPipelineResolver, EpisodeLinkResolver, EpisodeResolveRequest,
};
use crate::catalog::EpisodeCatalogResolver;
use crate::credentials::browser::ChromiumBrowser;
use crate::credentials::{BrowserCredentialCache, CredentialSource};
use crate::database::connection::DatabaseConnection;
use crate::database::models::{AnimeRecord, DownloadSessionRecord, ResolvedLinkRecord};
use crate::database::{DatabaseStats, Repository};
use crate::errors::{ServiceError, ServiceResult};
use crate::link_cache::VideoLinkCache;
use crate::origin::OriginClient;
use crate::resolve::LinkResolutionPipeline;

/// Status label the origin uses for unfinished releases
const AIRING_STATUS: &str = "Currently Airing";

/// One search result as surfaced to callers
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Stable internal id, the handle for all later operations
    pub id: String,
    /// Anime title
    pub title: String,
    /// Episode count, corrected for airing releases
    pub episodes: i64,
    /// Airing status
    pub status: Option<String>,
    /// Release year
    pub year: Option<i64>,
    /// Poster image URL
    pub poster: Option<String>,
    /// Community score
    pub score: Option<f64>,
}

/// The service facade over all collaborators
pub struct Controller {
    repo: Repository,
    credentials: Arc<dyn CredentialSource>,
    origin: OriginClient,
    resolver: Arc<dyn EpisodeLinkResolver>,
    bulk: BulkDownloadOrchestrator,
    assembler: ArchiveAssembler,
}

impl Controller {
    /// Build the production controller from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let db = match &config.database_path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        let repo = Repository::new(db);

        let credentials: Arc<dyn CredentialSource> = Arc::new(BrowserCredentialCache::new(
            Arc::new(ChromiumBrowser::new()),
            config.origin.base_url.clone(),
            Duration::from_millis(config.origin.dom_ready_timeout_ms),
            Duration::from_millis(config.origin.landing_settle_ms),
            &config.cookie_cache_path,
        ));

        let origin = OriginClient::new(
            &config.origin.base_url,
            Duration::from_secs(config.origin.request_timeout_secs),
        )?;

        let catalog = Arc::new(EpisodeCatalogResolver::new(
            origin.clone(),
            repo.clone(),
            Duration::from_millis(config.origin.page_stagger_ms),
        ));
        let cache = VideoLinkCache::new(
            repo.clone(),
            Duration::from_secs(config.origin.probe_timeout_secs),
        )?;
        let pipeline = Arc::new(LinkResolutionPipeline::new(origin.clone(), &config.resolve)?);

        let resolver: Arc<dyn EpisodeLinkResolver> = Arc::new(CachedPipelineResolver::new(
            cache,
            pipeline,
            catalog,
            Arc::clone(&credentials),
            Duration::from_millis(config.bulk.pre_resolve_delay_ms),
        ));

        Self::with_parts(config, repo, credentials, origin, resolver)
    }

    /// Assemble a controller from explicit collaborators.
    ///
    /// This is the seam tests use to substitute scripted resolvers and
    /// credential sources.
    pub fn with_parts(
        config: &Config,
        repo: Repository,
        credentials: Arc<dyn CredentialSource>,
        origin: OriginClient,
        resolver: Arc<dyn EpisodeLinkResolver>,
    ) -> Result<Self> {
        let bulk = BulkDownloadOrchestrator::new(
            Arc::clone(&resolver),
            repo.clone(),
            config.bulk.max_concurrent,
        );

        let media_referer = format!("https://{}/", config.resolve.player_host);
        let assembler = ArchiveAssembler::new(&config.bulk, &media_referer)?;

        Ok(Self {
            repo,
            credentials,
            origin,
            resolver,
            bulk,
            assembler,
        })
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search the origin catalog and register every hit locally.
    pub async fn search(&self, query: &str) -> ServiceResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }

        let cookies = self.credentials.get().await?.unwrap_or_default();

        let hits = self
            .origin
            .search(query, &cookies)
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("Search failed: {}", e)))?;
        info!("Search for '{}' returned {} hits", query, hits.len());

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            // Search underreports episodes for airing releases; the
            // release probe has the real total.
            let mut episodes = hit.episodes;
            let airing = hit.status.as_deref() == Some(AIRING_STATUS);
            if episodes == 0 || airing {
                match self.origin.release_probe(&hit.session, &cookies).await {
                    Ok(probe) => {
                        if let Some(total) = probe.total {
                            episodes = total;
                        }
                    }
                    Err(e) => warn!("Episode-count probe failed for '{}': {}", hit.title, e),
                }
            }

            let internal_id = match self.repo.get_internal_id(&hit.session).await? {
                Some(existing) => existing,
                None => self.generate_internal_id(&hit.title).await?,
            };

            self.repo
                .upsert_anime(&AnimeRecord {
                    internal_id: internal_id.clone(),
                    external_id: hit.session.clone(),
                    title: hit.title.clone(),
                    episode_count: episodes,
                })
                .await?;

            results.push(SearchResult {
                id: internal_id,
                title: hit.title,
                episodes,
                status: hit.status,
                year: hit.year,
                poster: hit.poster,
                score: hit.score,
            });
        }

        Ok(results)
    }

    /// Derive a short human-readable id from the title: word initials
    /// plus digits taken from the title hash, widened on collision.
    async fn generate_internal_id(&self, title: &str) -> Result<String> {
        let initials: String = title
            .split_whitespace()
            .take(2)
            .filter_map(|word| word.chars().next())
            .flat_map(|c| c.to_uppercase())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let initials = if initials.is_empty() {
            "XX".to_string()
        } else {
            initials
        };

        let hash = Sha256::digest(title.as_bytes());
        for window in hash.chunks_exact(4) {
            let number = u32::from_be_bytes([window[0], window[1], window[2], window[3]]) % 10_000;
            let candidate = format!("{}{:04}", initials, number);
            if !self.repo.internal_id_exists(&candidate).await? {
                debug!("Assigned internal id {} to '{}'", candidate, title);
                return Ok(candidate);
            }
        }

        // Exhausting every hash window means eight live collisions;
        // fall back to an id that cannot collide.
        Ok(format!("{}{}", initials, Uuid::new_v4().simple()))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the direct media link for one episode.
    pub async fn resolve_episode(
        &self,
        internal_id: &str,
        episode: i64,
    ) -> ServiceResult<ResolvedLinkRecord> {
        if episode < 1 {
            return Err(ServiceError::Validation(
                "Episode numbers start at 1".to_string(),
            ));
        }

        let anime = self.refreshed_anime(internal_id).await?;
        if episode > anime.episode_count {
            return Err(ServiceError::RangeExceeded(format!(
                "Episode {} exceeds the known episode count {}",
                episode, anime.episode_count
            )));
        }

        self.resolver
            .resolve_episode(&EpisodeResolveRequest {
                internal_id: anime.internal_id,
                external_id: anime.external_id,
                episode,
                delay_before_fetch: false,
            })
            .await
    }

    /// Resolve a range of episodes and persist a download session.
    pub async fn resolve_range(
        &self,
        internal_id: &str,
        from: i64,
        to: i64,
    ) -> ServiceResult<BulkResolveOutcome> {
        // The cheap shape checks come before the anime lookup, which
        // may go to the origin.
        if from < 1 {
            return Err(ServiceError::Validation(
                "Episode numbers start at 1".to_string(),
            ));
        }
        if from > to {
            return Err(ServiceError::Validation(format!(
                "Invalid range: start episode {} is after end episode {}",
                from, to
            )));
        }

        let anime = self.refreshed_anime(internal_id).await?;
        self.bulk.resolve_range(&anime, from, to).await
    }

    /// Load an anime and refresh its episode count from the origin.
    async fn refreshed_anime(&self, internal_id: &str) -> ServiceResult<AnimeRecord> {
        let mut anime = self.repo.get_anime(internal_id).await?.ok_or_else(|| {
            ServiceError::NotFound(
                "Anime not found in the local catalog. Search for it first".to_string(),
            )
        })?;

        let cookies = self.credentials.get().await?.unwrap_or_default();
        let probe = self
            .origin
            .release_probe(&anime.external_id, &cookies)
            .await
            .map_err(|e| {
                ServiceError::UpstreamUnavailable(format!("Episode-count refresh failed: {}", e))
            })?;

        if let Some(total) = probe.total {
            if total != anime.episode_count {
                info!(
                    "Episode count for {} changed {} -> {}",
                    internal_id, anime.episode_count, total
                );
                self.repo.update_episode_count(internal_id, total).await?;
                anime.episode_count = total;
            }
        }

        Ok(anime)
    }

    // =========================================================================
    // Archives
    // =========================================================================

    /// Assemble a download session's archive, then consume the session.
    ///
    /// The session is deleted only once the archive is assembled,
    /// immediately before the stream is handed back. A failed assembly
    /// leaves the session in place so the caller can retry.
    pub async fn archive_session(
        &self,
        session_id: &str,
        strategy: ArchiveStrategy,
    ) -> ServiceResult<ArchiveStream> {
        let session = self
            .repo
            .get_download_session(session_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(
                    "Download session not found or already consumed".to_string(),
                )
            })?;

        let archive = self.assembler.assemble(&session, strategy).await?;

        self.repo.delete_download_session(session_id).await?;
        Ok(archive)
    }

    /// Assemble an archive directly from caller-supplied links,
    /// without a persisted session.
    pub async fn archive_links(
        &self,
        title: &str,
        links: Vec<ResolvedLinkRecord>,
        strategy: ArchiveStrategy,
    ) -> ServiceResult<ArchiveStream> {
        if links.is_empty() {
            return Err(ServiceError::Validation(
                "At least one link is required".to_string(),
            ));
        }

        let session = DownloadSessionRecord::new(
            Uuid::new_v4().to_string(),
            String::new(),
            title.to_string(),
            links,
        );
        self.assembler.assemble(&session, strategy).await
    }

    /// Cache store counters
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.repo.connection().stats().context("Failed to read cache store stats")
    }
}
