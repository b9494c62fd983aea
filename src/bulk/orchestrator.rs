/*!
 * Bounded-concurrency bulk resolution.
 *
 * A range request fans out one resolution per episode under a fixed
 * semaphore. Individual failures are logged and dropped; the batch
 * fails only when nothing at all resolved. Successes become a one-shot
 * download session for the archive endpoint to consume.
 */

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::catalog::EpisodeCatalogResolver;
use crate::credentials::CredentialSource;
use crate::database::models::{AnimeRecord, DownloadSessionRecord, ResolvedLinkRecord};
use crate::database::Repository;
use crate::errors::{ServiceError, ServiceResult};
use crate::link_cache::VideoLinkCache;
use crate::resolve::LinkResolutionPipeline;

/// One episode to resolve, with everything the resolver needs
#[derive(Debug, Clone)]
pub struct EpisodeResolveRequest {
    /// Anime internal id
    pub internal_id: String,
    /// Origin-assigned anime id
    pub external_id: String,
    /// Episode number, 1-based
    pub episode: i64,
    /// Whether to pause briefly before going to the origin on a cache
    /// miss; set for bulk requests to soften the burst
    pub delay_before_fetch: bool,
}

/// Resolves a single episode to a direct link.
///
/// The production implementation is cache-first over the full
/// pipeline; tests substitute scripted doubles.
#[async_trait]
pub trait EpisodeLinkResolver: Send + Sync {
    /// Resolve one episode to a cached-or-fresh direct link
    async fn resolve_episode(
        &self,
        request: &EpisodeResolveRequest,
    ) -> ServiceResult<ResolvedLinkRecord>;
}

/// Cache-first resolver over the four-stage pipeline
pub struct CachedPipelineResolver {
    cache: VideoLinkCache,
    pipeline: Arc<LinkResolutionPipeline>,
    catalog: Arc<EpisodeCatalogResolver>,
    credentials: Arc<dyn CredentialSource>,
    pre_resolve_delay: Duration,
}

impl CachedPipelineResolver {
    /// Assemble the resolver from its collaborators
    pub fn new(
        cache: VideoLinkCache,
        pipeline: Arc<LinkResolutionPipeline>,
        catalog: Arc<EpisodeCatalogResolver>,
        credentials: Arc<dyn CredentialSource>,
        pre_resolve_delay: Duration,
    ) -> Self {
        Self {
            cache,
            pipeline,
            catalog,
            credentials,
            pre_resolve_delay,
        }
    }
}

#[async_trait]
impl EpisodeLinkResolver for CachedPipelineResolver {
    async fn resolve_episode(
        &self,
        request: &EpisodeResolveRequest,
    ) -> ServiceResult<ResolvedLinkRecord> {
        if let Some(cached) = self
            .cache
            .get_live(&request.internal_id, request.episode)
            .await?
        {
            return Ok(cached);
        }

        if request.delay_before_fetch {
            tokio::time::sleep(self.pre_resolve_delay).await;
        }

        let cookies = self.credentials.get().await?.unwrap_or_default();

        let episodes = self
            .catalog
            .list_episodes(&request.external_id, &cookies)
            .await?;

        let index = (request.episode - 1) as usize;
        let entry = episodes.get(index).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Episode {} not present in the origin catalog",
                request.episode
            ))
        })?;

        let record = self
            .pipeline
            .resolve(
                &request.internal_id,
                &request.external_id,
                request.episode,
                entry,
                &cookies,
            )
            .await?;

        self.cache.put(&record).await?;
        Ok(record)
    }
}

/// Outcome of a bulk resolution, keyed by its one-shot session
#[derive(Debug, Clone, Serialize)]
pub struct BulkResolveOutcome {
    /// One-shot session id for archive assembly
    pub session_id: String,
    /// Anime title
    pub anime_title: String,
    /// Number of episodes requested
    pub total_requested: usize,
    /// Number of episodes that resolved
    pub total_fetched: usize,
    /// Resolved links in episode order
    pub links: Vec<ResolvedLinkRecord>,
}

/// Fans a range of episodes out over a bounded resolver pool
pub struct BulkDownloadOrchestrator {
    resolver: Arc<dyn EpisodeLinkResolver>,
    repo: Repository,
    max_concurrent: usize,
}

impl BulkDownloadOrchestrator {
    /// Create an orchestrator with the given concurrency bound
    pub fn new(
        resolver: Arc<dyn EpisodeLinkResolver>,
        repo: Repository,
        max_concurrent: usize,
    ) -> Self {
        Self {
            resolver,
            repo,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Resolve episodes `from..=to` of one anime and persist the
    /// successes as a download session.
    ///
    /// Validation happens before any network traffic. Failed episodes
    /// are dropped from the result; the call fails only when the whole
    /// batch comes back empty.
    pub async fn resolve_range(
        &self,
        anime: &AnimeRecord,
        from: i64,
        to: i64,
    ) -> ServiceResult<BulkResolveOutcome> {
        validate_range(anime, from, to)?;

        let total_requested = (to - from + 1) as usize;
        info!(
            "Bulk resolving episodes {}-{} of {} ({} max concurrent)",
            from, to, anime.internal_id, self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let tasks = (from..=to).map(|episode| {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let request = EpisodeResolveRequest {
                internal_id: anime.internal_id.clone(),
                external_id: anime.external_id.clone(),
                episode,
                delay_before_fetch: true,
            };

            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };

                match resolver.resolve_episode(&request).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Episode {} dropped from batch: {}", episode, e);
                        None
                    }
                }
            }
        });

        let mut links: Vec<ResolvedLinkRecord> =
            join_all(tasks).await.into_iter().flatten().collect();
        links.sort_by_key(|link| link.episode);

        if links.is_empty() {
            return Err(ServiceError::UpstreamUnavailable(
                "No episodes in the requested range could be resolved".to_string(),
            ));
        }

        let total_fetched = links.len();
        info!(
            "Bulk resolution finished: {}/{} episodes",
            total_fetched, total_requested
        );

        let session = DownloadSessionRecord::new(
            Uuid::new_v4().to_string(),
            anime.internal_id.clone(),
            anime.title.clone(),
            links.clone(),
        );
        self.repo.create_download_session(&session).await?;

        Ok(BulkResolveOutcome {
            session_id: session.session_id,
            anime_title: anime.title.clone(),
            total_requested,
            total_fetched,
            links,
        })
    }
}

/// Reject impossible or out-of-range episode windows.
pub fn validate_range(anime: &AnimeRecord, from: i64, to: i64) -> ServiceResult<()> {
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
    if to > anime.episode_count {
        return Err(ServiceError::RangeExceeded(format!(
            "Episode {} exceeds the known episode count {}",
            to, anime.episode_count
        )));
    }
    Ok(())
}
