/*!
 * Episode catalog resolution.
 *
 * The origin lists a release's episodes across numbered pages. This
 * module learns the page count (probing once and persisting it), then
 * fetches every page concurrently with a fixed linear stagger so the
 * burst stays under the origin's implicit rate limits while the
 * requests still overlap in flight.
 */

use futures::future::try_join_all;
use log::{debug, info};
use std::time::Duration;

use crate::credentials::CookieMap;
use crate::database::models::PageCountRecord;
use crate::database::Repository;
use crate::errors::{ServiceError, ServiceResult};
use crate::origin::{CatalogEntry, OriginClient};

/// Resolves the full ordered episode list for one release.
///
/// The returned list is positional: the entry at index k is episode
/// k+1, which is exactly how callers index into it.
pub struct EpisodeCatalogResolver {
    /// Origin API client
    origin: OriginClient,
    /// Page-count cache
    repo: Repository,
    /// Per-page dispatch stagger
    stagger: Duration,
}

impl EpisodeCatalogResolver {
    /// Create a new catalog resolver
    pub fn new(origin: OriginClient, repo: Repository, stagger: Duration) -> Self {
        Self {
            origin,
            repo,
            stagger,
        }
    }

    /// Learn the page count for an external id, probing the origin on
    /// first sight and persisting the answer idempotently.
    async fn page_count(&self, external_id: &str, cookies: &CookieMap) -> ServiceResult<i64> {
        if let Some(record) = self.repo.get_page_count(external_id).await? {
            debug!(
                "Using cached page count {} for {}",
                record.page_count, external_id
            );
            return Ok(record.page_count);
        }

        let probe = self.origin.release_probe(external_id, cookies).await?;

        let Some(page_count) = probe.last_page else {
            return Err(ServiceError::NotFound(format!(
                "Origin reports no pages for release {}",
                external_id
            )));
        };

        self.repo
            .insert_page_count(&PageCountRecord {
                external_id: external_id.to_string(),
                page_count,
                episode_total: probe.total.unwrap_or(0),
            })
            .await?;

        Ok(page_count)
    }

    /// Fetch the full ordered episode list for one release.
    ///
    /// Pages are dispatched concurrently, page k delayed by k times the
    /// stagger interval; results are concatenated in ascending page
    /// order regardless of completion order.
    pub async fn list_episodes(
        &self,
        external_id: &str,
        cookies: &CookieMap,
    ) -> ServiceResult<Vec<CatalogEntry>> {
        let page_count = self.page_count(external_id, cookies).await?;

        info!(
            "Fetching {} catalog pages for {} with {:?} stagger",
            page_count, external_id, self.stagger
        );

        let fetches = (1..=page_count).map(|page| {
            let origin = self.origin.clone();
            let cookies = cookies.clone();
            let external_id = external_id.to_string();
            let delay = self.stagger * page as u32;

            async move {
                tokio::time::sleep(delay).await;
                origin.release_page(&external_id, page, &cookies).await
            }
        });

        // try_join_all yields results in input order, so pages land
        // already sorted.
        let pages = try_join_all(fetches).await?;

        let episodes: Vec<CatalogEntry> = pages.into_iter().flatten().collect();
        debug!(
            "Catalog for {} resolved to {} entries",
            external_id,
            episodes.len()
        );

        Ok(episodes)
    }
}
