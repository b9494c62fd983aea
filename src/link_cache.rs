/*!
 * Resolved-link cache with liveness probing.
 *
 * Direct media URLs expire server-side at an unknown time, so a cache
 * hit is only trusted after a successful HEAD probe. A failed probe
 * degrades the entry to a miss for that call; the row is kept, since a
 * later resolution overwrites it anyway and a transient probe failure
 * should not cost a stored link.
 */

use anyhow::Context;
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;

use crate::database::models::ResolvedLinkRecord;
use crate::database::Repository;
use crate::errors::ServiceResult;

/// Cache of resolved direct links, validated on read
#[derive(Clone)]
pub struct VideoLinkCache {
    repo: Repository,
    probe_client: Client,
}

impl VideoLinkCache {
    /// Create a cache over the given repository
    pub fn new(repo: Repository, probe_timeout: Duration) -> anyhow::Result<Self> {
        let probe_client = Client::builder()
            .timeout(probe_timeout)
            .user_agent(crate::origin::USER_AGENT)
            .build()
            .context("Failed to build liveness probe client")?;

        Ok(Self { repo, probe_client })
    }

    /// Look up a cached link and verify it still answers.
    ///
    /// Returns None on a stale or unprobeable link as well as on a
    /// plain miss.
    pub async fn get_live(
        &self,
        internal_id: &str,
        episode: i64,
    ) -> ServiceResult<Option<ResolvedLinkRecord>> {
        let Some(record) = self.repo.get_resolved_link(internal_id, episode).await? else {
            return Ok(None);
        };

        match self.probe(&record.direct_link).await {
            Ok(true) => {
                debug!("Cache hit for {} episode {} (link live)", internal_id, episode);
                Ok(Some(record))
            }
            Ok(false) => {
                debug!(
                    "Cached link for {} episode {} no longer answers, treating as miss",
                    internal_id, episode
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "Liveness probe failed for {} episode {}: {}",
                    internal_id, episode, e
                );
                Ok(None)
            }
        }
    }

    /// Store a freshly resolved link, replacing any previous entry.
    pub async fn put(&self, record: &ResolvedLinkRecord) -> ServiceResult<()> {
        self.repo.upsert_resolved_link(record).await?;
        debug!(
            "Cached direct link for {} episode {}",
            record.internal_id, record.episode
        );
        Ok(())
    }

    async fn probe(&self, url: &str) -> Result<bool, reqwest::Error> {
        let response = self.probe_client.head(url).send().await?;
        Ok(response.status().is_success())
    }
}
