/*!
 * Resolved-link cache tests: a cache hit counts only when the stored
 * link still answers a HEAD request, and a dead link degrades to a
 * miss without losing the stored row.
 */

use std::sync::Arc;
use std::time::Duration;

use pahedl::app_config::Config;
use pahedl::bulk::{CachedPipelineResolver, EpisodeLinkResolver, EpisodeResolveRequest};
use pahedl::catalog::EpisodeCatalogResolver;
use pahedl::credentials::CredentialSource;
use pahedl::database::models::ResolvedLinkRecord;
use pahedl::database::Repository;
use pahedl::link_cache::VideoLinkCache;
use pahedl::origin::OriginClient;
use pahedl::resolve::LinkResolutionPipeline;

use crate::common::fixture::{FixtureRoute, FixtureServer};
use crate::common::mocks::StaticCredentials;

fn stored_link(direct_link: &str) -> ResolvedLinkRecord {
    ResolvedLinkRecord {
        internal_id: "OP1234".to_string(),
        episode: 1,
        direct_link: direct_link.to_string(),
        size: Some("700 MB".to_string()),
        snapshot: None,
    }
}

async fn seeded_cache(direct_link: &str) -> (VideoLinkCache, Repository) {
    let repo = Repository::new_in_memory().expect("Failed to create repo");
    repo.upsert_resolved_link(&stored_link(direct_link))
        .await
        .expect("Failed to seed link");

    let cache =
        VideoLinkCache::new(repo.clone(), Duration::from_secs(2)).expect("Failed to build cache");
    (cache, repo)
}

#[tokio::test]
async fn test_getLive_withAnsweringLink_shouldHitViaHeadRequest() {
    let server = FixtureServer::start(vec![FixtureRoute::media("/ep1.mp4", 4)]).await;
    let link = format!("{}/ep1.mp4", server.url());
    let (cache, _) = seeded_cache(&link).await;

    let hit = cache.get_live("OP1234", 1).await.expect("get failed");
    assert_eq!(hit.expect("expected a hit").direct_link, link);

    // The check must not download the media
    assert_eq!(server.request_log(), vec!["HEAD /ep1.mp4".to_string()]);
}

#[tokio::test]
async fn test_getLive_withGoneLink_shouldMissButRetainRow() {
    let server = FixtureServer::start(vec![FixtureRoute::status("/ep1.mp4", 404)]).await;
    let link = format!("{}/ep1.mp4", server.url());
    let (cache, repo) = seeded_cache(&link).await;

    let hit = cache.get_live("OP1234", 1).await.expect("get failed");
    assert!(hit.is_none());

    // The row survives; a later resolution overwrites it
    let row = repo.get_resolved_link("OP1234", 1).await.expect("get failed");
    assert!(row.is_some());
}

#[tokio::test]
async fn test_getLive_withUnreachableHost_shouldMiss() {
    let (cache, _) = seeded_cache("http://127.0.0.1:9/ep1.mp4").await;

    let hit = cache.get_live("OP1234", 1).await.expect("get failed");
    assert!(hit.is_none());
}

#[tokio::test]
async fn test_getLive_withNoRow_shouldMissWithoutProbing() {
    let server = FixtureServer::start(vec![]).await;
    let repo = Repository::new_in_memory().expect("Failed to create repo");
    let cache =
        VideoLinkCache::new(repo, Duration::from_secs(2)).expect("Failed to build cache");

    let hit = cache.get_live("OP1234", 1).await.expect("get failed");
    assert!(hit.is_none());
    assert!(server.request_log().is_empty());
}

#[tokio::test]
async fn test_resolveEpisode_withLiveCachedLink_shouldSkipPipeline() {
    let server = FixtureServer::start(vec![FixtureRoute::media("/ep1.mp4", 4)]).await;
    let link = format!("{}/ep1.mp4", server.url());
    let (cache, repo) = seeded_cache(&link).await;

    // Catalog and pipeline point at a closed port; only the cached
    // link may be touched.
    let config = Config::default();
    let origin = OriginClient::new("http://127.0.0.1:9", Duration::from_secs(1))
        .expect("Failed to build origin client");
    let pipeline = Arc::new(
        LinkResolutionPipeline::new(origin.clone(), &config.resolve)
            .expect("Failed to build pipeline"),
    );
    let catalog = Arc::new(EpisodeCatalogResolver::new(
        origin,
        repo,
        Duration::from_millis(5),
    ));
    let credentials: Arc<dyn CredentialSource> = Arc::new(StaticCredentials::new());

    let resolver =
        CachedPipelineResolver::new(cache, pipeline, catalog, credentials, Duration::ZERO);

    let record = resolver
        .resolve_episode(&EpisodeResolveRequest {
            internal_id: "OP1234".to_string(),
            external_id: "ext-abc".to_string(),
            episode: 1,
            delay_before_fetch: false,
        })
        .await
        .expect("resolve failed");

    assert_eq!(record.direct_link, link);
}
