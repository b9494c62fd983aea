/*!
 * Controller-level tests: input validation ordering, missing-record
 * handling and one-shot session consumption.
 *
 * Every test here runs against an in-memory store, a static credential
 * source and a scripted resolver; the origin client points at a closed
 * local port, so any accidental network call fails fast and loudly.
 */

use std::sync::Arc;
use std::time::Duration;

use pahedl::app_config::Config;
use pahedl::app_controller::Controller;
use pahedl::bulk::{ArchiveStrategy, EpisodeLinkResolver};
use pahedl::credentials::CredentialSource;
use pahedl::database::models::{AnimeRecord, DownloadSessionRecord, ResolvedLinkRecord};
use pahedl::database::Repository;
use pahedl::origin::OriginClient;

use crate::common::fixture::{FixtureRoute, FixtureServer};
use crate::common::mocks::{ScriptedResolver, StaticCredentials};

fn test_config() -> Config {
    let mut config = Config::default();
    // Keep accidental media fetches from hanging the suite, and let
    // tiny fixture payloads count as plausible media.
    config.bulk.media_timeout_secs = 1;
    config.bulk.min_media_bytes = 16;
    config
}

fn controller_with(resolver: Arc<ScriptedResolver>) -> (Controller, Repository) {
    let repo = Repository::new_in_memory().expect("Failed to create repo");
    let credentials: Arc<dyn CredentialSource> = Arc::new(StaticCredentials::new());
    let origin = OriginClient::new("http://127.0.0.1:9", Duration::from_secs(1))
        .expect("Failed to build origin client");

    let resolver: Arc<dyn EpisodeLinkResolver> = resolver;
    let controller = Controller::with_parts(&test_config(), repo.clone(), credentials, origin, resolver)
        .expect("Failed to build controller");
    (controller, repo)
}

async fn seed_anime(repo: &Repository) {
    repo.upsert_anime(&AnimeRecord {
        internal_id: "OP1234".to_string(),
        external_id: "ext-abc".to_string(),
        title: "One Piece".to_string(),
        episode_count: 24,
    })
    .await
    .expect("Failed to seed anime");
}

fn dead_link(episode: i64) -> ResolvedLinkRecord {
    ResolvedLinkRecord {
        internal_id: "OP1234".to_string(),
        episode,
        direct_link: format!("http://127.0.0.1:9/ep{}.mp4", episode),
        size: None,
        snapshot: None,
    }
}

#[tokio::test]
async fn test_search_withEmptyQuery_shouldFailValidation() {
    let (controller, _) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let err = controller.search("   ").await.expect_err("should fail");
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_resolveEpisode_withZeroEpisode_shouldFailBeforeLookup() {
    let resolver = Arc::new(ScriptedResolver::new(vec![]));
    let (controller, repo) = controller_with(resolver.clone());
    seed_anime(&repo).await;

    let err = controller
        .resolve_episode("OP1234", 0)
        .await
        .expect_err("should fail");

    assert_eq!(err.status(), 400);
    assert_eq!(resolver.request_count(), 0);
}

#[tokio::test]
async fn test_resolveEpisode_withUnknownAnime_shouldBeNotFound() {
    let (controller, _) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let err = controller
        .resolve_episode("ZZ0000", 1)
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_resolveEpisode_withOriginDown_shouldBeUpstreamUnavailable() {
    let resolver = Arc::new(ScriptedResolver::new(vec![]));
    let (controller, repo) = controller_with(resolver.clone());
    seed_anime(&repo).await;

    // The episode-count refresh goes to the origin before any
    // resolution work starts.
    let err = controller
        .resolve_episode("OP1234", 1)
        .await
        .expect_err("should fail");

    assert_eq!(err.status(), 503);
    assert_eq!(resolver.request_count(), 0);
}

#[tokio::test]
async fn test_resolveRange_withInvertedRange_shouldFailBeforeAnyCall() {
    let resolver = Arc::new(ScriptedResolver::new(vec![]));
    let (controller, repo) = controller_with(resolver.clone());
    seed_anime(&repo).await;

    let err = controller
        .resolve_range("OP1234", 5, 2)
        .await
        .expect_err("should fail");

    assert_eq!(err.status(), 400);
    assert_eq!(resolver.request_count(), 0);
}

#[tokio::test]
async fn test_resolveRange_withZeroStart_shouldFailValidation() {
    let (controller, _) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let err = controller
        .resolve_range("OP1234", 0, 3)
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_archiveSession_withUnknownId_shouldBeNotFound() {
    let (controller, _) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let err = controller
        .archive_session("no-such-session", ArchiveStrategy::DiskStaged)
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_archiveSession_withFailedAssembly_shouldLeaveSessionRetryable() {
    let (controller, repo) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let session = DownloadSessionRecord::new(
        "11111111-2222-3333-4444-555555555555".to_string(),
        "OP1234".to_string(),
        "One Piece".to_string(),
        vec![dead_link(1)],
    );
    repo.create_download_session(&session)
        .await
        .expect("Failed to seed session");

    // All links point at a closed port, so assembly fails before the
    // session is consumed; a retry must see the session again rather
    // than a missing-session error.
    let first = controller
        .archive_session(&session.session_id, ArchiveStrategy::MemoryStaged)
        .await
        .expect_err("should fail");
    assert_eq!(first.status(), 503);

    let second = controller
        .archive_session(&session.session_id, ArchiveStrategy::MemoryStaged)
        .await
        .expect_err("should fail");
    assert_eq!(second.status(), 503);

    let remaining = repo
        .get_download_session(&session.session_id)
        .await
        .expect("get failed");
    assert!(remaining.is_some());
}

#[tokio::test]
async fn test_archiveSession_withSuccessfulAssembly_shouldConsumeSession() {
    let server = FixtureServer::start(vec![FixtureRoute::media("/ep1.mp4", 64)]).await;
    let (controller, repo) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let session = DownloadSessionRecord::new(
        "11111111-2222-3333-4444-555555555555".to_string(),
        "OP1234".to_string(),
        "One Piece".to_string(),
        vec![ResolvedLinkRecord {
            internal_id: "OP1234".to_string(),
            episode: 1,
            direct_link: format!("{}/ep1.mp4", server.url()),
            size: None,
            snapshot: None,
        }],
    );
    repo.create_download_session(&session)
        .await
        .expect("Failed to seed session");

    let archive = controller
        .archive_session(&session.session_id, ArchiveStrategy::MemoryStaged)
        .await
        .expect("archive failed");
    assert!(archive.filename.ends_with(".zip"));

    // The session is single-use once an archive was handed back
    let second = controller
        .archive_session(&session.session_id, ArchiveStrategy::MemoryStaged)
        .await
        .expect_err("should fail");
    assert_eq!(second.status(), 404);
}

#[tokio::test]
async fn test_archiveLinks_withNoLinks_shouldFailValidation() {
    let (controller, _) = controller_with(Arc::new(ScriptedResolver::new(vec![])));

    let err = controller
        .archive_links("One Piece", vec![], ArchiveStrategy::MemoryStaged)
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_stats_withSeededStore_shouldCount() {
    let (controller, repo) = controller_with(Arc::new(ScriptedResolver::new(vec![])));
    seed_anime(&repo).await;

    let stats = controller.stats().expect("stats failed");
    assert_eq!(stats.anime_count, 1);
    assert_eq!(stats.link_count, 0);
}
