/*!
 * Catalog pagination tests: page-count probing, ordered concatenation
 * and staggered dispatch, all against a local HTTP fixture.
 */

use std::time::{Duration, Instant};

use pahedl::catalog::EpisodeCatalogResolver;
use pahedl::credentials::CookieMap;
use pahedl::database::Repository;
use pahedl::origin::OriginClient;

use crate::common::fixture::{FixtureRoute, FixtureServer};

/// Three catalog pages plus the probe. Page routes go first because
/// the probe matcher is a prefix of the page targets.
fn catalog_routes(first_page_delay: Duration) -> Vec<FixtureRoute> {
    vec![
        FixtureRoute::json(
            "page=1",
            r#"{"data":[{"session":"ep-a"},{"session":"ep-b"}]}"#,
        )
        .with_delay(first_page_delay),
        FixtureRoute::json("page=2", r#"{"data":[{"session":"ep-c"}]}"#),
        FixtureRoute::json("page=3", r#"{"data":[{"session":"ep-d"}]}"#),
        FixtureRoute::json("m=release&id=ext-1", r#"{"total":4,"last_page":3}"#),
    ]
}

fn resolver_for(server: &FixtureServer, stagger: Duration) -> EpisodeCatalogResolver {
    let origin = OriginClient::new(server.url(), Duration::from_secs(5))
        .expect("Failed to build origin client");
    let repo = Repository::new_in_memory().expect("Failed to create repo");
    EpisodeCatalogResolver::new(origin, repo, stagger)
}

#[tokio::test]
async fn test_listEpisodes_withSlowFirstPage_shouldStillConcatenateInPageOrder() {
    // Page 1 answers last; the result must still lead with its entries.
    let server = FixtureServer::start(catalog_routes(Duration::from_millis(250))).await;
    let catalog = resolver_for(&server, Duration::from_millis(10));

    let episodes = catalog
        .list_episodes("ext-1", &CookieMap::new())
        .await
        .expect("list failed");

    let sessions: Vec<&str> = episodes.iter().map(|e| e.session.as_str()).collect();
    assert_eq!(sessions, vec!["ep-a", "ep-b", "ep-c", "ep-d"]);
}

#[tokio::test]
async fn test_listEpisodes_shouldDispatchPagesStaggeredInAscendingOrder() {
    let server = FixtureServer::start(catalog_routes(Duration::ZERO)).await;
    let stagger = Duration::from_millis(60);
    let catalog = resolver_for(&server, stagger);

    let started = Instant::now();
    catalog
        .list_episodes("ext-1", &CookieMap::new())
        .await
        .expect("list failed");

    // Page k waits k stagger intervals, so the whole fetch cannot
    // finish before the last page was even dispatched.
    assert!(started.elapsed() >= stagger * 3);

    let page_requests: Vec<String> = server
        .request_log()
        .into_iter()
        .filter(|line| line.contains("page="))
        .collect();
    assert_eq!(page_requests.len(), 3);
    assert!(page_requests[0].contains("page=1"));
    assert!(page_requests[1].contains("page=2"));
    assert!(page_requests[2].contains("page=3"));
}

#[tokio::test]
async fn test_listEpisodes_calledTwice_shouldProbePageCountOnce() {
    let server = FixtureServer::start(catalog_routes(Duration::ZERO)).await;
    let catalog = resolver_for(&server, Duration::from_millis(5));

    let cookies = CookieMap::new();
    catalog
        .list_episodes("ext-1", &cookies)
        .await
        .expect("first list failed");
    catalog
        .list_episodes("ext-1", &cookies)
        .await
        .expect("second list failed");

    let probes = server
        .request_log()
        .into_iter()
        .filter(|line| line.contains("m=release") && !line.contains("page="))
        .count();
    assert_eq!(probes, 1);
}
