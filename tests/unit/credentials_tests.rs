/*!
 * Tests for the browser-backed credential cache
 */

use std::sync::Arc;
use std::time::Duration;

use pahedl::credentials::{BrowserCredentialCache, CredentialSource};

use crate::common::create_temp_dir;
use crate::common::mocks::ScriptedBrowser;

fn cache_with(
    browser: Arc<ScriptedBrowser>,
    cache_path: &std::path::Path,
) -> BrowserCredentialCache {
    BrowserCredentialCache::new(
        browser,
        "https://origin.test",
        Duration::from_millis(10),
        Duration::from_millis(1),
        cache_path,
    )
}

#[tokio::test]
async fn test_get_withEmptyCache_shouldHarvestAndPersist() {
    let dir = create_temp_dir().expect("temp dir failed");
    let cache_path = dir.path().join("cookies.json");
    let browser = Arc::new(ScriptedBrowser::with_cookies(vec![(
        "__ddg2_",
        "fresh",
        None,
    )]));

    let cache = cache_with(browser.clone(), &cache_path);
    let cookies = cache.get().await.expect("get failed").expect("no cookies");

    assert_eq!(cookies.get("__ddg2_").map(String::as_str), Some("fresh"));
    assert_eq!(*browser.harvest_count.lock(), 1);
    assert!(cache_path.exists());
}

#[tokio::test]
async fn test_get_calledTwice_shouldReuseFreshCookies() {
    let dir = create_temp_dir().expect("temp dir failed");
    let cache_path = dir.path().join("cookies.json");
    let browser = Arc::new(ScriptedBrowser::with_cookies(vec![(
        "__ddg2_",
        "fresh",
        None,
    )]));

    let cache = cache_with(browser.clone(), &cache_path);
    cache.get().await.expect("first get failed");
    cache.get().await.expect("second get failed");

    assert_eq!(*browser.harvest_count.lock(), 1);
}

#[tokio::test]
async fn test_get_withExpiredCache_shouldReacquire() {
    let dir = create_temp_dir().expect("temp dir failed");
    let cache_path = dir.path().join("cookies.json");
    std::fs::write(
        &cache_path,
        r#"{"__ddg2_":{"value":"stale","expires":1.0}}"#,
    )
    .expect("seed failed");

    let browser = Arc::new(ScriptedBrowser::with_cookies(vec![(
        "__ddg2_",
        "renewed",
        None,
    )]));
    let cache = cache_with(browser.clone(), &cache_path);

    let cookies = cache.get().await.expect("get failed").expect("no cookies");
    assert_eq!(cookies.get("__ddg2_").map(String::as_str), Some("renewed"));
    assert_eq!(*browser.harvest_count.lock(), 1);
}

#[tokio::test]
async fn test_get_withFailingBrowser_shouldFallBackToStaleCookies() {
    let dir = create_temp_dir().expect("temp dir failed");
    let cache_path = dir.path().join("cookies.json");
    std::fs::write(
        &cache_path,
        r#"{"__ddg2_":{"value":"stale","expires":1.0}}"#,
    )
    .expect("seed failed");

    let cache = cache_with(Arc::new(ScriptedBrowser::failing()), &cache_path);

    let cookies = cache.get().await.expect("get failed").expect("no cookies");
    assert_eq!(cookies.get("__ddg2_").map(String::as_str), Some("stale"));
}

#[tokio::test]
async fn test_get_withFailingBrowserAndNoCache_shouldReturnNone() {
    let dir = create_temp_dir().expect("temp dir failed");
    let cache_path = dir.path().join("cookies.json");

    let cache = cache_with(Arc::new(ScriptedBrowser::failing()), &cache_path);

    let cookies = cache.get().await.expect("get failed");
    assert!(cookies.is_none());
}
