mod common;

use common::{repo_list, FakeSearcher};
use reposcout::{
    CacheEntry, ClientConfig, ClientState, SearchArgs, SearchBackendClient, SearchContext,
    SearchError, Searcher,
};
use std::sync::Arc;
use std::time::Duration;

fn steady_config() -> ClientConfig {
    ClientConfig {
        refresh_jitter: Duration::ZERO,
        ..ClientConfig::default()
    }
}

fn client_for(fake: &Arc<FakeSearcher>, config: ClientConfig) -> SearchBackendClient {
    let searcher: Arc<dyn Searcher> = fake.clone();
    SearchBackendClient::new(Some(searcher), config)
}

/// Lets spawned tasks run without moving the paused clock meaningfully
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn names(client_result: &reposcout::RepositorySet) -> Vec<String> {
    let mut names: Vec<String> = client_result.names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test(start_paused = true)]
async fn test_cold_list_all_fetches_once_and_starts_refresher() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo", "acme/bar"]));
    let client = client_for(&fake, ClientConfig::default());
    let ctx = SearchContext::background();

    assert_eq!(client.state(), ClientState::Idle);
    let set = client.list_all(&ctx).await.unwrap();
    assert_eq!(names(&set), vec!["acme/bar", "acme/foo"]);
    assert_eq!(client.state(), ClientState::Running);
    assert_eq!(fake.list_all_calls(), 1);

    // The refresher publishes its own fetch right away
    settle().await;
    assert_eq!(fake.list_all_calls(), 2);
    assert!(matches!(client.cache_entry(), CacheEntry::Ready(_)));

    let cached = client.list_all(&ctx).await.unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(fake.list_all_calls(), 2);

    let stats = client.metrics().get_stats();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.refresh_successes, 1);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_readers_share_the_published_snapshot() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, steady_config());
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    settle().await;

    let first = client.list_all(&ctx).await.unwrap();
    let second = client.clone().list_all(&ctx).await.unwrap();
    assert!(first.same_snapshot(&second));

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_interval_with_default_jitter() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, ClientConfig::default());

    client.list_all(&SearchContext::background()).await.unwrap();
    settle().await;
    assert_eq!(fake.list_all_calls(), 2);

    // Next refresh lands somewhere in [4.5s, 5.5s]
    tokio::time::sleep(Duration::from_millis(4400)).await;
    assert_eq!(fake.list_all_calls(), 2);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(fake.list_all_calls(), 3);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_picks_up_new_repositories() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, steady_config());
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    settle().await;

    fake.set_fallback(Ok(repo_list(&["acme/foo", "acme/new"])));
    assert_eq!(client.list_all(&ctx).await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let set = client.list_all(&ctx).await.unwrap();
    assert_eq!(names(&set), vec!["acme/foo", "acme/new"]);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_hidden_until_threshold() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, steady_config());
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    settle().await;
    fake.set_fallback(Err(SearchError::backend("index server down")));

    // Check halfway between refreshes, which happen every 5s
    tokio::time::sleep(Duration::from_millis(2500)).await;
    for failures in 1..=3 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let set = client
            .list_all(&ctx)
            .await
            .unwrap_or_else(|e| panic!("failure {} leaked to readers: {}", failures, e));
        assert_eq!(names(&set), vec!["acme/foo"]);
    }
    assert_eq!(client.metrics().get_stats().suppressed_failures, 3);

    // The fourth failure in a row is published
    tokio::time::sleep(Duration::from_secs(5)).await;
    let err = client.list_all(&ctx).await.unwrap_err();
    assert!(matches!(err, SearchError::Backend(_)));
    assert_eq!(client.metrics().get_stats().published_failures, 1);

    // One success clears it
    fake.set_fallback(Ok(repo_list(&["acme/bar"])));
    tokio::time::sleep(Duration::from_secs(5)).await;
    let set = client.list_all(&ctx).await.unwrap();
    assert_eq!(names(&set), vec!["acme/bar"]);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_cold_failure_is_returned_to_caller() {
    let fake = Arc::new(FakeSearcher::failing());
    let client = client_for(&fake, steady_config());
    let ctx = SearchContext::background();

    let err = client.list_all(&ctx).await.unwrap_err();
    assert!(matches!(err, SearchError::Backend(_)));
    settle().await;

    // The refresher's own failure is still below the threshold, so nothing is cached
    assert!(client.cache_entry().is_empty());
    assert!(client.list_all(&ctx).await.is_err());
    assert_eq!(fake.list_all_calls(), 3);
    assert_eq!(client.state(), ClientState::Running);

    client.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_cold_callers_start_one_refresher() {
    const CALLERS: usize = 32;

    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    fake.set_list_delay(Duration::from_millis(300));
    let client = client_for(&fake, steady_config());

    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.list_all(&SearchContext::background()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 1);
    }

    assert_eq!(client.state(), ClientState::Running);
    assert!(client.refresher_active());
    // Every caller fetched uncached, plus exactly one refresher fetch
    assert_eq!(fake.list_all_calls(), CALLERS + 1);
    assert_eq!(client.metrics().get_stats().cache_misses, CALLERS as u64);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_refresher() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, ClientConfig::default());
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    settle().await;
    assert!(client.refresher_active());

    client.close();
    client.close();
    assert_eq!(client.state(), ClientState::Stopped);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!client.refresher_active());

    let calls = fake.list_all_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fake.list_all_calls(), calls);

    // A closed client serves nothing and never restarts
    assert!(client.list_all(&ctx).await.unwrap().is_empty());
    assert_eq!(client.state(), ClientState::Stopped);
    assert_eq!(fake.list_all_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_close_before_first_use() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, ClientConfig::default());
    client.close();

    let set = client.list_all(&SearchContext::background()).await.unwrap();
    assert!(set.is_empty());
    assert_eq!(fake.list_all_calls(), 0);
    assert!(!client.refresher_active());
}

#[tokio::test(start_paused = true)]
async fn test_disable_serves_empty_and_reenable_restarts() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let client = client_for(&fake, steady_config());
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    settle().await;

    client.set_enabled(false);
    assert!(!client.enabled());
    assert!(client.list_all(&ctx).await.unwrap().is_empty());

    let result = client
        .search(
            &ctx,
            &SearchArgs {
                repos: vec![reposcout::RepositoryRevisions::new("acme/foo")],
                pattern: reposcout::PatternInfo::literal("needle"),
                ..SearchArgs::default()
            },
        )
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(fake.search_calls(), 0);

    // The refresher notices on its next wake-up and goes idle
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(client.state(), ClientState::Idle);
    assert!(!client.refresher_active());
    assert!(client.cache_entry().is_empty());

    client.set_enabled(true);
    let set = client.list_all(&ctx).await.unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(client.state(), ClientState::Running);

    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_disable_cache_always_fetches() {
    let fake = Arc::new(FakeSearcher::with_repos(&["acme/foo"]));
    let config = ClientConfig {
        disable_cache: true,
        ..ClientConfig::default()
    };
    let client = client_for(&fake, config);
    let ctx = SearchContext::background();

    client.list_all(&ctx).await.unwrap();
    client.list_all(&ctx).await.unwrap();
    settle().await;

    assert_eq!(fake.list_all_calls(), 2);
    assert_eq!(client.state(), ClientState::Idle);
}

#[tokio::test]
async fn test_client_without_backend() {
    let client = SearchBackendClient::new(None, ClientConfig::default());
    assert!(!client.enabled());
    assert_eq!(client.to_string(), "search-backend(<none>)");
    assert!(client
        .list_all(&SearchContext::background())
        .await
        .unwrap()
        .is_empty());
}
