use super::*;
use crate::errors::{FetchError, FetchResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Fetcher that counts calls, waits `delay`, then returns `value` or a 503.
fn counting_fetcher(
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    value: u64,
    delay: Duration,
) -> impl Fn() -> Pin<Box<dyn Future<Output = FetchResult<u64>> + Send>> + Send + Sync + 'static {
    move || {
        let calls = Arc::clone(&calls);
        let fail = Arc::clone(&fail);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(delay).await;
            if fail.load(Ordering::SeqCst) {
                Err(FetchError::FetchFailed {
                    status: 503,
                    endpoint: "https://example.org/stats".to_string(),
                })
            } else {
                Ok(value)
            }
        })
    }
}

fn counters() -> (Arc<AtomicUsize>, Arc<AtomicBool>) {
    (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicBool::new(false)))
}

fn balance_key(account: &str) -> QueryKey {
    QueryKey::new("balance")
        .with_param("account", account)
        .with_param("token", "OUSD")
}

#[tokio::test]
async fn test_equal_keys_share_one_in_flight_fetch() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let mut first = client
        .subscribe(
            balance_key("0xabc"),
            counting_fetcher(calls.clone(), fail.clone(), 10, Duration::from_millis(50)),
            QueryOptions::default(),
        )
        .unwrap();
    // same tuple, params inserted in the other order
    let key = QueryKey::new("balance")
        .with_param("token", "OUSD")
        .with_param("account", "0xabc");
    let mut second = client
        .subscribe(
            key,
            counting_fetcher(calls.clone(), fail.clone(), 10, Duration::from_millis(50)),
            QueryOptions::default(),
        )
        .unwrap();

    assert!(first.is_loading());
    let state = first.settled().await;
    assert_eq!(state.data, Some(10));
    assert_eq!(second.settled().await.data, Some(10));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.len(), 1);
}

#[tokio::test]
async fn test_concurrent_fetch_query_calls_are_deduplicated() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("ogvStats");

    let (a, b, c) = tokio::join!(
        client.fetch_query(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 5, Duration::from_millis(40))
        ),
        client.fetch_query(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 5, Duration::from_millis(40))
        ),
        client.fetch_query(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 5, Duration::from_millis(40))
        ),
    );
    assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (5, 5, 5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_query_data::<u64>(&key), Some(5));
}

#[tokio::test]
async fn test_disabled_query_never_fetches() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let mut observer = client
        .subscribe(
            balance_key("0x0"),
            counting_fetcher(calls.clone(), fail, 1, Duration::ZERO),
            QueryOptions::default().enabled(false),
        )
        .unwrap();

    assert!(!client.invalidate(&balance_key("0x0")));
    assert_eq!(client.notify_window_focus(), 0);
    let err = observer.refetch().await.unwrap_err();
    assert!(matches!(err, FetchError::PreconditionNotMet(_)));

    sleep(Duration::from_millis(20)).await;
    let state = observer.state();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(state.data.is_none());
    assert!(!state.is_loading());
}

#[tokio::test]
async fn test_keep_previous_data_survives_failed_refetch() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("apy").with_param("days", 30);

    let mut observer = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 42, Duration::from_millis(5)),
            QueryOptions::default().keep_previous_data(true),
        )
        .unwrap();
    assert_eq!(observer.settled().await.data, Some(42));

    fail.store(true, Ordering::SeqCst);
    assert!(client.invalidate(&key));
    // previous value stays visible while the refetch runs
    assert_eq!(observer.data(), Some(42));

    let state = observer.settled().await;
    assert_eq!(state.data, Some(42));
    assert_eq!(state.error.as_ref().and_then(FetchError::status), Some(503));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_refetch_clears_data_without_keep_previous() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("apy").with_param("days", 7);

    let mut observer = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls, fail.clone(), 42, Duration::from_millis(5)),
            QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(observer.settled().await.data, Some(42));

    fail.store(true, Ordering::SeqCst);
    assert!(client.invalidate(&key));
    let state = observer.settled().await;
    assert!(state.data.is_none());
    assert!(state.is_error());
    assert_eq!(state.status(), QueryStatus::Error);
}

#[tokio::test]
async fn test_fresh_entry_is_served_without_fetch() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("ogvStats");
    let options = || QueryOptions::default().stale_time(Duration::from_secs(60));

    let mut first = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 3, Duration::ZERO),
            options(),
        )
        .unwrap();
    first.settled().await;

    let second = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 3, Duration::ZERO),
            options(),
        )
        .unwrap();
    assert_eq!(second.data(), Some(3));
    assert!(!second.is_fetching());
    // fresh entries are not refetched on focus either
    assert_eq!(client.notify_window_focus(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_window_focus_respects_opt_out() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let mut opted_in = client
        .subscribe(
            QueryKey::new("price"),
            counting_fetcher(calls.clone(), fail.clone(), 1, Duration::ZERO),
            QueryOptions::default(),
        )
        .unwrap();
    let mut opted_out = client
        .subscribe(
            QueryKey::new("supply"),
            counting_fetcher(calls.clone(), fail.clone(), 2, Duration::ZERO),
            QueryOptions::default().refetch_on_window_focus(false),
        )
        .unwrap();
    opted_in.settled().await;
    opted_out.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(client.notify_window_focus(), 1);
    opted_in.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalidate_while_in_flight_refetches_once_after() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("ogvStats");

    let _observer = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail, 9, Duration::from_millis(30)),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(!client.invalidate(&key));
    assert!(!client.invalidate(&key));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!client.is_fetching(&key));
}

#[tokio::test]
async fn test_invalidate_kind_touches_only_that_kind() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let mut a = client
        .subscribe(
            balance_key("0xa"),
            counting_fetcher(calls.clone(), fail.clone(), 1, Duration::ZERO),
            QueryOptions::default(),
        )
        .unwrap();
    let mut b = client
        .subscribe(
            balance_key("0xb"),
            counting_fetcher(calls.clone(), fail.clone(), 2, Duration::ZERO),
            QueryOptions::default(),
        )
        .unwrap();
    let mut other = client
        .subscribe(
            QueryKey::new("apy"),
            counting_fetcher(calls.clone(), fail.clone(), 3, Duration::ZERO),
            QueryOptions::default(),
        )
        .unwrap();
    a.settled().await;
    b.settled().await;
    other.settled().await;

    assert_eq!(client.invalidate_kind("balance"), 2);
    a.settled().await;
    b.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_reset_drops_late_result() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = balance_key("0xdead");

    let mut observer = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail, 77, Duration::from_millis(30)),
            QueryOptions::default().initial_data(0),
        )
        .unwrap();
    assert!(observer.is_fetching());
    assert!(client.reset(&key));

    sleep(Duration::from_millis(80)).await;
    let state = observer.state();
    assert_eq!(state.data, Some(0));
    assert_eq!(state.fetch_count, 0);
    assert!(!state.is_fetching);

    assert_eq!(observer.refetch().await.unwrap(), 77);
    assert_eq!(observer.data(), Some(77));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_initial_data_shown_until_first_fetch() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let mut observer = client
        .subscribe(
            QueryKey::new("ogvPrice"),
            counting_fetcher(calls, fail, 12, Duration::from_millis(20)),
            QueryOptions::default().initial_data(0),
        )
        .unwrap();
    let state = observer.state();
    assert_eq!(state.data, Some(0));
    assert!(state.is_fetching);
    assert!(!state.is_loading());

    assert_eq!(observer.settled().await.data, Some(12));
}

#[tokio::test]
async fn test_refetch_interval_stops_when_observer_dropped() {
    let client = QueryClient::new();
    let (calls, fail) = counters();

    let observer = client
        .subscribe(
            QueryKey::new("ticker"),
            counting_fetcher(calls.clone(), fail, 1, Duration::ZERO),
            QueryOptions::default().refetch_interval(Duration::from_millis(20)),
        )
        .unwrap();
    sleep(Duration::from_millis(110)).await;
    let while_alive = calls.load(Ordering::SeqCst);
    assert!(while_alive >= 3, "expected interval refetches, got {}", while_alive);

    drop(observer);
    assert_eq!(client.observer_count(&QueryKey::new("ticker")), 0);
    sleep(Duration::from_millis(30)).await;
    let after_drop = calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(80)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_drop);
}

#[tokio::test]
async fn test_key_bound_to_other_type_is_rejected() {
    let client = QueryClient::new();
    client.set_query_data(QueryKey::new("apy"), 4.5_f64).unwrap();

    let result = client.subscribe(
        QueryKey::new("apy"),
        || async { Ok::<u64, FetchError>(1) },
        QueryOptions::default(),
    );
    assert!(matches!(result, Err(FetchError::PreconditionNotMet(_))));
    assert_eq!(client.get_query_data::<f64>(&QueryKey::new("apy")), Some(4.5));
}

#[tokio::test]
async fn test_failed_refetch_is_not_served_as_fresh() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("ogvStats");
    let options = || QueryOptions::default().stale_time(Duration::from_secs(60));

    let mut first = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 3, Duration::ZERO),
            options(),
        )
        .unwrap();
    assert_eq!(first.settled().await.data, Some(3));

    fail.store(true, Ordering::SeqCst);
    assert!(client.invalidate(&key));
    let state = first.settled().await;
    assert!(state.data.is_none());
    assert!(state.is_error());
    drop(first);

    fail.store(false, Ordering::SeqCst);
    let mut second = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 3, Duration::ZERO),
            options(),
        )
        .unwrap();
    assert!(second.is_fetching());
    let state = second.settled().await;
    assert_eq!(state.data, Some(3));
    assert!(state.error.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gated_observer_fetches_once_gate_opens() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let store = crate::store::Store::new("gate", false);

    let mut observer = client
        .subscribe(
            balance_key("0xabc"),
            counting_fetcher(calls.clone(), fail, 8, Duration::ZERO),
            QueryOptions::default().enabled_when(store.select(|open: &bool| *open)),
        )
        .unwrap();
    assert!(!observer.is_enabled());
    assert!(!observer.is_fetching());
    assert!(observer.refetch().await.is_err());

    store.update(|open| *open = true);
    assert!(observer.changed().await);
    assert!(observer.is_enabled());
    assert_eq!(observer.settled().await.data, Some(8));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.update(|open| *open = false);
    sleep(Duration::from_millis(20)).await;
    assert!(!observer.is_enabled());
    assert!(!client.invalidate(&balance_key("0xabc")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disabled_subscriber_does_not_replace_fetcher() {
    let client = QueryClient::new();
    let (calls, fail) = counters();
    let key = QueryKey::new("apy").with_param("days", 30);

    let mut enabled = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 1, Duration::ZERO),
            QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(enabled.settled().await.data, Some(1));

    let _disabled = client
        .subscribe(
            key.clone(),
            counting_fetcher(calls.clone(), fail.clone(), 2, Duration::ZERO),
            QueryOptions::default().enabled(false),
        )
        .unwrap();

    assert!(client.invalidate(&key));
    assert_eq!(enabled.settled().await.data, Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
