// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Milliseconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initializes the descriptions for all the metrics in the SDK.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "query_cache_hits_total",
        Unit::Count,
        "Subscriptions served from a fresh cache entry without a fetch."
    );
    describe_counter!(
        "query_cache_miss_total",
        Unit::Count,
        "Subscriptions or invalidations that required a fetch."
    );
    describe_counter!(
        "query_inflight_joins_total",
        Unit::Count,
        "Fetch requests that joined an in-flight fetch instead of issuing a new one."
    );
    describe_counter!(
        "query_stale_results_dropped_total",
        Unit::Count,
        "Fetch results discarded because the entry was reset while they were in flight."
    );
    describe_gauge!("query_cache_entries", "Number of cache entries alive in the query client.");
    describe_counter!(
        "http_fetch_total",
        Unit::Count,
        "HTTP fetches issued by fetch services, labeled by outcome."
    );
    describe_histogram!(
        "http_fetch_latency_ms",
        Unit::Milliseconds,
        "HTTP fetch latency in milliseconds."
    );
    describe_counter!(
        "store_updates_total",
        Unit::Count,
        "Mutations applied through the store update entry point."
    );
    describe_counter!(
        "store_notifications_total",
        Unit::Count,
        "Selection notifications emitted because a selected slice changed."
    );
    describe_counter!(
        "rpc_calls_total",
        Unit::Count,
        "On-chain JSON-RPC reads, labeled by method."
    );
}

/// Starts the Prometheus scrape endpoint.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

pub fn increment_cache_hit(kind: &str) {
    counter!("query_cache_hits_total", 1, "kind" => kind.to_string());
}

pub fn increment_cache_miss(kind: &str) {
    counter!("query_cache_miss_total", 1, "kind" => kind.to_string());
}

pub fn increment_inflight_join(kind: &str) {
    counter!("query_inflight_joins_total", 1, "kind" => kind.to_string());
}

pub fn increment_stale_result_dropped(kind: &str) {
    counter!("query_stale_results_dropped_total", 1, "kind" => kind.to_string());
}

pub fn set_cache_entries(count: f64) {
    gauge!("query_cache_entries", count);
}

pub fn record_http_fetch(endpoint: &str, outcome: &str, duration: std::time::Duration) {
    counter!("http_fetch_total", 1,
             "endpoint" => endpoint.to_string(),
             "outcome" => outcome.to_string());
    histogram!("http_fetch_latency_ms", duration.as_millis() as f64,
               "endpoint" => endpoint.to_string());
}

pub fn increment_store_update(store: &str) {
    counter!("store_updates_total", 1, "store" => store.to_string());
}

pub fn increment_store_notification(store: &str) {
    counter!("store_notifications_total", 1, "store" => store.to_string());
}

pub fn increment_rpc_call(method: &str) {
    counter!("rpc_calls_total", 1, "method" => method.to_string());
}
