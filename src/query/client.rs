// src/query/client.rs

use super::entry::{box_fetcher, AnyEntry, QueryEntry};
use super::{QueryKey, QueryObserver, QueryOptions};
use crate::errors::{FetchError, FetchResult};
use crate::metrics;
use dashmap::DashMap;
use log::debug;
use std::future::Future;
use std::sync::Arc;

/// Read-through query cache shared by every consumer of a [`DappContext`].
///
/// Entries are keyed by [`QueryKey`] and live for the whole session; nothing
/// is evicted. Each entry runs at most one fetch at a time: concurrent
/// subscribers, invalidations and [`fetch_query`](Self::fetch_query) calls
/// all await the same shared result.
///
/// All methods that may start a fetch must be called from within a Tokio runtime.
///
/// [`DappContext`]: crate::context::DappContext
#[derive(Clone, Default)]
pub struct QueryClient {
    entries: Arc<DashMap<QueryKey, Arc<dyn AnyEntry>>>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry<T>(&self, key: &QueryKey) -> FetchResult<Arc<QueryEntry<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let erased = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(QueryEntry::<T>::new(key.clone())) as Arc<dyn AnyEntry>)
            .value()
            .clone();
        metrics::set_cache_entries(self.entries.len() as f64);

        erased.into_any().downcast::<QueryEntry<T>>().map_err(|_| {
            FetchError::precondition(format!(
                "query key {} is already bound to a different data type",
                key
            ))
        })
    }

    fn erased(&self, key: &QueryKey) -> Option<Arc<dyn AnyEntry>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    fn erased_of_kind(&self, kind: &str) -> Vec<Arc<dyn AnyEntry>> {
        self.entries
            .iter()
            .filter(|e| e.key().kind() == kind)
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Registers interest in `key`. Fetches when enabled and no fresh entry exists.
    /// A gated observer that starts closed fetches once its gate opens.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
        mut options: QueryOptions<T>,
    ) -> FetchResult<QueryObserver<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let entry = self.entry::<T>(&key)?;
        let mut gate = options.enabled_gate.take();
        let gate_open = gate.as_mut().map_or(true, |g| *g.borrow_and_update());
        let enabled = options.enabled && gate_open;

        let id = entry.register(box_fetcher(fetcher), &options, enabled);
        let observer = QueryObserver::new(Arc::clone(&entry), id, &options, gate);

        if !enabled {
            debug!("[query] {} subscribed disabled, not fetching", key);
            return Ok(observer);
        }
        if entry.needs_fetch() {
            metrics::increment_cache_miss(key.kind());
            let _in_flight = entry.start_fetch()?;
        } else {
            metrics::increment_cache_hit(key.kind());
            debug!("[query] {} served fresh from cache", key);
        }
        Ok(observer)
    }

    /// Awaitable read-through fetch. Fresh data is returned without a network
    /// call; otherwise joins the in-flight fetch or starts one.
    pub async fn fetch_query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> FetchResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let entry = self.entry::<T>(&key)?;
        entry.fetch_with(box_fetcher(fetcher)).await
    }

    /// Marks `key` stale and refetches it if an enabled observer is attached.
    /// Returns true when a refetch was started.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        match self.erased(key) {
            Some(entry) => entry.invalidate(),
            None => false,
        }
    }

    /// Invalidates every entry whose discriminator is `kind`. Returns how many refetched.
    pub fn invalidate_kind(&self, kind: &str) -> usize {
        self.erased_of_kind(kind)
            .into_iter()
            .filter(|entry| Arc::clone(entry).invalidate())
            .count()
    }

    /// Window regained focus: refetch stale entries that opted in.
    pub fn notify_window_focus(&self) -> usize {
        let entries: Vec<Arc<dyn AnyEntry>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        let refetched = entries
            .into_iter()
            .filter(|entry| Arc::clone(entry).window_focused())
            .count();
        debug!("[query] window focus refetched {} entries", refetched);
        refetched
    }

    /// Restores `key` to its seeded state. Results still in flight are dropped.
    pub fn reset(&self, key: &QueryKey) -> bool {
        match self.erased(key) {
            Some(entry) => {
                entry.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_kind(&self, kind: &str) -> usize {
        let entries = self.erased_of_kind(kind);
        for entry in &entries {
            entry.reset();
        }
        entries.len()
    }

    pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let erased = self.erased(key)?;
        let entry = erased.into_any().downcast::<QueryEntry<T>>().ok()?;
        entry.snapshot().data
    }

    /// Writes `value` as if it had just been fetched.
    pub fn set_query_data<T>(&self, key: QueryKey, value: T) -> FetchResult<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entry::<T>(&key)?.set_data(value);
        Ok(())
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.erased(key).map_or(false, |e| e.is_fetching())
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.erased(key).map_or(0, |e| e.observer_count())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
