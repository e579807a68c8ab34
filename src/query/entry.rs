// src/query/entry.rs

use super::{QueryKey, QueryOptions, QueryState};
use crate::errors::{FetchError, FetchResult};
use crate::metrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub(crate) type BoxFetcher<T> =
    Arc<dyn Fn() -> BoxFuture<'static, FetchResult<T>> + Send + Sync>;
pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

pub(crate) fn box_fetcher<T, F, Fut>(fetcher: F) -> BoxFetcher<T>
where
    T: 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    Arc::new(move || fetcher().boxed())
}

/// One subscriber's registration. `enabled` can flip after subscribe when the
/// observer is gated on store state.
struct ObserverSlot<T> {
    enabled: bool,
    refetch_on_window_focus: bool,
    fetcher: BoxFetcher<T>,
}

/// Bookkeeping guarded by the entry mutex. `state` lives beside it in a watch
/// channel; lock order is always registration first, then state.
struct Registration<T> {
    /// Fetcher of the most recently enabled observer.
    fetcher: Option<BoxFetcher<T>>,
    in_flight: Option<SharedFetch<T>>,
    invalidated: bool,
    /// Bumped by `reset`; results from older generations are dropped.
    generation: u64,
    keep_previous_data: bool,
    stale_time: Duration,
    initial_data: Option<T>,
    next_observer: u64,
    observers: HashMap<u64, ObserverSlot<T>>,
}

impl<T> Registration<T> {
    fn enabled_observers(&self) -> usize {
        self.observers.values().filter(|o| o.enabled).count()
    }

    fn focus_observers(&self) -> usize {
        self.observers
            .values()
            .filter(|o| o.enabled && o.refetch_on_window_focus)
            .count()
    }
}

pub(crate) struct QueryEntry<T> {
    key: QueryKey,
    inner: Mutex<Registration<T>>,
    state: watch::Sender<QueryState<T>>,
}

impl<T> QueryEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(key: QueryKey) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            key,
            inner: Mutex::new(Registration {
                fetcher: None,
                in_flight: None,
                invalidated: false,
                generation: 0,
                keep_previous_data: false,
                stale_time: Duration::ZERO,
                initial_data: None,
                next_observer: 0,
                observers: HashMap::new(),
            }),
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registration<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn key(&self) -> &QueryKey {
        &self.key
    }

    pub(crate) fn watch(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub(crate) fn snapshot(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Adds an observer and returns its id. A disabled observer's fetcher is
    /// only installed when the entry has none yet.
    pub(crate) fn register(
        &self,
        fetcher: BoxFetcher<T>,
        options: &QueryOptions<T>,
        enabled: bool,
    ) -> u64 {
        let mut inner = self.lock();
        if enabled || inner.fetcher.is_none() {
            inner.fetcher = Some(Arc::clone(&fetcher));
        }
        inner.keep_previous_data = options.keep_previous_data;
        inner.stale_time = options.stale_time;
        let id = inner.next_observer;
        inner.next_observer += 1;
        inner.observers.insert(
            id,
            ObserverSlot {
                enabled,
                refetch_on_window_focus: options.refetch_on_window_focus,
                fetcher,
            },
        );

        if let Some(initial) = &options.initial_data {
            if inner.initial_data.is_none() {
                inner.initial_data = Some(initial.clone());
            }
            self.state.send_if_modified(|s| {
                if s.data.is_none() && s.fetch_count == 0 && !s.is_fetching {
                    s.data = Some(initial.clone());
                    true
                } else {
                    false
                }
            });
        }
        id
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.lock().observers.remove(&id);
    }

    pub(crate) fn observer_enabled(&self, id: u64) -> bool {
        self.lock().observers.get(&id).map_or(false, |o| o.enabled)
    }

    /// Flips one observer's gate. Turning it on installs its fetcher and
    /// fetches when the entry is stale. Returns true when a fetch was started.
    pub(crate) fn set_observer_enabled(self: &Arc<Self>, id: u64, enabled: bool) -> bool {
        let mut inner = self.lock();
        let fetcher = match inner.observers.get_mut(&id) {
            Some(slot) if slot.enabled != enabled => {
                slot.enabled = enabled;
                Arc::clone(&slot.fetcher)
            }
            _ => return false,
        };
        debug!("[query] {} observer {} enabled={}", self.key, id, enabled);
        if !enabled {
            return false;
        }
        inner.fetcher = Some(Arc::clone(&fetcher));
        if inner.in_flight.is_some() || !self.is_stale(&inner) {
            return false;
        }
        metrics::increment_cache_miss(self.key.kind());
        let _in_flight = self.start_fetch_locked(&mut inner, fetcher);
        true
    }

    /// Fresh means a successful value newer than `stale_time` that no later
    /// failure has superseded.
    fn is_stale(&self, inner: &Registration<T>) -> bool {
        if inner.invalidated {
            return true;
        }
        let state = self.state.borrow();
        match state.updated_at {
            Some(at) => {
                state.data.is_none()
                    || state.error_updated_at.map_or(false, |failed| failed > at)
                    || at.elapsed() >= inner.stale_time
            }
            None => true,
        }
    }

    pub(crate) fn needs_fetch(&self) -> bool {
        let inner = self.lock();
        self.is_stale(&inner)
    }

    /// Fetch on behalf of one observer; fails while that observer is disabled.
    pub(crate) fn fetch_for(self: &Arc<Self>, id: u64) -> FetchResult<SharedFetch<T>> {
        let mut inner = self.lock();
        if !inner.observers.get(&id).map_or(false, |o| o.enabled) {
            return Err(FetchError::precondition(format!(
                "query {} is disabled",
                self.key
            )));
        }
        self.start_registered_locked(&mut inner)
    }

    /// Starts a fetch with the registered fetcher, or joins the one in flight.
    pub(crate) fn start_fetch(self: &Arc<Self>) -> FetchResult<SharedFetch<T>> {
        let mut inner = self.lock();
        self.start_registered_locked(&mut inner)
    }

    /// Read-through: fresh data is returned as-is, otherwise joins or starts a fetch.
    /// `fetcher` is installed only when the entry has none yet.
    pub(crate) fn fetch_with(self: &Arc<Self>, fetcher: BoxFetcher<T>) -> SharedFetch<T> {
        let mut inner = self.lock();
        if inner.in_flight.is_none() && !self.is_stale(&inner) {
            let cached = self.state.borrow().data.clone();
            if let Some(data) = cached {
                metrics::increment_cache_hit(self.key.kind());
                return futures::future::ready(Ok(data)).boxed().shared();
            }
        }
        if inner.fetcher.is_none() {
            inner.fetcher = Some(Arc::clone(&fetcher));
        }
        self.start_fetch_locked(&mut inner, fetcher)
    }

    fn start_registered_locked(
        self: &Arc<Self>,
        inner: &mut Registration<T>,
    ) -> FetchResult<SharedFetch<T>> {
        let fetcher = inner.fetcher.clone().ok_or_else(|| {
            FetchError::precondition(format!("no fetcher registered for {}", self.key))
        })?;
        Ok(self.start_fetch_locked(inner, fetcher))
    }

    fn start_fetch_locked(
        self: &Arc<Self>,
        inner: &mut Registration<T>,
        fetcher: BoxFetcher<T>,
    ) -> SharedFetch<T> {
        if let Some(in_flight) = &inner.in_flight {
            metrics::increment_inflight_join(self.key.kind());
            debug!("[query] {} joined in-flight fetch", self.key);
            return in_flight.clone();
        }

        let generation = inner.generation;
        let keep_previous_data = inner.keep_previous_data;
        inner.invalidated = false;

        let entry = Arc::clone(self);
        let fetch = async move {
            let result = fetcher().await;
            entry.complete(generation, &result);
            result
        }
        .boxed()
        .shared();
        inner.in_flight = Some(fetch.clone());

        self.state.send_modify(|s| {
            s.is_fetching = true;
            if !keep_previous_data && s.updated_at.is_some() {
                s.data = None;
            }
        });
        debug!("[query] {} fetch started (generation {})", self.key, generation);

        // Drive the fetch even if every caller drops its handle; no abort on teardown.
        tokio::spawn(fetch.clone());
        fetch
    }

    fn complete(self: &Arc<Self>, generation: u64, result: &FetchResult<T>) {
        let refetch = {
            let mut inner = self.lock();
            if inner.generation != generation {
                metrics::increment_stale_result_dropped(self.key.kind());
                debug!(
                    "[query] {} dropped result from generation {} (now {})",
                    self.key, generation, inner.generation
                );
                return;
            }
            inner.in_flight = None;
            let keep_previous_data = inner.keep_previous_data;
            let now = Instant::now();
            self.state.send_modify(|s| {
                s.is_fetching = false;
                s.fetch_count = s.fetch_count.saturating_add(1);
                match result {
                    Ok(value) => {
                        s.data = Some(value.clone());
                        s.error = None;
                        s.updated_at = Some(now);
                    }
                    Err(e) => {
                        s.error = Some(e.clone());
                        s.error_updated_at = Some(now);
                        if !keep_previous_data {
                            s.data = None;
                        }
                    }
                }
            });
            inner.invalidated && inner.enabled_observers() > 0
        };

        if let Err(e) = result {
            warn!("[query] {} fetch failed: {}", self.key, e);
        }
        if refetch {
            debug!("[query] {} invalidated while in flight, refetching", self.key);
            if let Err(e) = self.start_fetch() {
                warn!("[query] {} refetch after invalidation failed: {}", self.key, e);
            }
        }
    }

    pub(crate) fn set_data(&self, value: T) {
        let _inner = self.lock();
        self.state.send_modify(|s| {
            s.data = Some(value);
            s.error = None;
            s.updated_at = Some(Instant::now());
        });
    }

    /// Interval refetches for observer `id`; ticks are skipped while it is disabled.
    pub(crate) fn spawn_refetch_interval(
        self: &Arc<Self>,
        id: u64,
        period: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately; subscribe already covered it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entry) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = entry.fetch_for(id) {
                    debug!("[query] interval refetch skipped: {}", e);
                }
            }
        })
    }
}

/// Type-erased view used by the client for key-only operations.
pub(crate) trait AnyEntry: Send + Sync {
    fn key(&self) -> &QueryKey;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    /// Marks stale; returns true when a refetch was started.
    fn invalidate(self: Arc<Self>) -> bool;
    fn window_focused(self: Arc<Self>) -> bool;
    fn reset(&self);
    fn observer_count(&self) -> usize;
    fn is_fetching(&self) -> bool;
}

impl<T> AnyEntry for QueryEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn key(&self) -> &QueryKey {
        &self.key
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn invalidate(self: Arc<Self>) -> bool {
        let mut inner = self.lock();
        inner.invalidated = true;
        if inner.enabled_observers() == 0 || inner.in_flight.is_some() {
            // in-flight fetches see the flag on completion and go again
            return false;
        }
        metrics::increment_cache_miss(self.key.kind());
        self.start_registered_locked(&mut inner).is_ok()
    }

    fn window_focused(self: Arc<Self>) -> bool {
        let mut inner = self.lock();
        if inner.focus_observers() == 0 || inner.in_flight.is_some() || !self.is_stale(&inner) {
            return false;
        }
        metrics::increment_cache_miss(self.key.kind());
        self.start_registered_locked(&mut inner).is_ok()
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.in_flight = None;
        inner.invalidated = false;
        let initial = inner.initial_data.clone();
        self.state.send_modify(|s| *s = QueryState::seeded(initial));
        debug!("[query] {} reset to generation {}", self.key, inner.generation);
    }

    fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn is_fetching(&self) -> bool {
        self.lock().in_flight.is_some()
    }
}
