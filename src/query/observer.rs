use super::entry::QueryEntry;
use super::{QueryKey, QueryOptions, QueryState};
use crate::errors::{FetchError, FetchResult};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle returned by [`QueryClient::subscribe`](super::QueryClient::subscribe).
///
/// Holding it keeps the subscription alive. Dropping it unregisters the observer
/// and stops its refetch interval; results that land afterwards are cached but
/// never delivered to it.
pub struct QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    entry: Arc<QueryEntry<T>>,
    id: u64,
    rx: watch::Receiver<QueryState<T>>,
    interval_task: Option<JoinHandle<()>>,
    gate_task: Option<JoinHandle<()>>,
}

impl<T> QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `id` is the registration returned by the entry. `gate` re-evaluates
    /// `enabled` every time the selected store slice changes.
    pub(crate) fn new(
        entry: Arc<QueryEntry<T>>,
        id: u64,
        options: &QueryOptions<T>,
        gate: Option<watch::Receiver<bool>>,
    ) -> Self {
        let interval_task = match options.refetch_interval {
            Some(period) if options.enabled && !period.is_zero() => {
                Some(entry.spawn_refetch_interval(id, period))
            }
            _ => None,
        };
        let gate_task = match gate {
            Some(gate) if options.enabled => Some(spawn_gate(&entry, id, gate)),
            _ => None,
        };
        Self {
            rx: entry.watch(),
            entry,
            id,
            interval_task,
            gate_task,
        }
    }

    pub fn key(&self) -> &QueryKey {
        self.entry.key()
    }

    /// Current gate. Can flip after subscribe when gated on store state.
    pub fn is_enabled(&self) -> bool {
        self.entry.observer_enabled(self.id)
    }

    /// Current snapshot. Marks it as seen for [`changed`](Self::changed).
    pub fn state(&mut self) -> QueryState<T> {
        self.rx.borrow_and_update().clone()
    }

    /// Current snapshot without touching the seen marker.
    pub fn peek(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.rx.borrow().data.clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.rx.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.rx.borrow().is_loading()
    }

    pub fn is_fetching(&self) -> bool {
        self.rx.borrow().is_fetching
    }

    /// Waits for the next state change. Returns `false` if the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until the current fetch (if any) settles and returns the state.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.state();
            if !state.is_fetching {
                return state;
            }
            if !self.changed().await {
                return self.peek();
            }
        }
    }

    /// Manual refetch. Joins an in-flight fetch rather than starting a second one.
    pub async fn refetch(&self) -> FetchResult<T> {
        self.entry.fetch_for(self.id)?.await
    }
}

fn spawn_gate<T>(
    entry: &Arc<QueryEntry<T>>,
    id: u64,
    mut gate: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    let weak = Arc::downgrade(entry);
    tokio::spawn(async move {
        while gate.changed().await.is_ok() {
            let open = *gate.borrow_and_update();
            let Some(entry) = weak.upgrade() else {
                break;
            };
            entry.set_observer_enabled(id, open);
        }
    })
}

impl<T> Drop for QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for task in [self.interval_task.take(), self.gate_task.take()].into_iter().flatten() {
            task.abort();
        }
        self.entry.unregister(self.id);
    }
}
