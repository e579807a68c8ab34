// src/store.rs

use crate::metrics;
use arc_swap::ArcSwap;
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type Slot<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;

/// Observable application-state container.
///
/// The state is only ever changed through [`update`](Store::update), which
/// applies mutations one at a time in call order and publishes a new
/// snapshot. Readers either take a [`snapshot`](Store::snapshot) or hold a
/// [`Selection`] that is notified only when its selected slice changes.
pub struct Store<S> {
    name: &'static str,
    state: ArcSwap<S>,
    /// Serializes writers and guards the selection slots.
    slots: Mutex<Vec<Slot<S>>>,
}

impl<S> Store<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            state: ArcSwap::from_pointee(initial),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn snapshot(&self) -> Arc<S> {
        self.state.load_full()
    }

    /// Reads a value out of the current state without subscribing.
    pub fn read<T>(&self, selector: impl FnOnce(&S) -> T) -> T {
        selector(&self.state.load())
    }

    /// Applies `mutator` to a copy of the state, publishes it, then notifies
    /// every selection whose output changed. Returns the mutator's result.
    pub fn update<R>(&self, mutator: impl FnOnce(&mut S) -> R) -> R {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = S::clone(&self.state.load());
        let out = mutator(&mut next);
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));
        metrics::increment_store_update(self.name);

        let before = slots.len();
        slots.retain(|slot| slot(&next));
        if slots.len() != before {
            debug!(
                "[store:{}] dropped {} closed selections",
                self.name,
                before - slots.len()
            );
        }
        out
    }

    /// Replaces the whole state.
    pub fn replace(&self, state: S) {
        self.update(|s| *s = state);
    }

    /// Subscribes to the slice picked by `selector`. The selection is notified
    /// only when the selector's output differs (`PartialEq`) from the last one.
    pub fn select<T, F>(&self, selector: F) -> Selection<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = watch::channel(selector(&self.state.load()));

        let name = self.name;
        slots.push(Box::new(move |state: &S| {
            if tx.is_closed() {
                return false;
            }
            let next = selector(state);
            let changed = tx.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            if changed {
                metrics::increment_store_notification(name);
            }
            true
        }));

        Selection { rx }
    }

    pub fn selection_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<S> Default for Store<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new("default", S::default())
    }
}

/// A subscriber's view of one slice of a [`Store`].
pub struct Selection<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> Selection<T> {
    /// Latest selected value; marks it as seen.
    pub fn get(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }

    /// Whether the slice changed since the last [`get`](Self::get).
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the slice to change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub(crate) fn into_receiver(self) -> watch::Receiver<T> {
        self.rx
    }
}
