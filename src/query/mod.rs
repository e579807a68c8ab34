//! Read-through query cache
//!
//! Entries are addressed by a [`QueryKey`] and filled by an async fetcher. A
//! [`QueryClient`] owns every entry; [`QueryObserver`] handles expose the
//! `{data, is_loading, error}` view and drive refetch triggers (mount,
//! window focus, invalidation, interval).

mod client;
mod entry;
mod key;
mod observer;
mod options;
mod state;

#[cfg(test)]
mod tests;

pub use client::QueryClient;
pub use key::QueryKey;
pub use observer::QueryObserver;
pub use options::QueryOptions;
pub use state::{QueryState, QueryStatus};
