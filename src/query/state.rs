use crate::errors::FetchError;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Nothing fetched yet and nothing in flight.
    Idle,
    /// First fetch in flight, no data to show.
    Loading,
    Success,
    Error,
}

/// Snapshot of a cache entry as seen by observers.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub is_fetching: bool,
    /// Last successful fetch. `None` for seeded or never-fetched entries.
    pub updated_at: Option<Instant>,
    pub error_updated_at: Option<Instant>,
    /// Completed fetches, successful or not.
    pub fetch_count: u32,
}

impl<T> QueryState<T> {
    pub(crate) fn seeded(initial: Option<T>) -> Self {
        Self {
            data: initial,
            error: None,
            is_fetching: false,
            updated_at: None,
            error_updated_at: None,
            fetch_count: 0,
        }
    }

    /// In flight with nothing to display yet.
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn status(&self) -> QueryStatus {
        if self.error.is_some() && !self.is_fetching {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else if self.is_fetching {
            QueryStatus::Loading
        } else {
            QueryStatus::Idle
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::seeded(None)
    }
}
