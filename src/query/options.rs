use crate::settings::QueryDefaults;
use crate::store::Selection;
use std::time::Duration;
use tokio::sync::watch;

/// Per-subscription fetch policy.
///
/// | field                     | default |
/// |---------------------------|---------|
/// | `enabled`                 | `true`  |
/// | `refetch_on_window_focus` | `true`  |
/// | `keep_previous_data`      | `false` |
/// | `initial_data`            | `None`  |
/// | `stale_time`              | `0` (stale as soon as it lands) |
/// | `refetch_interval`        | `None`  |
///
/// Entry-wide settings (`keep_previous_data`, `stale_time`) follow the most
/// recent subscriber. `enabled` and the refetch triggers are tracked per observer.
///
/// [`enabled_when`](Self::enabled_when) ties `enabled` to a store selection, so
/// an observer created before its precondition holds turns on (and fetches)
/// once it does.
#[derive(Debug, Clone)]
pub struct QueryOptions<T> {
    /// Gate on preconditions such as a connected wallet. A disabled observer never fetches.
    pub enabled: bool,
    pub refetch_on_window_focus: bool,
    /// Serve the last value while refetching and keep it when a refetch fails.
    pub keep_previous_data: bool,
    /// Seed shown before the first fetch completes. Never counts as fresh.
    pub initial_data: Option<T>,
    pub stale_time: Duration,
    pub refetch_interval: Option<Duration>,
    /// Live precondition, ANDed with `enabled`.
    pub enabled_gate: Option<watch::Receiver<bool>>,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_on_window_focus: true,
            keep_previous_data: false,
            initial_data: None,
            stale_time: Duration::ZERO,
            refetch_interval: None,
            enabled_gate: None,
        }
    }
}

impl<T> QueryOptions<T> {
    pub fn from_defaults(defaults: &QueryDefaults) -> Self {
        Self {
            refetch_on_window_focus: defaults.refetch_on_window_focus,
            keep_previous_data: defaults.keep_previous_data,
            stale_time: defaults.stale_time(),
            refetch_interval: defaults.refetch_interval(),
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn enabled_when(mut self, gate: Selection<bool>) -> Self {
        self.enabled_gate = Some(gate.into_receiver());
        self
    }

    pub fn refetch_on_window_focus(mut self, on: bool) -> Self {
        self.refetch_on_window_focus = on;
        self
    }

    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }

    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }
}
