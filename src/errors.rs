// src/errors.rs

/// Errors surfaced by fetch services and the query cache.
///
/// Kept `Clone` so the last error can live inside a cached [`QueryState`]
/// and be handed to every observer of that entry.
///
/// [`QueryState`]: crate::query::QueryState
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The endpoint answered with a non-2xx status.
    #[error("Fetch failed with HTTP {status} for {endpoint}")]
    FetchFailed { status: u16, endpoint: String },
    /// The request never produced a response (DNS, connect, TLS, reset...).
    #[error("Network error for {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    /// The body was not the JSON shape we asked for.
    #[error("Invalid JSON from {endpoint}: {message}")]
    Parse { endpoint: String, message: String },
    /// The query is gated off (no wallet, invalid input, disabled observer).
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),
    /// On-chain read failed at the JSON-RPC provider.
    #[error("RPC call {method} failed: {message}")]
    Rpc { method: String, message: String },
}

impl FetchError {
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionNotMet(reason.into())
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::FetchFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network-class errors: the call went out and did not come back 2xx.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Network { .. })
    }

    /// Short label used for metrics and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FetchFailed { .. } => "http_status",
            Self::Network { .. } => "network",
            Self::Parse { .. } => "parse",
            Self::PreconditionNotMet(_) => "precondition",
            Self::Rpc { .. } => "rpc",
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
