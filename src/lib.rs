//! # Origin Dapp SDK
//!
//! The data layer behind the Origin dapps: a read-through query cache over
//! third-party HTTP APIs and an Ethereum JSON-RPC provider, plus an
//! observable application-state store that screens subscribe to.
//!
//! ## Overview
//!
//! - **Fetch services**: stateless async calls to one endpoint each, returning
//!   parsed JSON or a [`FetchError`].
//! - **Query cache**: entries keyed by `(kind, params)` with in-flight
//!   de-duplication, stale time, keep-previous-data, window-focus and interval
//!   refetch.
//! - **Store**: a single mutation entry point with selector subscriptions that
//!   only fire when the selected slice changes.
//! - **API routes**: GET-only handlers that answer 405 to anything else.
//!
//! [`DappContext`] wires all of it together and is passed by reference to
//! whatever needs it.

// Core
/// Error kinds surfaced to callers
pub mod errors;
/// JSON-over-HTTP client
pub mod fetch_service;
/// Read-through query cache
pub mod query;
/// Observable state container
pub mod store;
/// Session state (wallet, balances, transactions)
pub mod app_state;
/// Store + query cache + services bundle
pub mod context;

// Data sources
/// Third-party HTTP services (prices, analytics, subscriptions)
pub mod services;
/// ERC-20 reads over JSON-RPC
pub mod onchain;
/// Smart contract ABIs (read-only)
pub mod contracts;

// Surfaces
/// Minimal API-route handlers
pub mod api_routes;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

pub use context::DappContext;
pub use errors::{FetchError, FetchResult};
pub use query::{QueryClient, QueryKey, QueryObserver, QueryOptions, QueryState};
pub use settings::Settings;
pub use store::{Selection, Store};
