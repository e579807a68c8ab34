// src/context.rs

use crate::app_state::AppState;
use crate::errors::{FetchError, FetchResult};
use crate::fetch_service::FetchService;
use crate::onchain::Erc20Reader;
use crate::query::{QueryClient, QueryObserver, QueryOptions};
use crate::services::{ApyPoint, ApyService, OgvStats, OgvStatsService, SubscriptionService};
use crate::settings::Settings;
use crate::store::Store;
use anyhow::Result;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, H256};
use log::{debug, info};
use std::sync::Arc;

/// Everything a dapp screen needs, passed by reference instead of living in globals.
///
/// Ties store events to the query cache: connecting a wallet or settling a
/// transaction invalidates balance queries, logging out resets them.
pub struct DappContext<M> {
    settings: Settings,
    store: Arc<Store<AppState>>,
    queries: QueryClient,
    ogv: OgvStatsService,
    apy: ApyService,
    subscription: SubscriptionService,
    reader: Arc<Erc20Reader<M>>,
}

impl DappContext<Provider<Http>> {
    /// Builds a context talking to `settings.endpoints.rpc_url` over HTTP.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider = Provider::<Http>::try_from(settings.endpoints.rpc_url.as_str())?;
        Self::with_client(settings, Arc::new(provider))
    }
}

impl<M: Middleware + 'static> DappContext<M> {
    pub fn with_client(settings: Settings, client: Arc<M>) -> Result<Self> {
        let fetch = FetchService::new(&settings.http)?;
        let ogv = OgvStatsService::new(fetch.clone(), settings.endpoints.clone());
        let apy = ApyService::new(fetch.clone(), settings.endpoints.analytics_url.clone());
        let subscription =
            SubscriptionService::new(fetch, settings.endpoints.subscription_url.clone());

        Ok(Self {
            settings,
            store: Arc::new(Store::new("app", AppState::default())),
            queries: QueryClient::new(),
            ogv,
            apy,
            subscription,
            reader: Arc::new(Erc20Reader::new(client)),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<Store<AppState>> {
        &self.store
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn subscription(&self) -> &SubscriptionService {
        &self.subscription
    }

    pub fn reader(&self) -> &Arc<Erc20Reader<M>> {
        &self.reader
    }

    /// Options seeded from the `[query]` settings section.
    pub fn default_options<T>(&self) -> QueryOptions<T> {
        QueryOptions::from_defaults(&self.settings.query)
    }

    pub fn ogv_stats_query(
        &self,
        options: QueryOptions<OgvStats>,
    ) -> FetchResult<QueryObserver<OgvStats>> {
        let service = self.ogv.clone();
        self.queries.subscribe(
            OgvStatsService::query_key(),
            move || {
                let service = service.clone();
                async move { Ok(service.fetch_ogv_stats().await) }
            },
            options,
        )
    }

    pub fn apy_history_query(
        &self,
        days: u32,
        options: QueryOptions<Vec<ApyPoint>>,
    ) -> FetchResult<QueryObserver<Vec<ApyPoint>>> {
        let service = self.apy.clone();
        self.queries.subscribe(
            ApyService::history_key(days),
            move || {
                let service = service.clone();
                async move { service.fetch_apy_history(days).await }
            },
            options,
        )
    }

    pub fn trailing_apy_query(
        &self,
        days: u32,
        options: QueryOptions<f64>,
    ) -> FetchResult<QueryObserver<f64>> {
        let service = self.apy.clone();
        self.queries.subscribe(
            ApyService::trailing_key(days),
            move || {
                let service = service.clone();
                async move { service.fetch_trailing_apy(days).await }
            },
            options.initial_data(0.0),
        )
    }

    /// Balance of `token` for the connected account, mirrored into the store
    /// under `symbol`.
    ///
    /// Gated on a connected wallet: created before `connect_wallet`, it turns
    /// on and fetches once an account appears. The account is read from the
    /// store at fetch time, so switching wallets refetches under the same key.
    pub fn balance_query(
        &self,
        token: Address,
        symbol: &str,
        options: QueryOptions<f64>,
    ) -> FetchResult<QueryObserver<f64>> {
        let connected = self.store.select(|s: &AppState| s.is_connected());
        let reader = Arc::clone(&self.reader);
        let store = Arc::clone(&self.store);
        let symbol = symbol.to_string();
        self.queries.subscribe(
            Erc20Reader::<M>::balance_key(token),
            move || {
                let reader = Arc::clone(&reader);
                let store = Arc::clone(&store);
                let symbol = symbol.clone();
                async move {
                    let account = store
                        .read(|s| s.account)
                        .ok_or_else(|| FetchError::precondition("no wallet connected"))?;
                    let balance = reader.scaled_balance(token, account).await?;
                    let current = store.update(|s| {
                        let current = s.account == Some(account);
                        if current {
                            s.set_balance(&symbol, balance);
                        }
                        current
                    });
                    if !current {
                        return Err(FetchError::precondition(format!(
                            "wallet changed while reading {} balance",
                            symbol
                        )));
                    }
                    Ok(balance)
                }
            },
            options.enabled_when(connected),
        )
    }

    pub fn connect_wallet(&self, account: Address, chain_id: u64) {
        self.store.update(|s| s.connect_wallet(account, chain_id));
        let refetched = self.queries.invalidate_kind(Erc20Reader::<M>::BALANCE_KIND);
        info!(
            "Wallet {:?} connected on chain {} ({} balance queries refetched)",
            account, chain_id, refetched
        );
    }

    pub fn submit_transaction(&self, hash: H256, action: &str) {
        self.store.update(|s| s.submit_transaction(hash, action));
        debug!("Transaction {:?} submitted ({})", hash, action);
    }

    /// Returns false for unknown hashes. Known ones refresh balances.
    pub fn settle_transaction(&self, hash: H256, success: bool) -> bool {
        let known = self.store.update(|s| s.settle_transaction(hash, success));
        if known {
            self.queries.invalidate_kind(Erc20Reader::<M>::BALANCE_KIND);
        }
        known
    }

    pub fn logout(&self) {
        self.store.update(AppState::logout);
        let reset = self.queries.reset_kind(Erc20Reader::<M>::BALANCE_KIND);
        info!("Logged out, {} balance queries reset", reset);
    }

    pub fn window_focused(&self) -> usize {
        self.queries.notify_window_focus()
    }
}
