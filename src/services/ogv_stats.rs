use super::lenient_f64;
use crate::errors::FetchResult;
use crate::fetch_service::{Endpoint, FetchService};
use crate::query::QueryKey;
use crate::settings::Endpoints;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One point of a supply history chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyPoint {
    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: f64,
}

impl SupplyPoint {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// OGV market stats as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OgvStats {
    pub price: f64,
    #[serde(rename = "change24H")]
    pub change_24h: f64,
    pub circulating_supply: Vec<SupplyPoint>,
    pub total_supply: Vec<SupplyPoint>,
}

impl OgvStats {
    /// Most recent circulating supply, `0` when the history is empty.
    pub fn latest_circulating_supply(&self) -> f64 {
        latest(&self.circulating_supply)
    }

    pub fn latest_total_supply(&self) -> f64 {
        latest(&self.total_supply)
    }
}

fn latest(points: &[SupplyPoint]) -> f64 {
    points
        .iter()
        .max_by_key(|p| p.timestamp)
        .map(|p| p.value)
        .unwrap_or(0.0)
}

#[derive(Debug, Default, Deserialize)]
struct CoinGeckoPrice {
    #[serde(default, deserialize_with = "lenient_f64")]
    usd: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    usd_24h_change: f64,
}

// CoinGecko simple/price answers { "<coin id>": { "usd": .., "usd_24h_change": .. } }
type CoinGeckoPriceResponse = HashMap<String, CoinGeckoPrice>;

#[derive(Debug, Default, Deserialize)]
struct SupplyHistoryResponse {
    #[serde(default)]
    data: Vec<SupplyPoint>,
}

#[derive(Clone, Debug)]
pub struct OgvStatsService {
    fetch: FetchService,
    endpoints: Endpoints,
}

impl OgvStatsService {
    pub const QUERY_KIND: &'static str = "ogvStats";

    pub fn new(fetch: FetchService, endpoints: Endpoints) -> Self {
        Self { fetch, endpoints }
    }

    pub fn query_key() -> QueryKey {
        QueryKey::new(Self::QUERY_KIND)
    }

    fn price_endpoint(&self) -> FetchResult<Endpoint> {
        Ok(Endpoint::join(&self.endpoints.coingecko_url, "simple/price")?
            .with_query("ids", &self.endpoints.ogv_coin_id)
            .with_query("vs_currencies", "usd")
            .with_query("include_24hr_change", "true"))
    }

    fn supply_endpoint(&self, series: &str) -> FetchResult<Endpoint> {
        Ok(
            Endpoint::join(&self.endpoints.analytics_url, &format!("ogv/{}", series))?
                .with_query("days", self.endpoints.supply_history_days.to_string()),
        )
    }

    /// Price in USD and 24h change in percent.
    pub async fn fetch_price(&self) -> FetchResult<(f64, f64)> {
        let endpoint = self.price_endpoint()?;
        let response: CoinGeckoPriceResponse = self.fetch.get_json(&endpoint).await?;
        let price = response
            .get(&self.endpoints.ogv_coin_id)
            .map(|p| (p.usd, p.usd_24h_change))
            .unwrap_or((0.0, 0.0));
        Ok(price)
    }

    pub async fn fetch_circulating_supply(&self) -> FetchResult<Vec<SupplyPoint>> {
        self.fetch_supply("circulating_supply").await
    }

    pub async fn fetch_total_supply(&self) -> FetchResult<Vec<SupplyPoint>> {
        self.fetch_supply("total_supply").await
    }

    async fn fetch_supply(&self, series: &str) -> FetchResult<Vec<SupplyPoint>> {
        let endpoint = self.supply_endpoint(series)?;
        let response: SupplyHistoryResponse = self.fetch.get_json(&endpoint).await?;
        Ok(response.data)
    }

    /// Fetches the three sources concurrently. Each failing source falls back
    /// to its empty value on its own; this never fails as a whole.
    pub async fn fetch_ogv_stats(&self) -> OgvStats {
        let (price, circulating, total) = tokio::join!(
            self.fetch_price(),
            self.fetch_circulating_supply(),
            self.fetch_total_supply(),
        );

        let (price, change_24h) = price.unwrap_or_else(|e| {
            warn!("OGV price unavailable, defaulting to 0: {}", e);
            (0.0, 0.0)
        });
        let circulating_supply = circulating.unwrap_or_else(|e| {
            warn!("OGV circulating supply unavailable, defaulting to []: {}", e);
            Vec::new()
        });
        let total_supply = total.unwrap_or_else(|e| {
            warn!("OGV total supply unavailable, defaulting to []: {}", e);
            Vec::new()
        });

        debug!(
            "OGV stats: price={} change24H={} circulating_points={} total_points={}",
            price,
            change_24h,
            circulating_supply.len(),
            total_supply.len()
        );

        OgvStats {
            price,
            change_24h,
            circulating_supply,
            total_supply,
        }
    }
}
