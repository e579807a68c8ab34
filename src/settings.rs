use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Endpoints {
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_analytics_url")]
    pub analytics_url: String,
    #[serde(default = "default_subscription_url")]
    pub subscription_url: String,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// CoinGecko coin id used for OGV price lookups
    #[serde(default = "default_ogv_coin_id")]
    pub ogv_coin_id: String,
    /// Days of supply history requested by the stats service
    #[serde(default = "default_supply_history_days")]
    pub supply_history_days: u32,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_analytics_url() -> String {
    "https://analytics.ousd.com/api/v2".to_string()
}
fn default_subscription_url() -> String {
    "https://www.ousd.com/api/subscribe".to_string()
}
fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_ogv_coin_id() -> String {
    "origin-dollar-governance".to_string()
}
fn default_supply_history_days() -> u32 {
    30
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            analytics_url: default_analytics_url(),
            subscription_url: default_subscription_url(),
            rpc_url: default_rpc_url(),
            ogv_coin_id: default_ogv_coin_id(),
            supply_history_days: default_supply_history_days(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryDefaults {
    /// 0 means every entry is stale as soon as it lands
    #[serde(default)]
    pub stale_time_ms: u64,
    #[serde(default)]
    pub refetch_interval_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub refetch_on_window_focus: bool,
    #[serde(default = "default_false")]
    pub keep_previous_data: bool,
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            refetch_interval_ms: None,
            refetch_on_window_focus: default_true(),
            keep_previous_data: default_false(),
        }
    }
}

impl QueryDefaults {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn refetch_interval(&self) -> Option<Duration> {
        self.refetch_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Http {
    /// No timeout unless set; callers decide.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    concat!("origin-dapp-sdk/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for Http {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub query: QueryDefaults,
    #[serde(default)]
    pub http: Http,
}

impl Settings {
    /// Loads `Config.toml` (optional) and applies `SDK_*` environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_from("Config.toml")
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("SDK").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Flat overrides kept for deploy scripts that predate the nested form
        if let Ok(rpc) = env::var("SDK_RPC_URL") {
            let trimmed = rpc.trim();
            if !trimmed.is_empty() {
                settings.endpoints.rpc_url = trimmed.to_string();
            }
        }
        if let Ok(raw) = env::var("SDK_HTTP_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => settings.http.timeout_ms = Some(ms),
                Ok(_) => settings.http.timeout_ms = None,
                Err(e) => {
                    eprintln!("Failed to parse SDK_HTTP_TIMEOUT_MS as integer: {}", e);
                }
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let settings = Settings::load_from("does-not-exist.toml").expect("defaults should load");
        assert_eq!(settings.endpoints.ogv_coin_id, "origin-dollar-governance");
        assert_eq!(settings.query.stale_time(), Duration::ZERO);
        assert!(settings.query.refetch_on_window_focus);
        assert!(!settings.query.keep_previous_data);
    }

    #[test]
    fn test_zero_refetch_interval_means_disabled() {
        let query = QueryDefaults {
            refetch_interval_ms: Some(0),
            ..QueryDefaults::default()
        };
        assert_eq!(query.refetch_interval(), None);

        let query = QueryDefaults {
            refetch_interval_ms: Some(1500),
            ..QueryDefaults::default()
        };
        assert_eq!(query.refetch_interval(), Some(Duration::from_millis(1500)));
    }
}
