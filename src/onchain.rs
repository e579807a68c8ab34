// src/onchain.rs

use crate::contracts::Erc20;
use crate::errors::{FetchError, FetchResult};
use crate::metrics;
use crate::query::QueryKey;
use dashmap::DashMap;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use log::debug;
use std::sync::Arc;
use std::time::Instant;

/// Scales a raw token amount by `decimals` into a float for display.
pub fn scale_by_decimals(value: U256, decimals: u8) -> FetchResult<f64> {
    let formatted = format_units(value, u32::from(decimals)).map_err(|e| FetchError::Parse {
        endpoint: "format_units".to_string(),
        message: e.to_string(),
    })?;
    formatted.parse::<f64>().map_err(|e| FetchError::Parse {
        endpoint: "format_units".to_string(),
        message: format!("{}: {}", formatted, e),
    })
}

/// Read-only ERC-20 calls over a JSON-RPC provider.
///
/// Token decimals never change, so they are cached for the reader's lifetime.
pub struct Erc20Reader<M> {
    client: Arc<M>,
    decimals: DashMap<Address, u8>,
}

impl<M: Middleware + 'static> Erc20Reader<M> {
    pub const BALANCE_KIND: &'static str = "balance";

    pub fn new(client: Arc<M>) -> Self {
        Self {
            client,
            decimals: DashMap::new(),
        }
    }

    /// Balance queries follow whichever account is connected, so only the
    /// token is part of the key.
    pub fn balance_key(token: Address) -> QueryKey {
        QueryKey::new(Self::BALANCE_KIND).with_param("token", format!("{:?}", token))
    }

    fn contract(&self, token: Address) -> Erc20<M> {
        Erc20::new(token, Arc::clone(&self.client))
    }

    fn rpc_error(method: &str, e: impl std::fmt::Display) -> FetchError {
        FetchError::Rpc {
            method: method.to_string(),
            message: e.to_string(),
        }
    }

    pub async fn balance_of(&self, token: Address, account: Address) -> FetchResult<U256> {
        let start = Instant::now();
        metrics::increment_rpc_call("balanceOf");
        let balance = self
            .contract(token)
            .balance_of(account)
            .call()
            .await
            .map_err(|e| Self::rpc_error("balanceOf", e))?;
        debug!("[rpc] balanceOf({:?}) on {:?} in {:?}", account, token, start.elapsed());
        Ok(balance)
    }

    pub async fn total_supply(&self, token: Address) -> FetchResult<U256> {
        metrics::increment_rpc_call("totalSupply");
        self.contract(token)
            .total_supply()
            .call()
            .await
            .map_err(|e| Self::rpc_error("totalSupply", e))
    }

    pub async fn decimals(&self, token: Address) -> FetchResult<u8> {
        if let Some(cached) = self.decimals.get(&token) {
            metrics::increment_cache_hit("token_decimals");
            return Ok(*cached);
        }
        metrics::increment_cache_miss("token_decimals");
        metrics::increment_rpc_call("decimals");
        let decimals = self
            .contract(token)
            .decimals()
            .call()
            .await
            .map_err(|e| Self::rpc_error("decimals", e))?;
        self.decimals.insert(token, decimals);
        Ok(decimals)
    }

    /// Pre-seeds decimals for well-known tokens so they skip the RPC round trip.
    pub fn prime_decimals(&self, token: Address, decimals: u8) {
        self.decimals.insert(token, decimals);
    }

    pub async fn scaled_balance(&self, token: Address, account: Address) -> FetchResult<f64> {
        let decimals = self.decimals(token).await?;
        let raw = self.balance_of(token, account).await?;
        scale_by_decimals(raw, decimals)
    }

    pub async fn scaled_total_supply(&self, token: Address) -> FetchResult<f64> {
        let decimals = self.decimals(token).await?;
        let raw = self.total_supply(token).await?;
        scale_by_decimals(raw, decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Http, Provider};

    #[test]
    fn test_scale_by_decimals() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(scale_by_decimals(one_and_half, 18).unwrap(), 1.5);
        assert_eq!(scale_by_decimals(U256::from(2_500_000u64), 6).unwrap(), 2.5);
        assert_eq!(scale_by_decimals(U256::zero(), 18).unwrap(), 0.0);
    }

    #[test]
    fn test_balance_key_is_stable() {
        let token = Address::from_low_u64_be(0xaa);
        let other = Address::from_low_u64_be(0xbb);
        let a = Erc20Reader::<Provider<Http>>::balance_key(token);
        let b = Erc20Reader::<Provider<Http>>::balance_key(token);
        assert_eq!(a, b);
        assert_eq!(a.kind(), "balance");
        assert_ne!(a, Erc20Reader::<Provider<Http>>::balance_key(other));
    }

    #[tokio::test]
    async fn test_primed_decimals_skip_rpc() {
        // nothing listens here; a real call would error out
        let provider = Provider::<Http>::try_from("http://127.0.0.1:9").unwrap();
        let reader = Erc20Reader::new(Arc::new(provider));
        let token = Address::from_low_u64_be(1);
        reader.prime_decimals(token, 6);
        assert_eq!(reader.decimals(token).await.unwrap(), 6);
        assert!(reader.decimals(Address::from_low_u64_be(2)).await.is_err());
    }
}
