use ethers::types::{Address, H256};
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub hash: H256,
    /// Free-form action label ("mint", "redeem", "approve:OUSD", ...)
    pub action: String,
    pub status: TransactionStatus,
    pub submitted_at: SystemTime,
}

/// Session state shared by every component of a dapp.
///
/// Mutated only through [`Store::update`](crate::store::Store::update); the
/// helpers below are meant to be passed to it, e.g.
/// `store.update(|s| s.connect_wallet(account, 1))`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    /// Token symbol -> decimal-scaled balance
    pub balances: BTreeMap<String, f64>,
    pub transactions: Vec<PendingTransaction>,
    /// Bumped whenever on-chain data should be re-read
    pub refresh_count: u64,
}

impl AppState {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    /// Switching accounts drops everything tied to the previous one.
    pub fn connect_wallet(&mut self, account: Address, chain_id: u64) {
        if self.account != Some(account) {
            self.balances.clear();
            self.transactions.clear();
        }
        self.account = Some(account);
        self.chain_id = Some(chain_id);
    }

    pub fn set_balance(&mut self, symbol: &str, balance: f64) {
        self.balances.insert(symbol.to_string(), balance);
    }

    pub fn balance(&self, symbol: &str) -> f64 {
        self.balances.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn submit_transaction(&mut self, hash: H256, action: impl Into<String>) {
        self.transactions.push(PendingTransaction {
            hash,
            action: action.into(),
            status: TransactionStatus::Pending,
            submitted_at: SystemTime::now(),
        });
    }

    /// Settles a pending transaction. Returns false for unknown hashes.
    pub fn settle_transaction(&mut self, hash: H256, success: bool) -> bool {
        match self.transactions.iter_mut().find(|tx| tx.hash == hash) {
            Some(tx) => {
                tx.status = if success {
                    TransactionStatus::Confirmed
                } else {
                    TransactionStatus::Failed
                };
                self.refresh_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .count()
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }
}
