//! Stateless fetch services over third-party HTTP APIs.
//!
//! Responses carry no schema versioning, so every payload type tolerates
//! missing fields: absent numbers read as `0`, absent lists as empty.

pub mod apy;
pub mod ogv_stats;
pub mod subscription;

pub use apy::{ApyPoint, ApyService};
pub use ogv_stats::{OgvStats, OgvStatsService, SupplyPoint};
pub use subscription::{SubscribeOutcome, SubscriptionService};

use serde::{Deserialize, Deserializer};

/// Reads a number that may arrive as a JSON number, a numeric string or null.
/// Anything unparseable reads as `0.0`.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().parse().unwrap_or(0.0),
        Raw::Other(_) => 0.0,
    })
}
