use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One coin's row from the `coins/markets` listing.
///
/// Every numeric field may be `null` upstream and stays `None` here; nothing
/// is defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub id: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_30d_in_currency: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
    #[serde(default)]
    pub total_supply: Option<f64>,
}

/// Result of one successful fetch, keyed by coin identifier.
///
/// A snapshot is never merged into another; the coordinator swaps the whole
/// value on every successful refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    coins: HashMap<String, CoinRecord>,
}

impl Snapshot {
    pub fn from_records(records: Vec<CoinRecord>) -> Self {
        let coins = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self { coins }
    }

    pub fn get(&self, coin: &str) -> Option<&CoinRecord> {
        self.coins.get(coin)
    }

    pub fn contains(&self, coin: &str) -> bool {
        self.coins.contains_key(coin)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
